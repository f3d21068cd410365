//! Compact-token encoding and validation.
//!
//! A token is `base64url(header).base64url(payload).base64url(signature)`,
//! all segments unpadded. The codec owns the claim semantics a bare
//! [`Signer`] knows nothing about: issuer stamping and checking, expiry,
//! token type, and unique token ids.
//!
//! Decode-side failures never propagate as errors: a malformed, tampered,
//! expired, or foreign token degrades to `None`/`false` so call sites
//! branch instead of catching.

use std::fmt;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::Utc;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::signer::{Signer, SignerError};

/// Claim names the codec stamps itself.
///
/// Caller-supplied custom claims must not collide with these: a custom
/// `iss` or `exp` would change validation outcome and produce tokens the
/// issuing codec itself rejects.
pub const RESERVED_CLAIMS: &[&str] = &["sub", "iat", "exp", "iss", "type", "jti"];

/// Token kind carried in the `type` claim.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    /// Short-lived token presented on API calls.
    #[default]
    Access,
    /// Long-lived token exchanged for new pairs.
    Refresh,
}

impl fmt::Display for TokenType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Access => f.write_str("access"),
            Self::Refresh => f.write_str("refresh"),
        }
    }
}

/// Decoded token payload.
///
/// `sub` and `exp` are always present in anything this codec accepts;
/// the other registered claims are lenient on parse and strict on
/// validation (a token without `iss` parses but never validates).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: the principal identifier.
    pub sub: String,
    /// Issued-at, unix seconds.
    #[serde(default)]
    pub iat: i64,
    /// Expires-at, unix seconds.
    pub exp: i64,
    /// Issuer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
    /// Token type.
    #[serde(rename = "type", default)]
    pub token_type: TokenType,
    /// Unique token id: 32 lowercase hex characters (128 random bits).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,
    /// Caller-supplied custom claims.
    #[serde(flatten)]
    pub custom: Map<String, Value>,
}

impl Claims {
    /// Look up a custom claim.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.custom.get(key)
    }

    /// Whether the token has expired as of now.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        Utc::now().timestamp() >= self.exp
    }
}

/// Token encoding errors.
///
/// Only the encode side errors; see the module docs for the decode-side
/// policy.
#[derive(Debug, Error)]
pub enum TokenError {
    /// A custom claim collides with a reserved claim name.
    #[error("Custom claim {0:?} collides with a reserved claim")]
    ReservedClaim(String),

    /// The signer could not produce a signature.
    #[error(transparent)]
    Signer(#[from] SignerError),

    /// Claim serialization failed.
    #[error("Claim serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Encodes and validates compact signed tokens.
pub struct TokenCodec {
    signer: Signer,
    issuer: String,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenCodec {
    /// Create a codec around an existing signer.
    #[must_use]
    pub fn new(
        signer: Signer,
        issuer: impl Into<String>,
        access_ttl: Duration,
        refresh_ttl: Duration,
    ) -> Self {
        Self {
            signer,
            issuer: issuer.into(),
            access_ttl,
            refresh_ttl,
        }
    }

    /// Create a codec with an implicit HS256 signer.
    ///
    /// # Errors
    ///
    /// Returns [`SignerError::MissingKey`] on an empty secret.
    pub fn from_secret(
        secret: &str,
        issuer: impl Into<String>,
        access_ttl: Duration,
        refresh_ttl: Duration,
    ) -> Result<Self, SignerError> {
        Ok(Self::new(
            Signer::from_secret(secret)?,
            issuer,
            access_ttl,
            refresh_ttl,
        ))
    }

    /// The configured issuer.
    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// The underlying signer.
    #[must_use]
    pub fn signer(&self) -> &Signer {
        &self.signer
    }

    /// Create an access token for a subject.
    ///
    /// Stamps `type=access`, `iat=now`, `exp=now+access_ttl`, the
    /// configured issuer, and a fresh `jti`, then merges `custom`.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::ReservedClaim`] if a custom claim collides
    /// with a reserved name, or an encoding/signing error.
    pub fn create_access_token(
        &self,
        subject: &str,
        custom: Map<String, Value>,
    ) -> Result<String, TokenError> {
        if let Some(key) = custom.keys().find(|k| RESERVED_CLAIMS.contains(&k.as_str())) {
            return Err(TokenError::ReservedClaim(key.clone()));
        }

        let mut payload = self.registered_claims(subject, TokenType::Access, self.access_ttl);
        payload.extend(custom);
        self.encode(payload, None)
    }

    /// Create a refresh token for a subject.
    ///
    /// Like [`Self::create_access_token`] but `type=refresh`, the refresh
    /// TTL, and no custom claims.
    ///
    /// # Errors
    ///
    /// Returns an encoding/signing error.
    pub fn create_refresh_token(&self, subject: &str) -> Result<String, TokenError> {
        let payload = self.registered_claims(subject, TokenType::Refresh, self.refresh_ttl);
        self.encode(payload, None)
    }

    /// Low-level encode of an arbitrary claim map.
    ///
    /// Stamps `iat` if absent and computes `exp` from `ttl_override` (or
    /// the default access TTL) if absent. Claims already present are left
    /// untouched; this path does not enforce the reserved-claim policy.
    ///
    /// # Errors
    ///
    /// Returns an encoding/signing error.
    pub fn encode(
        &self,
        mut payload: Map<String, Value>,
        ttl_override: Option<u64>,
    ) -> Result<String, TokenError> {
        let now = Utc::now().timestamp();

        payload.entry("iat".to_string()).or_insert_with(|| now.into());
        payload.entry("exp".to_string()).or_insert_with(|| {
            let ttl = ttl_override.unwrap_or(self.access_ttl.as_secs());
            (now + i64::try_from(ttl).unwrap_or(i64::MAX)).into()
        });

        let header = serde_json::json!({
            "alg": self.signer.algorithm().as_str(),
            "typ": "JWT",
        });

        let header_b64 = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&header)?);
        let payload_b64 = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&payload)?);

        let signing_input = format!("{header_b64}.{payload_b64}");
        let signature = self.signer.sign(signing_input.as_bytes())?;
        let signature_b64 = URL_SAFE_NO_PAD.encode(signature);

        Ok(format!("{signing_input}.{signature_b64}"))
    }

    /// Decode and fully validate a token.
    ///
    /// Returns `None` when the segment count is wrong, any segment fails
    /// to decode, the header declares a different algorithm than this
    /// codec is configured with (no cross-algorithm verification is ever
    /// attempted), the signature does not verify, `exp` has passed, or
    /// the issuer does not match.
    #[must_use]
    pub fn decode(&self, token: &str) -> Option<Claims> {
        let (header_b64, payload_b64, signature_b64) = split_token(token)?;

        let header: Map<String, Value> =
            serde_json::from_slice(&URL_SAFE_NO_PAD.decode(header_b64).ok()?).ok()?;
        if header.get("alg").and_then(Value::as_str) != Some(self.signer.algorithm().as_str()) {
            return None;
        }

        let signature = URL_SAFE_NO_PAD.decode(signature_b64).ok()?;
        let signing_input_len = header_b64.len() + 1 + payload_b64.len();
        if !self
            .signer
            .verify(token[..signing_input_len].as_bytes(), &signature)
        {
            return None;
        }

        let claims: Claims =
            serde_json::from_slice(&URL_SAFE_NO_PAD.decode(payload_b64).ok()?).ok()?;

        if claims.is_expired() {
            return None;
        }
        if claims.iss.as_deref() != Some(self.issuer.as_str()) {
            return None;
        }

        Some(claims)
    }

    /// Whether a token passes full validation.
    #[must_use]
    pub fn validate(&self, token: &str) -> bool {
        self.decode(token).is_some()
    }

    /// Check the signature only, deliberately ignoring expiry and issuer.
    ///
    /// Distinguishes "cryptographically valid but expired" from "never
    /// valid". The algorithm pin still applies.
    #[must_use]
    pub fn verify_signature(&self, token: &str) -> bool {
        let Some((header_b64, payload_b64, signature_b64)) = split_token(token) else {
            return false;
        };

        let Ok(header_bytes) = URL_SAFE_NO_PAD.decode(header_b64) else {
            return false;
        };
        let Ok(header) = serde_json::from_slice::<Map<String, Value>>(&header_bytes) else {
            return false;
        };
        if header.get("alg").and_then(Value::as_str) != Some(self.signer.algorithm().as_str()) {
            return false;
        }

        let Ok(signature) = URL_SAFE_NO_PAD.decode(signature_b64) else {
            return false;
        };

        let signing_input_len = header_b64.len() + 1 + payload_b64.len();
        self.signer
            .verify(token[..signing_input_len].as_bytes(), &signature)
    }

    /// Decode the payload segment without any validation.
    ///
    /// For logging and diagnostics only; the result must never be used to
    /// authorize access.
    #[must_use]
    pub fn unverified_claims(&self, token: &str) -> Option<Claims> {
        let (_, payload_b64, _) = split_token(token)?;
        serde_json::from_slice(&URL_SAFE_NO_PAD.decode(payload_b64).ok()?).ok()
    }

    /// The subject of an already-trusted token.
    #[must_use]
    pub fn subject_of(&self, token: &str) -> Option<String> {
        self.unverified_claims(token).map(|c| c.sub)
    }

    /// The token id of an already-trusted token.
    #[must_use]
    pub fn jti_of(&self, token: &str) -> Option<String> {
        self.unverified_claims(token).and_then(|c| c.jti)
    }

    /// The expiry (unix seconds) of an already-trusted token.
    #[must_use]
    pub fn expiration_of(&self, token: &str) -> Option<i64> {
        self.unverified_claims(token).map(|c| c.exp)
    }

    /// The token type of an already-trusted token.
    #[must_use]
    pub fn token_type_of(&self, token: &str) -> Option<TokenType> {
        self.unverified_claims(token).map(|c| c.token_type)
    }

    /// Whether an already-trusted token is a refresh token.
    #[must_use]
    pub fn is_refresh_token(&self, token: &str) -> bool {
        self.token_type_of(token) == Some(TokenType::Refresh)
    }

    /// Registered claims for a fresh token.
    fn registered_claims(
        &self,
        subject: &str,
        token_type: TokenType,
        ttl: Duration,
    ) -> Map<String, Value> {
        let now = Utc::now().timestamp();
        let exp = now + i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX);

        let mut payload = Map::new();
        payload.insert("sub".to_string(), subject.into());
        payload.insert("iat".to_string(), now.into());
        payload.insert("exp".to_string(), exp.into());
        payload.insert("iss".to_string(), self.issuer.clone().into());
        payload.insert("type".to_string(), token_type.to_string().into());
        payload.insert("jti".to_string(), new_jti().into());
        payload
    }
}

impl fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenCodec")
            .field("issuer", &self.issuer)
            .field("algorithm", &self.signer.algorithm())
            .field("access_ttl", &self.access_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .finish_non_exhaustive()
    }
}

/// Split a compact token into its three segments.
///
/// Anything other than exactly three dot-separated segments is rejected.
fn split_token(token: &str) -> Option<(&str, &str, &str)> {
    let mut parts = token.split('.');
    let header = parts.next()?;
    let payload = parts.next()?;
    let signature = parts.next()?;
    if parts.next().is_some() || header.is_empty() || payload.is_empty() {
        return None;
    }
    Some((header, payload, signature))
}

/// Mint a fresh 128-bit token id as lowercase hex.
fn new_jti() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}
