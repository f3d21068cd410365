//! Token-backed guard.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use lockzone_core::{Credentials, Id, Principal};
use lockzone_token::{RevocationList, TokenCodec, TokenError, TokenType};

use crate::guard::Guard;
use crate::store::UserStore;

/// An issued access/refresh token pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPair {
    /// Access token.
    pub access_token: String,
    /// Refresh token.
    pub refresh_token: String,
    /// Access token expiration.
    pub expires_at: DateTime<Utc>,
    /// Refresh token expiration.
    pub refresh_expires_at: DateTime<Utc>,
    /// Token type (always "Bearer").
    pub token_type: String,
}

/// Guard that authenticates stateless signed tokens.
///
/// Token validation ([`Self::authenticate_token`]) is a side-effect-free
/// query: it never touches guard state, so callers decide separately
/// whether a validated principal becomes the request's current user via
/// [`Guard::login`].
pub struct TokenGuard {
    name: String,
    codec: Arc<TokenCodec>,
    revocations: Arc<RevocationList>,
    store: Arc<dyn UserStore>,
    user: Option<Principal>,
}

impl TokenGuard {
    /// Create a guard over a codec, revocation list, and user store.
    pub fn new(
        name: impl Into<String>,
        codec: Arc<TokenCodec>,
        revocations: Arc<RevocationList>,
        store: Arc<dyn UserStore>,
    ) -> Self {
        Self {
            name: name.into(),
            codec,
            revocations,
            store,
            user: None,
        }
    }

    /// The codec this guard validates against.
    #[must_use]
    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    /// The revocation list this guard consults.
    #[must_use]
    pub fn revocations(&self) -> &RevocationList {
        &self.revocations
    }

    /// Issue an access/refresh pair for a principal.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError`] if encoding or signing fails.
    pub fn issue_token_pair(&self, principal: &Principal) -> Result<TokenPair, TokenError> {
        self.issue_token_pair_with_claims(principal, Map::new())
    }

    /// Issue a pair with custom claims on the access token.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError`] if a custom claim collides with a reserved
    /// name or encoding fails.
    pub fn issue_token_pair_with_claims(
        &self,
        principal: &Principal,
        custom: Map<String, Value>,
    ) -> Result<TokenPair, TokenError> {
        let subject = principal.id.to_string();
        let access_token = self.codec.create_access_token(&subject, custom)?;
        let refresh_token = self.codec.create_refresh_token(&subject)?;

        tracing::info!(guard = %self.name, id = %principal.id, "Token pair issued");

        Ok(TokenPair {
            expires_at: expiry_of(&self.codec, &access_token),
            refresh_expires_at: expiry_of(&self.codec, &refresh_token),
            access_token,
            refresh_token,
            token_type: "Bearer".to_string(),
        })
    }

    /// Resolve a token to its principal without mutating guard state.
    ///
    /// The revocation list is consulted before the subject is trusted: a
    /// listed id is treated exactly like an invalid signature. Tokens
    /// without a `jti` cannot be revoked, so the guard refuses them.
    #[must_use]
    pub fn authenticate_token(&self, token: &str) -> Option<Principal> {
        let claims = self.codec.decode(token)?;

        let jti = claims.jti.as_deref()?;
        if self.revocations.has(jti) {
            tracing::warn!(guard = %self.name, jti = %jti, "Revoked token presented");
            return None;
        }

        self.store
            .retrieve_by_id(&Id::from_subject(&claims.sub))
            .filter(|principal| principal.active)
    }

    /// Revoke a token by its id, until its natural expiry.
    ///
    /// Returns whether anything was revoked; an invalid or expired token
    /// has nothing to revoke.
    pub fn revoke_token(&self, token: &str) -> bool {
        let Some(claims) = self.codec.decode(token) else {
            return false;
        };
        let Some(jti) = claims.jti else {
            return false;
        };
        self.revocations.add(jti, claims.exp);
        true
    }

    /// Exchange a valid refresh token for a brand-new pair.
    ///
    /// The presented token must be of refresh type and unrevoked; it is
    /// revoked as part of the exchange, so each refresh token is good for
    /// exactly one rotation.
    #[must_use]
    pub fn refresh_token_pair(&self, refresh_token: &str) -> Option<TokenPair> {
        let claims = self.codec.decode(refresh_token)?;
        if claims.token_type != TokenType::Refresh {
            return None;
        }

        let jti = claims.jti.as_deref()?;
        if self.revocations.has(jti) {
            tracing::warn!(guard = %self.name, jti = %jti, "Revoked refresh token presented");
            return None;
        }

        let principal = self
            .store
            .retrieve_by_id(&Id::from_subject(&claims.sub))
            .filter(|principal| principal.active)?;

        self.revocations.add(jti.to_string(), claims.exp);

        match self.issue_token_pair(&principal) {
            Ok(pair) => Some(pair),
            Err(e) => {
                tracing::error!(guard = %self.name, error = %e, "Token pair issuance failed");
                None
            }
        }
    }
}

impl Guard for TokenGuard {
    fn name(&self) -> &str {
        &self.name
    }

    fn attempt(&mut self, credentials: &Credentials) -> Option<Principal> {
        let principal = self.store.retrieve_by_credentials(credentials)?;
        if !principal.active || !self.store.validate_credentials(&principal, credentials) {
            return None;
        }

        self.login(principal.clone());
        Some(principal)
    }

    fn validate(&self, credentials: &Credentials) -> bool {
        self.store
            .retrieve_by_credentials(credentials)
            .filter(|p| p.active)
            .is_some_and(|p| self.store.validate_credentials(&p, credentials))
    }

    fn login(&mut self, principal: Principal) {
        self.user = Some(principal);
    }

    fn logout(&mut self) {
        self.user = None;
    }

    fn user(&mut self) -> Option<&Principal> {
        self.user.as_ref()
    }
}

/// Expiry of a token we just issued ourselves.
fn expiry_of(codec: &TokenCodec, token: &str) -> DateTime<Utc> {
    codec
        .expiration_of(token)
        .and_then(|exp| DateTime::from_timestamp(exp, 0))
        .unwrap_or_else(Utc::now)
}
