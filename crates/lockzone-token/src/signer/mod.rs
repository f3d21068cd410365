//! Signature primitives.
//!
//! A [`Signer`] produces and verifies a signature over an opaque byte
//! string. Key material problems are construction errors; a failed
//! verification is just `false`. The one exceptional runtime condition is
//! signing with a verify-only RSA signer, which is caller misuse and gets
//! its own error variant.

use std::fmt;
use std::str::FromStr;

use hmac::{Hmac, Mac};
use rand::RngCore;
use rand::rngs::OsRng;
use rsa::pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::{Pkcs1v15Sign, RsaPrivateKey, RsaPublicKey};
use secrecy::{ExposeSecret, SecretBox};
use sha2::{Digest, Sha256, Sha384, Sha512};
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;
type HmacSha384 = Hmac<Sha384>;
type HmacSha512 = Hmac<Sha512>;

/// Default RSA modulus size in bits.
pub const DEFAULT_RSA_BITS: usize = 2048;

/// Supported signing algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    /// HMAC with SHA-256.
    HS256,
    /// HMAC with SHA-384.
    HS384,
    /// HMAC with SHA-512.
    HS512,
    /// RSA PKCS#1 v1.5 with SHA-256.
    RS256,
}

impl Algorithm {
    /// The wire identifier, as written into token headers.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::HS256 => "HS256",
            Self::HS384 => "HS384",
            Self::HS512 => "HS512",
            Self::RS256 => "RS256",
        }
    }

    /// Whether this is one of the symmetric HMAC variants.
    #[must_use]
    pub fn is_hmac(self) -> bool {
        matches!(self, Self::HS256 | Self::HS384 | Self::HS512)
    }

    /// Recommended minimum secret length in bytes for the HMAC variants.
    #[must_use]
    pub fn recommended_secret_len(self) -> usize {
        match self {
            Self::HS256 | Self::RS256 => 32,
            Self::HS384 => 48,
            Self::HS512 => 64,
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Algorithm {
    type Err = SignerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "HS256" => Ok(Self::HS256),
            "HS384" => Ok(Self::HS384),
            "HS512" => Ok(Self::HS512),
            "RS256" => Ok(Self::RS256),
            other => Err(SignerError::InvalidKey(format!(
                "unknown algorithm: {other}"
            ))),
        }
    }
}

/// Signer errors.
#[derive(Debug, Error)]
pub enum SignerError {
    /// Neither a secret nor any RSA key was supplied.
    #[error("No key material supplied")]
    MissingKey,

    /// Key material was supplied but could not be used.
    #[error("Invalid key material: {0}")]
    InvalidKey(String),

    /// Sign was called on a signer holding only a public key.
    #[error("Signer holds no private key; it can only verify")]
    VerifyOnly,

    /// The underlying signature operation failed.
    #[error("Signing failed: {0}")]
    Signature(String),
}

/// A generated RSA key pair, PEM-encoded.
#[derive(Clone)]
pub struct RsaKeyPair {
    /// PKCS#8 private key.
    pub private_pem: String,
    /// SPKI public key.
    pub public_pem: String,
}

impl RsaKeyPair {
    /// Generate a key pair with the given modulus size.
    ///
    /// # Errors
    ///
    /// Returns [`SignerError::Signature`] if key generation fails.
    pub fn generate(bits: usize) -> Result<Self, SignerError> {
        let private = RsaPrivateKey::new(&mut OsRng, bits)
            .map_err(|e| SignerError::Signature(format!("key generation failed: {e}")))?;
        let public = RsaPublicKey::from(&private);

        let private_pem = private
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| SignerError::Signature(format!("private key encoding failed: {e}")))?
            .to_string();
        let public_pem = public
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| SignerError::Signature(format!("public key encoding failed: {e}")))?;

        Ok(Self {
            private_pem,
            public_pem,
        })
    }

    /// Generate a key pair with the default modulus size.
    ///
    /// # Errors
    ///
    /// Returns [`SignerError::Signature`] if key generation fails.
    pub fn generate_default() -> Result<Self, SignerError> {
        Self::generate(DEFAULT_RSA_BITS)
    }
}

impl fmt::Debug for RsaKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RsaKeyPair").finish_non_exhaustive()
    }
}

enum SignerKind {
    Hmac {
        algorithm: Algorithm,
        secret: SecretBox<[u8]>,
    },
    Rsa {
        private: Option<Box<RsaPrivateKey>>,
        public: RsaPublicKey,
    },
}

/// Produces and verifies signatures over opaque byte strings.
pub struct Signer {
    kind: SignerKind,
}

impl Signer {
    /// Create an HMAC signer.
    ///
    /// The secret should be at least as long as the hash output
    /// ([`Algorithm::recommended_secret_len`]); shorter secrets are
    /// accepted with a warning.
    ///
    /// # Errors
    ///
    /// Returns [`SignerError::MissingKey`] on an empty secret and
    /// [`SignerError::InvalidKey`] if the algorithm is not an HMAC
    /// variant.
    pub fn hmac(algorithm: Algorithm, secret: &[u8]) -> Result<Self, SignerError> {
        if !algorithm.is_hmac() {
            return Err(SignerError::InvalidKey(format!(
                "{algorithm} is not an HMAC algorithm"
            )));
        }
        if secret.is_empty() {
            return Err(SignerError::MissingKey);
        }
        if secret.len() < algorithm.recommended_secret_len() {
            tracing::warn!(
                algorithm = %algorithm,
                secret_len = secret.len(),
                recommended = algorithm.recommended_secret_len(),
                "HMAC secret is shorter than the hash output"
            );
        }

        Ok(Self {
            kind: SignerKind::Hmac {
                algorithm,
                secret: SecretBox::new(secret.to_vec().into_boxed_slice()),
            },
        })
    }

    /// Create an HS256 signer from a string secret.
    ///
    /// # Errors
    ///
    /// Returns [`SignerError::MissingKey`] on an empty secret.
    pub fn from_secret(secret: &str) -> Result<Self, SignerError> {
        Self::hmac(Algorithm::HS256, secret.as_bytes())
    }

    /// Create an RS256 signer from PEM key material.
    ///
    /// At least one half must be supplied. With only a private key, the
    /// public half is derived from it; with only a public key, the signer
    /// can verify but [`Signer::sign`] fails with
    /// [`SignerError::VerifyOnly`].
    ///
    /// # Errors
    ///
    /// Returns [`SignerError::MissingKey`] when neither half is supplied
    /// and [`SignerError::InvalidKey`] on unparseable PEM.
    pub fn rsa_from_pem(
        private_pem: Option<&str>,
        public_pem: Option<&str>,
    ) -> Result<Self, SignerError> {
        let private = private_pem.map(parse_private_pem).transpose()?;

        let public = match (public_pem, &private) {
            (Some(pem), _) => parse_public_pem(pem)?,
            (None, Some(private)) => RsaPublicKey::from(private.as_ref()),
            (None, None) => return Err(SignerError::MissingKey),
        };

        Ok(Self {
            kind: SignerKind::Rsa { private, public },
        })
    }

    /// The configured algorithm.
    #[must_use]
    pub fn algorithm(&self) -> Algorithm {
        match &self.kind {
            SignerKind::Hmac { algorithm, .. } => *algorithm,
            SignerKind::Rsa { .. } => Algorithm::RS256,
        }
    }

    /// Whether this signer can produce signatures.
    #[must_use]
    pub fn can_sign(&self) -> bool {
        match &self.kind {
            SignerKind::Hmac { .. } => true,
            SignerKind::Rsa { private, .. } => private.is_some(),
        }
    }

    /// Sign a byte string.
    ///
    /// RSA signatures use PKCS#1 v1.5 padding over a SHA-256 digest and
    /// are deterministic: the same key and input always produce the same
    /// bytes.
    ///
    /// # Errors
    ///
    /// Returns [`SignerError::VerifyOnly`] on a public-key-only RSA
    /// signer and [`SignerError::Signature`] if the primitive fails.
    pub fn sign(&self, data: &[u8]) -> Result<Vec<u8>, SignerError> {
        match &self.kind {
            SignerKind::Hmac { algorithm, secret } => {
                hmac_sign(*algorithm, secret.expose_secret(), data)
            }
            SignerKind::Rsa { private, .. } => {
                let private = private.as_deref().ok_or(SignerError::VerifyOnly)?;
                let digest = Sha256::digest(data);
                private
                    .sign(Pkcs1v15Sign::new::<Sha256>(), &digest)
                    .map_err(|e| SignerError::Signature(e.to_string()))
            }
        }
    }

    /// Verify a signature over a byte string.
    ///
    /// Never fails: any length or byte mismatch, including one produced
    /// by tampering, is simply `false`. HMAC comparison is constant-time.
    #[must_use]
    pub fn verify(&self, data: &[u8], signature: &[u8]) -> bool {
        match &self.kind {
            SignerKind::Hmac { algorithm, secret } => {
                hmac_verify(*algorithm, secret.expose_secret(), data, signature)
            }
            SignerKind::Rsa { public, .. } => {
                let digest = Sha256::digest(data);
                public
                    .verify(Pkcs1v15Sign::new::<Sha256>(), &digest, signature)
                    .is_ok()
            }
        }
    }

    /// Generate a random 256-bit secret.
    #[must_use]
    pub fn generate_secret() -> [u8; 32] {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        bytes
    }

    /// Generate a random 256-bit secret as a hex string.
    #[must_use]
    pub fn generate_hex_secret() -> String {
        hex::encode(Self::generate_secret())
    }
}

impl fmt::Debug for Signer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signer")
            .field("algorithm", &self.algorithm())
            .field("can_sign", &self.can_sign())
            .finish_non_exhaustive()
    }
}

fn parse_private_pem(pem: &str) -> Result<Box<RsaPrivateKey>, SignerError> {
    RsaPrivateKey::from_pkcs8_pem(pem)
        .or_else(|_| RsaPrivateKey::from_pkcs1_pem(pem))
        .map(Box::new)
        .map_err(|e| SignerError::InvalidKey(format!("unparseable private key PEM: {e}")))
}

fn parse_public_pem(pem: &str) -> Result<RsaPublicKey, SignerError> {
    RsaPublicKey::from_public_key_pem(pem)
        .or_else(|_| RsaPublicKey::from_pkcs1_pem(pem))
        .map_err(|e| SignerError::InvalidKey(format!("unparseable public key PEM: {e}")))
}

fn hmac_sign(algorithm: Algorithm, secret: &[u8], data: &[u8]) -> Result<Vec<u8>, SignerError> {
    macro_rules! sign_with {
        ($mac:ty) => {{
            let mut mac = <$mac>::new_from_slice(secret)
                .map_err(|e| SignerError::Signature(e.to_string()))?;
            mac.update(data);
            Ok(mac.finalize().into_bytes().to_vec())
        }};
    }

    match algorithm {
        Algorithm::HS256 => sign_with!(HmacSha256),
        Algorithm::HS384 => sign_with!(HmacSha384),
        Algorithm::HS512 => sign_with!(HmacSha512),
        Algorithm::RS256 => Err(SignerError::Signature(
            "RS256 dispatched to HMAC path".to_string(),
        )),
    }
}

fn hmac_verify(algorithm: Algorithm, secret: &[u8], data: &[u8], signature: &[u8]) -> bool {
    macro_rules! verify_with {
        ($mac:ty) => {{
            let Ok(mut mac) = <$mac>::new_from_slice(secret) else {
                return false;
            };
            mac.update(data);
            mac.verify_slice(signature).is_ok()
        }};
    }

    match algorithm {
        Algorithm::HS256 => verify_with!(HmacSha256),
        Algorithm::HS384 => verify_with!(HmacSha384),
        Algorithm::HS512 => verify_with!(HmacSha512),
        Algorithm::RS256 => false,
    }
}
