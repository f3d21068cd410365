//! Password hashing strategy.
//!
//! Guards and stores never compare plaintext; they delegate to a
//! [`PasswordHasher`]. The default implementation is Argon2id in PHC
//! string format.

use argon2::{
    Argon2, Params,
    password_hash::{
        PasswordHash, PasswordHasher as PhcHasher, PasswordVerifier, SaltString, rand_core::OsRng,
    },
};
use thiserror::Error;

/// Minimum accepted length for a new password.
///
/// Enforced when creating principals, not when verifying existing ones.
pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Password hashing errors.
#[derive(Debug, Error)]
pub enum PasswordError {
    /// Hashing failed.
    #[error("Password hashing failed: {0}")]
    Hash(String),
}

/// Hash and verify passwords.
///
/// `verify` and `needs_rehash` never fail: malformed or missing input
/// degrades to `false` / `true` respectively, so callers can branch
/// without error plumbing.
pub trait PasswordHasher: Send + Sync {
    /// Hash a plaintext password for storage.
    ///
    /// # Errors
    ///
    /// Returns [`PasswordError`] if the underlying hasher fails.
    fn hash(&self, plaintext: &str) -> Result<String, PasswordError>;

    /// Verify a plaintext password against a stored hash.
    fn verify(&self, plaintext: &str, hash: &str) -> bool;

    /// Whether a stored hash predates the current parameters and should
    /// be recomputed on next successful login.
    fn needs_rehash(&self, hash: &str) -> bool;
}

/// Argon2id hasher with the library-default cost parameters.
#[derive(Debug, Clone, Default)]
pub struct Argon2Hasher;

impl Argon2Hasher {
    /// Create a new hasher.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl PasswordHasher for Argon2Hasher {
    fn hash(&self, plaintext: &str) -> Result<String, PasswordError> {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(plaintext.as_bytes(), &salt)
            .map(|h| h.to_string())
            .map_err(|e| PasswordError::Hash(e.to_string()))
    }

    fn verify(&self, plaintext: &str, hash: &str) -> bool {
        if plaintext.is_empty() || hash.is_empty() {
            return false;
        }
        let Ok(parsed) = PasswordHash::new(hash) else {
            return false;
        };
        Argon2::default()
            .verify_password(plaintext.as_bytes(), &parsed)
            .is_ok()
    }

    fn needs_rehash(&self, hash: &str) -> bool {
        let Ok(parsed) = PasswordHash::new(hash) else {
            return true;
        };
        if parsed.algorithm.as_str() != "argon2id" {
            return true;
        }
        let Ok(params) = Params::try_from(&parsed) else {
            return true;
        };
        let current = Params::default();
        params.m_cost() != current.m_cost()
            || params.t_cost() != current.t_cost()
            || params.p_cost() != current.p_cost()
    }
}

/// Whether a new password meets the minimum strength floor.
#[must_use]
pub fn meets_strength_floor(plaintext: &str) -> bool {
    plaintext.chars().count() >= MIN_PASSWORD_LENGTH
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify() {
        let hasher = Argon2Hasher::new();
        let hash = hasher.hash("correct horse battery staple").unwrap();

        assert!(hasher.verify("correct horse battery staple", &hash));
        assert!(!hasher.verify("wrong password", &hash));
    }

    #[test]
    fn test_hashes_are_salted() {
        let hasher = Argon2Hasher::new();
        let a = hasher.hash("same password").unwrap();
        let b = hasher.hash("same password").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_verify_degrades_on_bad_input() {
        let hasher = Argon2Hasher::new();
        let hash = hasher.hash("password123").unwrap();

        assert!(!hasher.verify("", &hash));
        assert!(!hasher.verify("password123", ""));
        assert!(!hasher.verify("password123", "not-a-phc-string"));
    }

    #[test]
    fn test_needs_rehash() {
        let hasher = Argon2Hasher::new();
        let hash = hasher.hash("password123").unwrap();

        assert!(!hasher.needs_rehash(&hash));
        assert!(hasher.needs_rehash("not-a-phc-string"));
        // Old hash produced with non-default cost parameters.
        assert!(hasher.needs_rehash(
            "$argon2id$v=19$m=4096,t=2,p=1$c29tZXNhbHQAAAAAAAAAAA$bkeY+7RCPtJcAg8WHh+nYVpYMP9BW06WZkbYC0t/Bkc"
        ));
    }

    #[test]
    fn test_strength_floor() {
        assert!(meets_strength_floor("12345678"));
        assert!(!meets_strength_floor("1234567"));
        assert!(!meets_strength_floor(""));
    }
}
