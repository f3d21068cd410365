//! API key generation and verification.
//!
//! Keys are handed out once in plaintext and stored only as a SHA-256
//! hex digest. Lookup happens by digest; direct comparisons against a
//! stored digest are constant-time.

use std::fmt;

use rand::RngCore;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Prefix carried by every issued key.
pub const KEY_PREFIX: &str = "lz_";

/// Random bytes behind each key (hex-encoded into the key body).
const KEY_BYTES: usize = 32;

/// A freshly generated API key.
///
/// `key` is shown to the caller exactly once; only `hash` is stored.
#[derive(Clone)]
pub struct GeneratedKey {
    /// The plaintext key, e.g. `lz_3f9c…`.
    pub key: String,
    /// SHA-256 hex digest of the plaintext (64 characters).
    pub hash: String,
}

impl fmt::Debug for GeneratedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeneratedKey")
            .field("key", &"[REDACTED]")
            .field("hash", &self.hash)
            .finish()
    }
}

/// Generate a new API key and its storage hash.
#[must_use]
pub fn generate() -> GeneratedKey {
    let mut bytes = [0u8; KEY_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);

    let key = format!("{KEY_PREFIX}{}", hex::encode(bytes));
    let hash = hash_key(&key);
    GeneratedKey { key, hash }
}

/// SHA-256 hex digest of a key, as stored.
#[must_use]
pub fn hash_key(key: &str) -> String {
    hex::encode(Sha256::digest(key.as_bytes()))
}

/// Whether a string has the shape of an issued key.
///
/// Format only; says nothing about whether the key exists.
#[must_use]
pub fn is_valid_format(key: &str) -> bool {
    key.strip_prefix(KEY_PREFIX).is_some_and(|body| {
        body.len() == KEY_BYTES * 2 && body.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
    })
}

/// Compare a plaintext key against a stored digest in constant time.
#[must_use]
pub fn verify_key(key: &str, stored_hash: &str) -> bool {
    let computed = hash_key(key);
    if computed.len() != stored_hash.len() {
        return false;
    }
    computed.as_bytes().ct_eq(stored_hash.as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_key_shape() {
        let generated = generate();

        assert!(generated.key.starts_with(KEY_PREFIX));
        assert!(is_valid_format(&generated.key));
        assert_eq!(generated.hash.len(), 64);
        assert_eq!(generated.hash, hash_key(&generated.key));
    }

    #[test]
    fn test_keys_are_unique() {
        assert_ne!(generate().key, generate().key);
    }

    #[test]
    fn test_format_validation() {
        assert!(!is_valid_format(""));
        assert!(!is_valid_format("lz_"));
        assert!(!is_valid_format("sk_0123456789abcdef"));
        assert!(!is_valid_format(&format!("{KEY_PREFIX}{}", "z".repeat(64))));
        assert!(!is_valid_format(&format!("{KEY_PREFIX}{}", "a".repeat(63))));
        assert!(is_valid_format(&format!("{KEY_PREFIX}{}", "a".repeat(64))));
    }

    #[test]
    fn test_verify_key() {
        let generated = generate();

        assert!(verify_key(&generated.key, &generated.hash));
        assert!(!verify_key("lz_wrong", &generated.hash));
        assert!(!verify_key(&generated.key, "not-a-digest"));
    }

    #[test]
    fn test_debug_redacts_plaintext() {
        let generated = generate();
        let debug = format!("{generated:?}");
        assert!(!debug.contains(&generated.key));
        assert!(debug.contains("[REDACTED]"));
    }
}
