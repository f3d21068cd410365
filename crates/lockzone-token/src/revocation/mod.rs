//! Token revocation list.
//!
//! Stateless tokens cannot be deleted, so revocation keeps the inverse
//! set: token ids that must be rejected despite a valid signature and an
//! unexpired `exp`. Entries carry the token's own expiry, so `cleanup`
//! can purge them the moment the token would have died naturally and the
//! set stays bounded.
//!
//! The map is guarded internally; a single list can be shared behind an
//! `Arc` across a multi-threaded host.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use chrono::Utc;

/// In-memory set of revoked token ids.
///
/// Keyed by `jti` only, never by the raw token string, so the issuance,
/// revocation, and authentication paths all agree on the key.
#[derive(Debug, Default)]
pub struct RevocationList {
    entries: RwLock<HashMap<String, i64>>,
}

impl RevocationList {
    /// Create an empty list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Revoke a token id until `expires_at` (unix seconds).
    pub fn add(&self, jti: impl Into<String>, expires_at: i64) {
        let jti = jti.into();
        tracing::debug!(jti = %jti, expires_at, "Token revoked");
        self.write().insert(jti, expires_at);
    }

    /// Whether a token id is revoked.
    #[must_use]
    pub fn has(&self, jti: &str) -> bool {
        self.read().contains_key(jti)
    }

    /// Alias for [`Self::has`].
    #[must_use]
    pub fn is_revoked(&self, jti: &str) -> bool {
        self.has(jti)
    }

    /// Un-revoke a token id. Returns whether an entry was removed.
    pub fn remove(&self, jti: &str) -> bool {
        self.write().remove(jti).is_some()
    }

    /// Drop every entry.
    pub fn clear(&self) {
        self.write().clear();
    }

    /// Purge entries whose tokens have expired on their own.
    ///
    /// Returns how many entries were removed. Entries for still-live
    /// tokens are untouched.
    pub fn cleanup(&self) -> usize {
        let now = Utc::now().timestamp();
        let mut entries = self.write();
        let before = entries.len();
        entries.retain(|_, expires_at| *expires_at > now);
        let removed = before - entries.len();
        if removed > 0 {
            tracing::debug!(removed, remaining = entries.len(), "Revocation cleanup");
        }
        removed
    }

    /// Number of revoked ids currently tracked.
    #[must_use]
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Whether the list is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, i64>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, i64>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_has_remove() {
        let list = RevocationList::new();
        let exp = Utc::now().timestamp() + 3600;

        list.add("jti-1", exp);
        assert!(list.has("jti-1"));
        assert!(list.is_revoked("jti-1"));
        assert!(!list.has("jti-2"));

        assert!(list.remove("jti-1"));
        assert!(!list.has("jti-1"));
        assert!(!list.remove("jti-1"));
    }

    #[test]
    fn test_cleanup_purges_only_expired() {
        let list = RevocationList::new();
        let now = Utc::now().timestamp();

        list.add("dead-1", now - 10);
        list.add("dead-2", now - 1);
        list.add("live-1", now + 3600);
        list.add("live-2", now + 7200);

        assert_eq!(list.cleanup(), 2);
        assert_eq!(list.len(), 2);
        assert!(!list.has("dead-1"));
        assert!(!list.has("dead-2"));
        assert!(list.has("live-1"));
        assert!(list.has("live-2"));

        // Nothing left to purge.
        assert_eq!(list.cleanup(), 0);
    }

    #[test]
    fn test_clear() {
        let list = RevocationList::new();
        list.add("a", Utc::now().timestamp() + 60);
        list.add("b", Utc::now().timestamp() + 60);

        list.clear();
        assert!(list.is_empty());
    }

    #[test]
    fn test_shared_across_threads() {
        use std::sync::Arc;

        let list = Arc::new(RevocationList::new());
        let exp = Utc::now().timestamp() + 3600;

        let handles: Vec<_> = (0..4)
            .map(|i| {
                let list = Arc::clone(&list);
                std::thread::spawn(move || {
                    list.add(format!("jti-{i}"), exp);
                    assert!(list.has(&format!("jti-{i}")));
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(list.len(), 4);
    }
}
