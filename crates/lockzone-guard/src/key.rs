//! API-key-backed guard.

use std::sync::Arc;

use lockzone_core::{Credentials, Principal};

use crate::api_key::{self, GeneratedKey};
use crate::guard::Guard;
use crate::store::UserStore;

/// Guard that authenticates static API keys.
///
/// No password is involved: the store maps a key's storage hash straight
/// to a principal.
pub struct KeyGuard {
    name: String,
    store: Arc<dyn UserStore>,
    user: Option<Principal>,
}

impl KeyGuard {
    /// Create a guard over a user store.
    pub fn new(name: impl Into<String>, store: Arc<dyn UserStore>) -> Self {
        Self {
            name: name.into(),
            store,
            user: None,
        }
    }

    /// Generate a new API key and its storage hash.
    ///
    /// The plaintext is returned exactly once; persist only the hash
    /// (e.g. via the store's key-assignment method).
    #[must_use]
    pub fn generate_key() -> GeneratedKey {
        api_key::generate()
    }

    /// Whether a string has the shape of an issued key.
    #[must_use]
    pub fn is_valid_format(key: &str) -> bool {
        api_key::is_valid_format(key)
    }

    /// Resolve a raw key to its principal without mutating guard state.
    #[must_use]
    pub fn authenticate_key(&self, key: &str) -> Option<Principal> {
        if !api_key::is_valid_format(key) {
            return None;
        }
        self.store
            .retrieve_by_api_key(key)
            .filter(|principal| principal.active)
    }
}

impl Guard for KeyGuard {
    fn name(&self) -> &str {
        &self.name
    }

    fn attempt(&mut self, credentials: &Credentials) -> Option<Principal> {
        let principal = self.authenticate_key(credentials.api_key()?)?;

        tracing::info!(guard = %self.name, id = %principal.id, "API key login");
        self.login(principal.clone());
        Some(principal)
    }

    fn validate(&self, credentials: &Credentials) -> bool {
        credentials
            .api_key()
            .is_some_and(|key| self.authenticate_key(key).is_some())
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryUserStore;

    fn setup() -> (KeyGuard, GeneratedKey) {
        let store = Arc::new(MemoryUserStore::new());
        let principal = store.create_user("service", "password123").unwrap();

        let generated = KeyGuard::generate_key();
        store
            .set_api_key_hash(&principal.id, &generated.hash)
            .unwrap();

        (KeyGuard::new("machine", store), generated)
    }

    #[test]
    fn test_attempt_with_valid_key() {
        let (mut guard, generated) = setup();

        let credentials = Credentials::new().with("api_key", generated.key.clone());
        let principal = guard.attempt(&credentials).unwrap();

        assert!(guard.check());
        assert_eq!(guard.id(), Some(principal.id));
    }

    #[test]
    fn test_unknown_key_rejected() {
        let (mut guard, _) = setup();

        let other = KeyGuard::generate_key();
        let credentials = Credentials::new().with("api_key", other.key);
        assert!(guard.attempt(&credentials).is_none());
        assert!(guard.guest());
    }

    #[test]
    fn test_malformed_key_rejected_without_lookup() {
        let (guard, _) = setup();

        assert!(guard.authenticate_key("").is_none());
        assert!(guard.authenticate_key("sk_wrong_prefix").is_none());
        assert!(guard.authenticate_key("lz_too-short").is_none());
    }

    #[test]
    fn test_missing_key_credential() {
        let (mut guard, _) = setup();

        let credentials = Credentials::new().with("username", "service");
        assert!(guard.attempt(&credentials).is_none());
        assert!(!guard.validate(&credentials));
    }

    #[test]
    fn test_validate_does_not_mutate() {
        let (mut guard, generated) = setup();

        let credentials = Credentials::new().with("api_key", generated.key.clone());
        assert!(guard.validate(&credentials));
        assert!(guard.guest());
    }

    #[test]
    fn test_logout() {
        let (mut guard, generated) = setup();

        let credentials = Credentials::new().with("api_key", generated.key.clone());
        guard.attempt(&credentials).unwrap();
        guard.logout();
        assert!(guard.guest());
    }
}
