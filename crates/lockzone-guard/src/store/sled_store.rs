//! Sled-backed user store.

use std::path::Path;
use std::sync::Arc;

use chrono::Utc;

use lockzone_core::password::{self, Argon2Hasher, PasswordHasher};
use lockzone_core::{Credentials, Id, Principal};

use super::{StoreError, UserStore, check_password, new_user_id, remember_token_matches};
use crate::api_key;

/// Prefix for name-index entries.
const NAME_IDX: &str = "idx:name:";
/// Prefix for email-index entries.
const EMAIL_IDX: &str = "idx:email:";
/// Prefix for API-key-hash index entries.
const API_KEY_IDX: &str = "idx:apikey:";
/// Prefix for the id → key-hash reverse entries.
const API_KEY_REV: &str = "key:";

/// Persistent user store backed by sled.
///
/// Records are JSON values keyed by a typed id key; names, emails, and
/// API-key hashes live as secondary-index entries in the same tree.
pub struct SledUserStore {
    db: sled::Db,
    tree: sled::Tree,
    hasher: Arc<dyn PasswordHasher>,
}

/// Typed record key, distinct for integer and string ids.
fn id_key(id: &Id) -> String {
    match id {
        Id::Int(n) => format!("i:{n}"),
        Id::Str(s) => format!("s:{s}"),
    }
}

fn is_index_key(key: &[u8]) -> bool {
    key.starts_with(b"idx:") || key.starts_with(API_KEY_REV.as_bytes())
}

impl SledUserStore {
    /// Open or create a store at the given path.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Storage`] if the database cannot be opened.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let db = sled::open(path.join("auth"))
            .map_err(|e| StoreError::Storage(format!("Failed to open auth database: {e}")))?;
        Self::with_db(db)
    }

    /// Create a store over an existing sled database.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Storage`] if the tree cannot be opened.
    pub fn with_db(db: sled::Db) -> Result<Self, StoreError> {
        let tree = db
            .open_tree("principals")
            .map_err(|e| StoreError::Storage(format!("Failed to open principals tree: {e}")))?;

        Ok(Self {
            db,
            tree,
            hasher: Arc::new(Argon2Hasher::new()),
        })
    }

    /// Swap the password-hashing strategy.
    #[must_use]
    pub fn with_hasher(mut self, hasher: Arc<dyn PasswordHasher>) -> Self {
        self.hasher = hasher;
        self
    }

    /// The underlying sled database.
    #[must_use]
    pub fn db(&self) -> &sled::Db {
        &self.db
    }

    /// Whether any principals exist.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// Count stored principals, excluding index entries.
    #[must_use]
    pub fn count(&self) -> usize {
        self.tree
            .iter()
            .filter(|r| {
                r.as_ref()
                    .map(|(k, _)| !is_index_key(k))
                    .unwrap_or(false)
            })
            .count()
    }

    /// Create and persist a principal with a hashed password.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::WeakPassword`] below the strength floor and
    /// [`StoreError::UserExists`] on a duplicate name.
    pub fn create_user(&self, username: &str, plaintext: &str) -> Result<Principal, StoreError> {
        if !password::meets_strength_floor(plaintext) {
            return Err(StoreError::WeakPassword);
        }

        let principal = Principal::new(new_user_id())
            .with_name(username)
            .with_password_hash(self.hasher.hash(plaintext)?);

        self.create(&principal)?;
        Ok(principal)
    }

    /// Persist a new principal.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::UserExists`] if the id or name is taken, or
    /// [`StoreError::Storage`] on a backend failure.
    pub fn create(&self, principal: &Principal) -> Result<(), StoreError> {
        if self.get(&principal.id)?.is_some() {
            return Err(StoreError::UserExists(principal.id.to_string()));
        }
        if let Some(name) = &principal.name {
            if self.get_by_name(name)?.is_some() {
                return Err(StoreError::UserExists(name.clone()));
            }
        }

        let key = id_key(&principal.id);
        let value = serde_json::to_vec(principal)?;

        self.insert_raw(key.as_bytes(), value)?;
        self.write_indexes(&key, principal)?;
        self.flush()
    }

    /// Load a principal by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Storage`] on a backend failure.
    pub fn get(&self, id: &Id) -> Result<Option<Principal>, StoreError> {
        self.get_raw(id_key(id).as_bytes())
    }

    /// Load a principal by name.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Storage`] on a backend failure.
    pub fn get_by_name(&self, name: &str) -> Result<Option<Principal>, StoreError> {
        self.get_via_index(&format!("{NAME_IDX}{name}"))
    }

    /// Load a principal by email.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Storage`] on a backend failure.
    pub fn get_by_email(&self, email: &str) -> Result<Option<Principal>, StoreError> {
        self.get_via_index(&format!("{EMAIL_IDX}{email}"))
    }

    /// Load a principal by API-key hash.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Storage`] on a backend failure.
    pub fn get_by_api_key_hash(&self, hash: &str) -> Result<Option<Principal>, StoreError> {
        self.get_via_index(&format!("{API_KEY_IDX}{hash}"))
    }

    /// Replace a stored principal, refreshing stale indexes.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::UserNotFound`] if the id is unknown.
    pub fn update(&self, principal: &Principal) -> Result<(), StoreError> {
        let Some(old) = self.get(&principal.id)? else {
            return Err(StoreError::UserNotFound(principal.id.to_string()));
        };

        let key = id_key(&principal.id);
        self.remove_indexes(&old)?;

        let value = serde_json::to_vec(principal)?;
        self.insert_raw(key.as_bytes(), value)?;
        self.write_indexes(&key, principal)?;
        self.flush()
    }

    /// Delete a principal and its index entries.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Storage`] on a backend failure.
    pub fn delete(&self, id: &Id) -> Result<bool, StoreError> {
        let key = id_key(id);

        if let Some(old) = self.get(id)? {
            self.remove_indexes(&old)?;
        }
        if let Some(hash) = self.remove_raw(format!("{API_KEY_REV}{key}").as_bytes())? {
            self.remove_raw(format!("{API_KEY_IDX}{}", String::from_utf8_lossy(&hash)).as_bytes())?;
        }

        let removed = self.remove_raw(key.as_bytes())?.is_some();
        self.flush()?;
        Ok(removed)
    }

    /// List all principals.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Storage`] on a backend failure.
    pub fn list(&self) -> Result<Vec<Principal>, StoreError> {
        let mut principals = Vec::new();

        for result in self.tree.iter() {
            let (key, value) =
                result.map_err(|e| StoreError::Storage(format!("Iter error: {e}")))?;
            if is_index_key(&key) {
                continue;
            }
            principals.push(serde_json::from_slice(&value)?);
        }

        Ok(principals)
    }

    /// Associate an API-key hash with a principal, replacing any
    /// previously assigned key.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::UserNotFound`] if the id is unknown.
    pub fn set_api_key_hash(&self, id: &Id, hash: &str) -> Result<(), StoreError> {
        if self.get(id)?.is_none() {
            return Err(StoreError::UserNotFound(id.to_string()));
        }

        let key = id_key(id);
        let reverse_key = format!("{API_KEY_REV}{key}");

        if let Some(old) = self.get_raw_bytes(reverse_key.as_bytes())? {
            self.remove_raw(format!("{API_KEY_IDX}{}", String::from_utf8_lossy(&old)).as_bytes())?;
        }

        self.insert_raw(
            format!("{API_KEY_IDX}{hash}").as_bytes(),
            key.clone().into_bytes(),
        )?;
        self.insert_raw(reverse_key.as_bytes(), hash.as_bytes().to_vec())?;
        self.flush()
    }

    /// Stamp the last-login time for a principal.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::UserNotFound`] if the id is unknown.
    pub fn update_last_login(&self, id: &Id) -> Result<(), StoreError> {
        let mut principal = self
            .get(id)?
            .ok_or_else(|| StoreError::UserNotFound(id.to_string()))?;

        principal.last_login = Some(Utc::now());
        self.update(&principal)
    }

    fn write_indexes(&self, key: &str, principal: &Principal) -> Result<(), StoreError> {
        if let Some(name) = &principal.name {
            self.insert_raw(
                format!("{NAME_IDX}{name}").as_bytes(),
                key.as_bytes().to_vec(),
            )?;
        }
        if let Some(email) = &principal.email {
            self.insert_raw(
                format!("{EMAIL_IDX}{email}").as_bytes(),
                key.as_bytes().to_vec(),
            )?;
        }
        Ok(())
    }

    fn remove_indexes(&self, principal: &Principal) -> Result<(), StoreError> {
        if let Some(name) = &principal.name {
            self.remove_raw(format!("{NAME_IDX}{name}").as_bytes())?;
        }
        if let Some(email) = &principal.email {
            self.remove_raw(format!("{EMAIL_IDX}{email}").as_bytes())?;
        }
        Ok(())
    }

    fn get_via_index(&self, index_key: &str) -> Result<Option<Principal>, StoreError> {
        match self.get_raw_bytes(index_key.as_bytes())? {
            Some(record_key) => self.get_raw(&record_key),
            None => Ok(None),
        }
    }

    fn get_raw(&self, key: &[u8]) -> Result<Option<Principal>, StoreError> {
        match self.get_raw_bytes(key)? {
            Some(value) => Ok(Some(serde_json::from_slice(&value)?)),
            None => Ok(None),
        }
    }

    fn get_raw_bytes(&self, key: &[u8]) -> Result<Option<sled::IVec>, StoreError> {
        self.tree
            .get(key)
            .map_err(|e| StoreError::Storage(format!("Get error: {e}")))
    }

    fn insert_raw(&self, key: &[u8], value: Vec<u8>) -> Result<(), StoreError> {
        self.tree
            .insert(key, value)
            .map(|_| ())
            .map_err(|e| StoreError::Storage(format!("Insert error: {e}")))
    }

    fn remove_raw(&self, key: &[u8]) -> Result<Option<sled::IVec>, StoreError> {
        self.tree
            .remove(key)
            .map_err(|e| StoreError::Storage(format!("Remove error: {e}")))
    }

    fn flush(&self) -> Result<(), StoreError> {
        self.tree
            .flush()
            .map(|_| ())
            .map_err(|e| StoreError::Storage(format!("Flush error: {e}")))
    }
}

/// The authentication path degrades storage failures to `None` with an
/// error log; management code uses the `Result` surface above instead.
impl UserStore for SledUserStore {
    fn retrieve_by_id(&self, id: &Id) -> Option<Principal> {
        self.get(id).unwrap_or_else(|e| {
            tracing::error!(error = %e, "Principal lookup by id failed");
            None
        })
    }

    fn retrieve_by_credentials(&self, credentials: &Credentials) -> Option<Principal> {
        let name = credentials
            .get("username")
            .or_else(|| credentials.get("name"));

        if let Some(name) = name {
            match self.get_by_name(name) {
                Ok(Some(found)) => return Some(found),
                Ok(None) => {}
                Err(e) => {
                    tracing::error!(error = %e, "Principal lookup by name failed");
                    return None;
                }
            }
        }

        if let Some(email) = credentials.get("email") {
            match self.get_by_email(email) {
                Ok(found) => return found,
                Err(e) => {
                    tracing::error!(error = %e, "Principal lookup by email failed");
                    return None;
                }
            }
        }

        None
    }

    fn validate_credentials(&self, principal: &Principal, credentials: &Credentials) -> bool {
        check_password(self.hasher.as_ref(), principal, credentials)
    }

    fn retrieve_by_token(&self, id: &Id, remember_token: &str) -> Option<Principal> {
        self.retrieve_by_id(id)
            .filter(|p| remember_token_matches(p, remember_token))
    }

    fn update_remember_token(&self, principal: &Principal, token: &str) {
        let Some(mut stored) = self.retrieve_by_id(&principal.id) else {
            return;
        };
        stored.remember_token = Some(token.to_string());
        if let Err(e) = self.update(&stored) {
            tracing::error!(error = %e, "Remember-token update failed");
        }
    }

    fn retrieve_by_api_key(&self, key: &str) -> Option<Principal> {
        self.get_by_api_key_hash(&api_key::hash_key(key))
            .unwrap_or_else(|e| {
                tracing::error!(error = %e, "Principal lookup by API key failed");
                None
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open_store(dir: &TempDir) -> SledUserStore {
        SledUserStore::open(dir.path()).unwrap()
    }

    #[test]
    fn test_create_and_get() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        assert!(store.is_empty());

        let principal = store.create_user("admin", "secret-password").unwrap();
        assert!(!store.is_empty());
        assert_eq!(store.count(), 1);

        let loaded = store.get(&principal.id).unwrap().unwrap();
        assert_eq!(loaded.name.as_deref(), Some("admin"));

        let by_name = store.get_by_name("admin").unwrap().unwrap();
        assert_eq!(by_name.id, principal.id);
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        store.create_user("admin", "secret-password").unwrap();
        assert!(matches!(
            store.create_user("admin", "other-password"),
            Err(StoreError::UserExists(_))
        ));
    }

    #[test]
    fn test_int_and_string_ids_do_not_collide() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        store.create(&Principal::new(Id::Int(42))).unwrap();
        store.create(&Principal::new(Id::Str("42".into()))).unwrap();

        assert_eq!(store.count(), 2);
        assert!(store.get(&Id::Int(42)).unwrap().is_some());
        assert!(store.get(&Id::Str("42".into())).unwrap().is_some());
    }

    #[test]
    fn test_update_refreshes_indexes() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        let mut principal = store.create_user("admin", "secret-password").unwrap();
        principal.name = Some("root".to_string());
        store.update(&principal).unwrap();

        assert!(store.get_by_name("admin").unwrap().is_none());
        assert!(store.get_by_name("root").unwrap().is_some());
    }

    #[test]
    fn test_delete_removes_indexes() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        let principal = store.create_user("admin", "secret-password").unwrap();
        let generated = api_key::generate();
        store.set_api_key_hash(&principal.id, &generated.hash).unwrap();

        assert!(store.delete(&principal.id).unwrap());
        assert!(!store.delete(&principal.id).unwrap());
        assert!(store.get_by_name("admin").unwrap().is_none());
        assert!(store.retrieve_by_api_key(&generated.key).is_none());
        assert_eq!(store.count(), 0);
    }

    #[test]
    fn test_api_key_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        let principal = store.create_user("service", "secret-password").unwrap();
        let generated = api_key::generate();
        store.set_api_key_hash(&principal.id, &generated.hash).unwrap();

        let found = store.retrieve_by_api_key(&generated.key).unwrap();
        assert_eq!(found.id, principal.id);

        // Reassignment invalidates the previous key.
        let replacement = api_key::generate();
        store
            .set_api_key_hash(&principal.id, &replacement.hash)
            .unwrap();
        assert!(store.retrieve_by_api_key(&generated.key).is_none());
        assert!(store.retrieve_by_api_key(&replacement.key).is_some());
    }

    #[test]
    fn test_trait_surface() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        let principal = store.create_user("kim", "password123").unwrap();

        let credentials = Credentials::new()
            .with("username", "kim")
            .with("password", "password123");

        let found = store.retrieve_by_credentials(&credentials).unwrap();
        assert!(store.validate_credentials(&found, &credentials));

        store.update_remember_token(&principal, "remember-me");
        assert!(store.retrieve_by_token(&principal.id, "remember-me").is_some());
        assert!(store.retrieve_by_token(&principal.id, "wrong").is_none());
    }

    #[test]
    fn test_persistence_across_reopen() {
        let dir = TempDir::new().unwrap();
        let id;
        {
            let store = open_store(&dir);
            id = store.create_user("admin", "secret-password").unwrap().id;
        }

        let store = open_store(&dir);
        let loaded = store.get(&id).unwrap().unwrap();
        assert_eq!(loaded.name.as_deref(), Some("admin"));
    }

    #[test]
    fn test_list_skips_index_entries() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        store.create_user("a", "password123").unwrap();
        store.create_user("b", "password123").unwrap();

        let principals = store.list().unwrap();
        assert_eq!(principals.len(), 2);
    }

    #[test]
    fn test_update_last_login() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        let principal = store.create_user("kim", "password123").unwrap();
        assert!(principal.last_login.is_none());

        store.update_last_login(&principal.id).unwrap();
        let loaded = store.get(&principal.id).unwrap().unwrap();
        assert!(loaded.last_login.is_some());
    }
}
