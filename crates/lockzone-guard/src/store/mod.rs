//! Principal storage.
//!
//! The [`UserStore`] trait abstracts wherever principal records actually
//! live. Retrieval failures (unknown user, wrong credentials, storage
//! trouble) all surface as `None`/`false` on the authentication path;
//! the concrete stores expose their own `Result`-returning CRUD surface
//! for management code.

mod sled_store;

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use rand::RngCore;
use subtle::ConstantTimeEq;
use thiserror::Error;

use lockzone_core::password::{self, Argon2Hasher, PasswordError, PasswordHasher};
use lockzone_core::{Credentials, Id, Principal};

pub use sled_store::SledUserStore;

use crate::api_key;

/// Storage errors.
///
/// These surface from the management surface (create/update/delete), not
/// from the authentication path.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Backend failure.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Record (de)serialization failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A principal with this name already exists.
    #[error("User already exists: {0}")]
    UserExists(String),

    /// No principal under this identifier.
    #[error("User not found: {0}")]
    UserNotFound(String),

    /// New password below the strength floor.
    #[error("Password does not meet the minimum length of {min}", min = password::MIN_PASSWORD_LENGTH)]
    WeakPassword,

    /// Password hashing failed.
    #[error(transparent)]
    Password(#[from] PasswordError),
}

/// Retrieval of principals by id, credentials, remember-token, or API
/// key.
///
/// The first three methods are required; the capability extensions
/// default to "unsupported" so stores only opt into what they index.
pub trait UserStore: Send + Sync {
    /// Load a principal by identifier.
    fn retrieve_by_id(&self, id: &Id) -> Option<Principal>;

    /// Load a principal by its non-secret credential fields.
    ///
    /// Secret material in `credentials` is ignored; matching happens on
    /// fields like `username` or `email` only.
    fn retrieve_by_credentials(&self, credentials: &Credentials) -> Option<Principal>;

    /// Check a credential set against a loaded principal.
    ///
    /// Must hash-compare through the configured password strategy and
    /// return `false`, never an error, on missing or empty input.
    fn validate_credentials(&self, principal: &Principal, credentials: &Credentials) -> bool;

    /// Load a principal by id and persistent remember-token.
    fn retrieve_by_token(&self, id: &Id, remember_token: &str) -> Option<Principal> {
        let _ = (id, remember_token);
        None
    }

    /// Rotate a principal's persistent remember-token.
    fn update_remember_token(&self, principal: &Principal, token: &str) {
        let _ = (principal, token);
    }

    /// Load a principal by raw API key.
    fn retrieve_by_api_key(&self, api_key: &str) -> Option<Principal> {
        let _ = api_key;
        None
    }
}

/// Shared password check used by the concrete stores.
fn check_password(
    hasher: &dyn PasswordHasher,
    principal: &Principal,
    credentials: &Credentials,
) -> bool {
    let Some(plaintext) = credentials.password().filter(|p| !p.is_empty()) else {
        return false;
    };
    let Some(hash) = principal.password_hash.as_deref() else {
        return false;
    };
    hasher.verify(plaintext, hash)
}

/// Constant-time equality for remember tokens.
fn remember_token_matches(principal: &Principal, token: &str) -> bool {
    principal
        .remember_token
        .as_deref()
        .filter(|stored| !stored.is_empty())
        .is_some_and(|stored| {
            stored.len() == token.len() && bool::from(stored.as_bytes().ct_eq(token.as_bytes()))
        })
}

/// Mint a fresh principal identifier.
fn new_user_id() -> Id {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    Id::Str(format!("user_{}", hex::encode(bytes)))
}

#[derive(Default)]
struct MemoryInner {
    users: HashMap<Id, Principal>,
    by_name: HashMap<String, Id>,
    by_email: HashMap<String, Id>,
    by_api_key_hash: HashMap<String, Id>,
    key_hash_by_id: HashMap<Id, String>,
}

/// In-memory user store.
///
/// Backs tests and single-process embeddings; indexes principals by
/// name, email, and API-key hash.
pub struct MemoryUserStore {
    inner: RwLock<MemoryInner>,
    hasher: Arc<dyn PasswordHasher>,
}

impl MemoryUserStore {
    /// Create an empty store with the Argon2id hasher.
    #[must_use]
    pub fn new() -> Self {
        Self::with_hasher(Arc::new(Argon2Hasher::new()))
    }

    /// Create an empty store with a custom hashing strategy.
    #[must_use]
    pub fn with_hasher(hasher: Arc<dyn PasswordHasher>) -> Self {
        Self {
            inner: RwLock::new(MemoryInner::default()),
            hasher,
        }
    }

    /// Create and insert a principal with a hashed password.
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

        self.insert(principal.clone())?;
        Ok(principal)
    }

    /// Insert a prebuilt principal.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::UserExists`] if the id or name is taken.
    pub fn insert(&self, principal: Principal) -> Result<(), StoreError> {
        let mut inner = self.write();

        if inner.users.contains_key(&principal.id) {
            return Err(StoreError::UserExists(principal.id.to_string()));
        }
        if let Some(name) = &principal.name {
            if inner.by_name.contains_key(name) {
                return Err(StoreError::UserExists(name.clone()));
            }
        }

        index_principal(&mut inner, &principal);
        inner.users.insert(principal.id.clone(), principal);
        Ok(())
    }

    /// Replace a stored principal, reindexing name and email.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::UserNotFound`] if the id is unknown.
    pub fn update(&self, principal: &Principal) -> Result<(), StoreError> {
        let mut inner = self.write();

        let Some(old) = inner.users.get(&principal.id).cloned() else {
            return Err(StoreError::UserNotFound(principal.id.to_string()));
        };

        deindex_principal(&mut inner, &old);
        index_principal(&mut inner, principal);
        inner.users.insert(principal.id.clone(), principal.clone());
        Ok(())
    }

    /// Remove a principal. Returns whether one existed.
    pub fn remove(&self, id: &Id) -> bool {
        let mut inner = self.write();
        let Some(old) = inner.users.remove(id) else {
            return false;
        };
        deindex_principal(&mut inner, &old);
        if let Some(hash) = inner.key_hash_by_id.remove(id) {
            inner.by_api_key_hash.remove(&hash);
        }
        true
    }

    /// Associate an API-key hash with a principal.
    ///
    /// Replaces any previously assigned key.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::UserNotFound`] if the id is unknown.
    pub fn set_api_key_hash(&self, id: &Id, hash: &str) -> Result<(), StoreError> {
        let mut inner = self.write();

        if !inner.users.contains_key(id) {
            return Err(StoreError::UserNotFound(id.to_string()));
        }

        if let Some(old) = inner.key_hash_by_id.remove(id) {
            inner.by_api_key_hash.remove(&old);
        }
        inner.by_api_key_hash.insert(hash.to_string(), id.clone());
        inner.key_hash_by_id.insert(id.clone(), hash.to_string());
        Ok(())
    }

    /// Number of stored principals.
    #[must_use]
    pub fn len(&self) -> usize {
        self.read().users.len()
    }

    /// Whether the store holds no principals.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.read().users.is_empty()
    }

    fn read(&self) -> RwLockReadGuard<'_, MemoryInner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, MemoryInner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for MemoryUserStore {
    fn default() -> Self {
        Self::new()
    }
}

fn index_principal(inner: &mut MemoryInner, principal: &Principal) {
    if let Some(name) = &principal.name {
        inner.by_name.insert(name.clone(), principal.id.clone());
    }
    if let Some(email) = &principal.email {
        inner.by_email.insert(email.clone(), principal.id.clone());
    }
}

fn deindex_principal(inner: &mut MemoryInner, principal: &Principal) {
    if let Some(name) = &principal.name {
        inner.by_name.remove(name);
    }
    if let Some(email) = &principal.email {
        inner.by_email.remove(email);
    }
}

impl UserStore for MemoryUserStore {
    fn retrieve_by_id(&self, id: &Id) -> Option<Principal> {
        self.read().users.get(id).cloned()
    }

    fn retrieve_by_credentials(&self, credentials: &Credentials) -> Option<Principal> {
        let inner = self.read();

        let id = credentials
            .get("username")
            .or_else(|| credentials.get("name"))
            .and_then(|name| inner.by_name.get(name))
            .or_else(|| {
                credentials
                    .get("email")
                    .and_then(|email| inner.by_email.get(email))
            })?;

        inner.users.get(id).cloned()
    }

    fn validate_credentials(&self, principal: &Principal, credentials: &Credentials) -> bool {
        check_password(self.hasher.as_ref(), principal, credentials)
    }

    fn retrieve_by_token(&self, id: &Id, remember_token: &str) -> Option<Principal> {
        self.retrieve_by_id(id)
            .filter(|p| remember_token_matches(p, remember_token))
    }

    fn update_remember_token(&self, principal: &Principal, token: &str) {
        let mut inner = self.write();
        if let Some(stored) = inner.users.get_mut(&principal.id) {
            stored.remember_token = Some(token.to_string());
        }
    }

    fn retrieve_by_api_key(&self, key: &str) -> Option<Principal> {
        let hash = api_key::hash_key(key);
        let inner = self.read();
        let id = inner.by_api_key_hash.get(&hash)?;
        inner.users.get(id).cloned()
    }
}
