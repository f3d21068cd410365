//! Session storage contract.
//!
//! The session backend is an external collaborator; guards only need the
//! small surface below. The in-memory implementation backs tests and
//! single-process embeddings.

use std::collections::HashMap;

use rand::RngCore;

/// Key/value session storage as seen by guards.
///
/// `regenerate` must rotate the session identifier while keeping the
/// stored data (session-fixation mitigation on login); `destroy` drops
/// both the data and the identifier.
pub trait SessionStore: Send {
    /// The current session identifier.
    fn id(&self) -> &str;

    /// Look up a value.
    fn get(&self, key: &str) -> Option<String>;

    /// Store a value.
    fn set(&mut self, key: &str, value: String);

    /// Remove a value, returning it if present.
    fn remove(&mut self, key: &str) -> Option<String>;

    /// Rotate the session identifier, keeping stored data.
    fn regenerate(&mut self);

    /// Drop all data and rotate the identifier.
    fn destroy(&mut self);
}

/// In-memory session store.
#[derive(Debug)]
pub struct MemorySessionStore {
    id: String,
    data: HashMap<String, String>,
}

impl MemorySessionStore {
    /// Create a fresh session with a random identifier.
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: new_session_id(),
            data: HashMap::new(),
        }
    }

    /// Number of stored entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the session holds no data.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl Default for MemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore for MemorySessionStore {
    fn id(&self) -> &str {
        &self.id
    }

    fn get(&self, key: &str) -> Option<String> {
        self.data.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: String) {
        self.data.insert(key.to_string(), value);
    }

    fn remove(&mut self, key: &str) -> Option<String> {
        self.data.remove(key)
    }

    fn regenerate(&mut self) {
        self.id = new_session_id();
    }

    fn destroy(&mut self) {
        self.data.clear();
        self.id = new_session_id();
    }
}

/// Generate a random 128-bit session identifier.
fn new_session_id() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}
