//! Session-backed guard.

use std::sync::Arc;

use rand::RngCore;

use lockzone_core::session::SessionStore;
use lockzone_core::{Credentials, Id, Principal};

use crate::guard::Guard;
use crate::store::UserStore;

/// Guard that keeps the authenticated principal's id in a server-side
/// session.
///
/// `login` regenerates the session id (session-fixation mitigation) and
/// `user` lazily restores from the stored id, falling back to the
/// persistent remember-token when the session itself has been lost.
pub struct SessionGuard<S: SessionStore> {
    name: String,
    session: S,
    store: Arc<dyn UserStore>,
    user: Option<Principal>,
}

impl<S: SessionStore> SessionGuard<S> {
    /// Create a guard over a session and user store.
    pub fn new(name: impl Into<String>, session: S, store: Arc<dyn UserStore>) -> Self {
        Self {
            name: name.into(),
            session,
            store,
            user: None,
        }
    }

    /// Session key holding the authenticated id.
    fn login_key(&self) -> String {
        format!("login:{}", self.name)
    }

    /// Session key holding the remember-token reference.
    fn remember_key(&self) -> String {
        format!("remember:{}", self.name)
    }

    /// Like [`Guard::attempt`], but also mints and stores a persistent
    /// remember-token so the login survives session loss.
    pub fn attempt_and_remember(&mut self, credentials: &Credentials) -> Option<Principal> {
        let principal = self.attempt(credentials)?;

        let token = new_remember_token();
        self.store.update_remember_token(&principal, &token);
        self.session.set(
            &self.remember_key(),
            format!("{}|{token}", encode_id(&principal.id)),
        );

        Some(principal)
    }

    /// Restore from the remember-token reference, if one is present.
    fn restore_from_remember(&mut self) -> Option<Principal> {
        let stored = self.session.get(&self.remember_key())?;
        let (id_part, token) = stored.split_once('|')?;
        let id = decode_id(id_part)?;

        let principal = self
            .store
            .retrieve_by_token(&id, token)
            .filter(|p| p.active)?;

        // Promote back to a first-class session login.
        self.session
            .set(&self.login_key(), encode_id(&principal.id));
        Some(principal)
    }

    /// Borrow the backing session.
    pub fn session(&self) -> &S {
        &self.session
    }
}

impl<S: SessionStore> Guard for SessionGuard<S> {
    fn name(&self) -> &str {
        &self.name
    }

    fn attempt(&mut self, credentials: &Credentials) -> Option<Principal> {
        let principal = self.store.retrieve_by_credentials(credentials)?;
        if !principal.active || !self.store.validate_credentials(&principal, credentials) {
            return None;
        }

        tracing::info!(guard = %self.name, id = %principal.id, "Session login");
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
        self.session.set(&self.login_key(), encode_id(&principal.id));
        self.session.regenerate();
        self.user = Some(principal);
    }

    fn logout(&mut self) {
        if let Some(principal) = self.user.take() {
            // Rotate the persistent token so stolen remember cookies die
            // with the session.
            self.store
                .update_remember_token(&principal, &new_remember_token());
            tracing::info!(guard = %self.name, id = %principal.id, "Session logout");
        }
        let login_key = self.login_key();
        let remember_key = self.remember_key();
        self.session.remove(&login_key);
        self.session.remove(&remember_key);
    }

    fn user(&mut self) -> Option<&Principal> {
        if self.user.is_none() {
            let restored = self
                .session
                .get(&self.login_key())
                .and_then(|raw| decode_id(&raw))
                .and_then(|id| self.store.retrieve_by_id(&id))
                .filter(|p| p.active)
                .or_else(|| self.restore_from_remember());
            self.user = restored;
        }
        self.user.as_ref()
    }
}

/// Serialize an id for session storage, preserving its type.
fn encode_id(id: &Id) -> String {
    match id {
        Id::Int(n) => format!("i:{n}"),
        Id::Str(s) => format!("s:{s}"),
    }
}

fn decode_id(raw: &str) -> Option<Id> {
    match raw.split_once(':')? {
        ("i", n) => n.parse().ok().map(Id::Int),
        ("s", s) => Some(Id::Str(s.to_string())),
        _ => None,
    }
}

/// Mint a fresh 160-bit remember token.
fn new_remember_token() -> String {
    let mut bytes = [0u8; 20];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}
