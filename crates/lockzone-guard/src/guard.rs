//! The shared guard contract.

use lockzone_core::{Credentials, Id, Principal};

/// One authentication mechanism plus its request-scoped state.
///
/// A guard holds at most one authenticated principal for the lifetime of
/// a request. Credential failures are `None`/`false`; guards never error
/// on the authentication path. `user` takes `&mut self` because the
/// session-backed variant restores lazily from its backing store.
pub trait Guard {
    /// The guard's name, as registered in the auth context.
    fn name(&self) -> &str;

    /// Verify credentials and, on success, log the principal in.
    fn attempt(&mut self, credentials: &Credentials) -> Option<Principal>;

    /// Verify credentials without mutating guard state.
    fn validate(&self, credentials: &Credentials) -> bool;

    /// Make the principal the guard's current user.
    fn login(&mut self, principal: Principal);

    /// Clear the current user and any backing state.
    fn logout(&mut self);

    /// The current user, restoring from the backing store if needed.
    fn user(&mut self) -> Option<&Principal>;

    /// The current user's identifier.
    fn id(&mut self) -> Option<Id> {
        self.user().map(|principal| principal.id.clone())
    }

    /// Whether a user is authenticated.
    fn check(&mut self) -> bool {
        self.user().is_some()
    }

    /// Whether no user is authenticated.
    fn guest(&mut self) -> bool {
        !self.check()
    }
}
