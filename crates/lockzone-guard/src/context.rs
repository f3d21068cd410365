//! Per-request authentication context.
//!
//! One context lives for the duration of a request and maps guard names
//! to their authenticated principals. It is plain request-scoped state,
//! never a process-wide singleton, so concurrent requests cannot share
//! a "current user".

use std::collections::HashMap;

use lockzone_core::{Id, Principal};

/// Default guard name when none is configured.
const DEFAULT_GUARD: &str = "web";

/// Registry of authenticated principals, one slot per guard name.
///
/// All role/permission queries answer `false` uniformly when no
/// principal is bound for the resolved guard.
#[derive(Debug, Clone)]
pub struct AuthContext {
    users: HashMap<String, Principal>,
    default_guard: String,
    current: Option<String>,
}

impl AuthContext {
    /// Create a context with the given default guard.
    pub fn new(default_guard: impl Into<String>) -> Self {
        Self {
            users: HashMap::new(),
            default_guard: default_guard.into(),
            current: None,
        }
    }

    /// Resolve a guard argument against the current and default guards.
    fn resolve<'a>(&'a self, guard: Option<&'a str>) -> &'a str {
        guard
            .or(self.current.as_deref())
            .unwrap_or(&self.default_guard)
    }

    /// The configured default guard.
    #[must_use]
    pub fn default_guard(&self) -> &str {
        &self.default_guard
    }

    /// Point subsequent unqualified calls at another guard.
    pub fn shift_guard(&mut self, guard: impl Into<String>) {
        self.current = Some(guard.into());
    }

    /// The guard unqualified calls currently resolve to.
    #[must_use]
    pub fn current_guard(&self) -> &str {
        self.resolve(None)
    }

    /// Bind a principal to a guard (the resolved one if `None`).
    pub fn set_user(&mut self, principal: Principal, guard: Option<&str>) {
        let guard = self.resolve(guard).to_string();
        self.users.insert(guard, principal);
    }

    /// The principal bound to a guard, if any.
    #[must_use]
    pub fn user(&self, guard: Option<&str>) -> Option<&Principal> {
        self.users.get(self.resolve(guard))
    }

    /// The bound principal's identifier.
    #[must_use]
    pub fn id(&self, guard: Option<&str>) -> Option<Id> {
        self.user(guard).map(|principal| principal.id.clone())
    }

    /// Whether a principal is bound to the guard.
    #[must_use]
    pub fn check(&self, guard: Option<&str>) -> bool {
        self.user(guard).is_some()
    }

    /// Whether no principal is bound to the guard.
    #[must_use]
    pub fn guest(&self, guard: Option<&str>) -> bool {
        !self.check(guard)
    }

    /// Unbind one guard, or every guard when `None`.
    pub fn clear(&mut self, guard: Option<&str>) {
        match guard {
            Some(name) => {
                self.users.remove(name);
            }
            None => self.users.clear(),
        }
    }

    /// Role query against the bound principal.
    #[must_use]
    pub fn has_role(&self, role: &str, guard: Option<&str>) -> bool {
        self.user(guard).is_some_and(|p| p.has_role(role))
    }

    /// Any-of role query against the bound principal.
    #[must_use]
    pub fn has_any_role<S: AsRef<str>>(&self, roles: &[S], guard: Option<&str>) -> bool {
        self.user(guard).is_some_and(|p| p.has_any_role(roles))
    }

    /// Permission query against the bound principal.
    #[must_use]
    pub fn has_permission(&self, permission: &str, guard: Option<&str>) -> bool {
        self.user(guard).is_some_and(|p| p.has_permission(permission))
    }

    /// Any-of permission query against the bound principal.
    #[must_use]
    pub fn has_any_permission<S: AsRef<str>>(&self, permissions: &[S], guard: Option<&str>) -> bool {
        self.user(guard)
            .is_some_and(|p| p.has_any_permission(permissions))
    }

    /// A view pre-bound to one guard name, for chained queries.
    #[must_use]
    pub fn guard<'a>(&'a self, name: &'a str) -> GuardView<'a> {
        GuardView {
            context: self,
            name,
        }
    }
}

impl Default for AuthContext {
    fn default() -> Self {
        Self::new(DEFAULT_GUARD)
    }
}

/// Context view pre-bound to one guard name.
#[derive(Debug, Clone, Copy)]
pub struct GuardView<'a> {
    context: &'a AuthContext,
    name: &'a str,
}

impl GuardView<'_> {
    /// The bound principal, if any.
    #[must_use]
    pub fn user(&self) -> Option<&Principal> {
        self.context.user(Some(self.name))
    }

    /// The bound principal's identifier.
    #[must_use]
    pub fn id(&self) -> Option<Id> {
        self.context.id(Some(self.name))
    }

    /// Whether a principal is bound.
    #[must_use]
    pub fn check(&self) -> bool {
        self.context.check(Some(self.name))
    }

    /// Whether no principal is bound.
    #[must_use]
    pub fn guest(&self) -> bool {
        self.context.guest(Some(self.name))
    }

    /// Role query.
    #[must_use]
    pub fn has_role(&self, role: &str) -> bool {
        self.context.has_role(role, Some(self.name))
    }

    /// Any-of role query.
    #[must_use]
    pub fn has_any_role<S: AsRef<str>>(&self, roles: &[S]) -> bool {
        self.context.has_any_role(roles, Some(self.name))
    }

    /// Permission query.
    #[must_use]
    pub fn has_permission(&self, permission: &str) -> bool {
        self.context.has_permission(permission, Some(self.name))
    }

    /// Any-of permission query.
    #[must_use]
    pub fn has_any_permission<S: AsRef<str>>(&self, permissions: &[S]) -> bool {
        self.context.has_any_permission(permissions, Some(self.name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn admin() -> Principal {
        Principal::new("admin-1")
            .with_role("admin")
            .with_permission("*")
    }

    fn editor() -> Principal {
        Principal::new("editor-1")
            .with_role("editor")
            .with_permission("posts.*")
    }

    #[test]
    fn test_default_guard_binding() {
        let mut context = AuthContext::default();
        assert!(context.guest(None));

        context.set_user(admin(), None);
        assert!(context.check(None));
        assert_eq!(context.id(None), Some(Id::Str("admin-1".into())));
        assert!(context.check(Some("web")));
        assert!(context.guest(Some("api")));
    }

    #[test]
    fn test_guard_isolation() {
        let mut context = AuthContext::default();
        context.set_user(admin(), Some("web"));
        context.set_user(editor(), Some("api"));

        assert_eq!(context.id(Some("web")), Some(Id::Str("admin-1".into())));
        assert_eq!(context.id(Some("api")), Some(Id::Str("editor-1".into())));

        // Clearing one guard leaves the other untouched.
        context.clear(Some("web"));
        assert!(context.guest(Some("web")));
        assert!(context.check(Some("api")));
    }

    #[test]
    fn test_clear_all() {
        let mut context = AuthContext::default();
        context.set_user(admin(), Some("web"));
        context.set_user(editor(), Some("api"));

        context.clear(None);
        assert!(context.guest(Some("web")));
        assert!(context.guest(Some("api")));
    }

    #[test]
    fn test_shift_guard() {
        let mut context = AuthContext::default();
        context.set_user(editor(), Some("api"));

        assert!(context.guest(None));
        context.shift_guard("api");
        assert_eq!(context.current_guard(), "api");
        assert!(context.check(None));
        assert!(context.has_role("editor", None));
    }

    #[test]
    fn test_queries_false_without_principal() {
        let context = AuthContext::default();

        assert!(!context.has_role("admin", None));
        assert!(!context.has_any_role(&["admin", "editor"], None));
        assert!(!context.has_permission("posts.delete", None));
        assert!(!context.has_any_permission(&["posts.delete"], None));
        assert_eq!(context.id(None), None);
    }

    #[test]
    fn test_permission_pass_through() {
        let mut context = AuthContext::default();
        context.set_user(admin(), Some("web"));
        context.set_user(editor(), Some("api"));

        // Global wildcard on web.
        assert!(context.has_permission("users.delete", Some("web")));
        // Category wildcard on api.
        assert!(context.has_permission("posts.delete", Some("api")));
        assert!(!context.has_permission("users.delete", Some("api")));
    }

    #[test]
    fn test_guard_view() {
        let mut context = AuthContext::default();
        context.set_user(editor(), Some("api"));

        let view = context.guard("api");
        assert!(view.check());
        assert!(view.has_role("editor"));
        assert!(view.has_any_role(&["admin", "editor"]));
        assert!(view.has_permission("posts.edit"));
        assert!(!view.has_permission("users.edit"));
        assert_eq!(view.id(), Some(Id::Str("editor-1".into())));

        let empty = context.guard("web");
        assert!(empty.guest());
        assert!(!empty.has_role("editor"));
    }
}
