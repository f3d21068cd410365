//! Principals, credentials, and identifier extraction.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Credential keys that carry secret material.
///
/// These are stripped by [`Credentials::without_secrets`] before a store
/// lookup so that secrets never participate in record matching.
const SECRET_KEYS: &[&str] = &["password", "api_key"];

/// Opaque principal identifier.
///
/// Stores may key principals by integer or by string; both survive a
/// round trip through token claims, where the subject is always a string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Id {
    /// Integer identifier.
    Int(i64),
    /// String identifier.
    Str(String),
}

impl Id {
    /// Parse an identifier from a token subject.
    ///
    /// Subjects are always transported as strings; an all-digit subject is
    /// assumed to name an integer-keyed principal. Stores that genuinely
    /// use numeric-looking string keys should key by [`Id::Str`] values
    /// that don't parse as `i64`.
    #[must_use]
    pub fn from_subject(subject: &str) -> Self {
        subject
            .parse::<i64>()
            .map_or_else(|_| Self::Str(subject.to_string()), Self::Int)
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(n) => write!(f, "{n}"),
            Self::Str(s) => write!(f, "{s}"),
        }
    }
}

impl From<i64> for Id {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<&str> for Id {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<String> for Id {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

/// An authenticated entity.
///
/// Principals are created and loaded by user stores; guards only ever
/// borrow or cache them. One principal per lookup, one cached principal
/// per guard name per request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Principal {
    /// Unique identifier.
    pub id: Id,
    /// Login name.
    pub name: Option<String>,
    /// Email address.
    pub email: Option<String>,
    /// Password hash (PHC string). Never the plaintext.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password_hash: Option<String>,
    /// Persistent remember-me token.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remember_token: Option<String>,
    /// Role names, in assignment order.
    #[serde(default)]
    pub roles: Vec<String>,
    /// Permission strings. `*` and `category.*` wildcards are honored.
    #[serde(default)]
    pub permissions: Vec<String>,
    /// Whether the account may authenticate.
    #[serde(default = "default_active")]
    pub active: bool,
    /// When the principal was created.
    pub created_at: DateTime<Utc>,
    /// When the principal last logged in.
    pub last_login: Option<DateTime<Utc>>,
}

fn default_active() -> bool {
    true
}

impl Principal {
    /// Create a new active principal with no roles or permissions.
    #[must_use]
    pub fn new(id: impl Into<Id>) -> Self {
        Self {
            id: id.into(),
            name: None,
            email: None,
            password_hash: None,
            remember_token: None,
            roles: Vec::new(),
            permissions: Vec::new(),
            active: true,
            created_at: Utc::now(),
            last_login: None,
        }
    }

    /// Set the login name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the email address.
    #[must_use]
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    /// Set the stored password hash.
    #[must_use]
    pub fn with_password_hash(mut self, hash: impl Into<String>) -> Self {
        self.password_hash = Some(hash.into());
        self
    }

    /// Add a role.
    #[must_use]
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.roles.push(role.into());
        self
    }

    /// Add a permission.
    #[must_use]
    pub fn with_permission(mut self, permission: impl Into<String>) -> Self {
        self.permissions.push(permission.into());
        self
    }

    /// Check whether the principal holds the exact role.
    #[must_use]
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    /// Check whether the principal holds any of the roles.
    #[must_use]
    pub fn has_any_role<S: AsRef<str>>(&self, roles: &[S]) -> bool {
        roles.iter().any(|r| self.has_role(r.as_ref()))
    }

    /// Check whether the principal holds the permission.
    ///
    /// A held `*` grants everything; a held `category.*` grants every
    /// permission beginning with `category.`.
    #[must_use]
    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions
            .iter()
            .any(|held| permission_matches(held, permission))
    }

    /// Check whether the principal holds any of the permissions.
    #[must_use]
    pub fn has_any_permission<S: AsRef<str>>(&self, permissions: &[S]) -> bool {
        permissions.iter().any(|p| self.has_permission(p.as_ref()))
    }
}

/// Match a held permission against a requested one.
fn permission_matches(held: &str, requested: &str) -> bool {
    if held == "*" {
        return true;
    }
    if let Some(prefix) = held.strip_suffix(".*") {
        return requested
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.starts_with('.'));
    }
    held == requested
}

/// A set of login credentials.
///
/// Modeled as an ordered string map so that stores can match on whatever
/// non-secret fields they index (username, email, phone) without the core
/// dictating a schema.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Credentials(BTreeMap<String, String>);

impl Credentials {
    /// Create an empty credential set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a credential field.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Look up a field.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// The plaintext password, if present.
    #[must_use]
    pub fn password(&self) -> Option<&str> {
        self.get("password")
    }

    /// The API key, if present.
    #[must_use]
    pub fn api_key(&self) -> Option<&str> {
        self.get("api_key")
    }

    /// Copy of the credentials with all secret material removed.
    #[must_use]
    pub fn without_secrets(&self) -> Self {
        Self(
            self.0
                .iter()
                .filter(|(k, _)| !SECRET_KEYS.contains(&k.as_str()))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        )
    }

    /// Iterate over non-secret fields.
    pub fn matchable_fields(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0
            .iter()
            .filter(|(k, _)| !SECRET_KEYS.contains(&k.as_str()))
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Whether no fields are present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Capability: the value exposes a principal identifier.
///
/// Implemented by [`Principal`] and by raw claim maps; guards use it to
/// extract an identifier from whatever "user" value they are handed
/// without reflection. A `None` means unauthenticated, never id `0` or
/// the empty string.
pub trait Identifiable {
    /// The identifier, if one is present.
    fn identifier(&self) -> Option<Id>;
}

impl Identifiable for Principal {
    fn identifier(&self) -> Option<Id> {
        Some(self.id.clone())
    }
}

/// Claim maps expose an identifier under `id`, then `sub`, then
/// `user_id`, in that priority order.
impl Identifiable for Map<String, Value> {
    fn identifier(&self) -> Option<Id> {
        ["id", "sub", "user_id"]
            .iter()
            .find_map(|key| self.get(*key))
            .and_then(id_from_value)
    }
}

fn id_from_value(value: &Value) -> Option<Id> {
    match value {
        Value::Number(n) => n.as_i64().map(Id::Int),
        Value::String(s) if !s.is_empty() => Some(Id::Str(s.clone())),
        _ => None,
    }
}

/// A heterogeneous "user" value as handed to guards.
///
/// Guards receive typed principals from stores but raw maps from decoded
/// token claims; this union covers both. An explicit [`Identifiable`]
/// accessor always wins over key probing.
#[derive(Debug, Clone)]
pub enum UserValue {
    /// A fully-typed principal.
    Principal(Principal),
    /// A raw claim or attribute map.
    Map(Map<String, Value>),
}

impl Identifiable for UserValue {
    fn identifier(&self) -> Option<Id> {
        match self {
            Self::Principal(p) => p.identifier(),
            Self::Map(m) => m.identifier(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_id_from_subject() {
        assert_eq!(Id::from_subject("42"), Id::Int(42));
        assert_eq!(Id::from_subject("user-42"), Id::Str("user-42".into()));
        assert_eq!(Id::from_subject("42a"), Id::Str("42a".into()));
    }

    #[test]
    fn test_id_display_round_trip() {
        assert_eq!(Id::Int(7).to_string(), "7");
        assert_eq!(Id::from_subject(&Id::Int(7).to_string()), Id::Int(7));
    }

    #[test]
    fn test_principal_roles() {
        let principal = Principal::new("user-1")
            .with_role("editor")
            .with_role("reviewer");

        assert!(principal.has_role("editor"));
        assert!(!principal.has_role("admin"));
        assert!(principal.has_any_role(&["admin", "reviewer"]));
        assert!(!principal.has_any_role(&["admin", "owner"]));
    }

    #[test]
    fn test_exact_permission() {
        let principal = Principal::new(1).with_permission("posts.delete");
        assert!(principal.has_permission("posts.delete"));
        assert!(!principal.has_permission("posts.create"));
    }

    #[test]
    fn test_global_wildcard_grants_everything() {
        let principal = Principal::new(1).with_permission("*");
        assert!(principal.has_permission("posts.delete"));
        assert!(principal.has_permission("anything.at.all"));
    }

    #[test]
    fn test_category_wildcard() {
        let principal = Principal::new(1).with_permission("posts.*");
        assert!(principal.has_permission("posts.delete"));
        assert!(principal.has_permission("posts.comments.edit"));
        assert!(!principal.has_permission("users.delete"));
        // The bare category is not itself granted.
        assert!(!principal.has_permission("posts"));
        // Prefix must end at a dot boundary.
        assert!(!principal.has_permission("postscript.run"));
    }

    #[test]
    fn test_credentials_without_secrets() {
        let credentials = Credentials::new()
            .with("email", "kim@example.com")
            .with("password", "hunter2")
            .with("api_key", "lz_abc");

        let public = credentials.without_secrets();
        assert_eq!(public.get("email"), Some("kim@example.com"));
        assert_eq!(public.password(), None);
        assert_eq!(public.api_key(), None);
        assert_eq!(credentials.password(), Some("hunter2"));
    }

    #[test]
    fn test_identifiable_map_priority() {
        let map = json!({"user_id": 3, "sub": "sub-2", "id": "id-1"});
        let Value::Object(map) = map else {
            unreachable!()
        };
        assert_eq!(map.identifier(), Some(Id::Str("id-1".into())));

        let map = json!({"user_id": 3, "sub": "sub-2"});
        let Value::Object(map) = map else {
            unreachable!()
        };
        assert_eq!(map.identifier(), Some(Id::Str("sub-2".into())));

        let map = json!({"user_id": 3});
        let Value::Object(map) = map else {
            unreachable!()
        };
        assert_eq!(map.identifier(), Some(Id::Int(3)));
    }

    #[test]
    fn test_identifiable_rejects_empty_and_null() {
        let map = json!({"id": "", "sub": null});
        let Value::Object(map) = map else {
            unreachable!()
        };
        assert_eq!(map.identifier(), None);
    }

    #[test]
    fn test_user_value_prefers_accessor() {
        let principal = Principal::new(Id::Int(9));
        let value = UserValue::Principal(principal);
        assert_eq!(value.identifier(), Some(Id::Int(9)));
    }
}
