//! End-to-end authentication flows across guards, stores, and tokens.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Map;
use tempfile::TempDir;

use lockzone_core::session::{MemorySessionStore, SessionStore};
use lockzone_core::{Credentials, Id, Principal};
use lockzone_guard::{
    AuthContext, Guard, KeyGuard, MemoryUserStore, SessionGuard, SledUserStore, TokenGuard,
    UserStore,
};
use lockzone_token::{RevocationList, TokenCodec, TokenType};

const SECRET: &str = "s3cret-key-32-bytes-minimum!!!!";

fn codec() -> Arc<TokenCodec> {
    Arc::new(
        TokenCodec::from_secret(
            SECRET,
            "app",
            Duration::from_secs(3600),
            Duration::from_secs(7 * 86400),
        )
        .unwrap(),
    )
}

#[test]
fn token_issue_revoke_flow() {
    let store = Arc::new(MemoryUserStore::new());
    store
        .insert(Principal::new("user-42").with_role("admin"))
        .unwrap();

    let revocations = Arc::new(RevocationList::new());
    let guard = TokenGuard::new(
        "api",
        codec(),
        Arc::clone(&revocations),
        Arc::clone(&store) as Arc<dyn UserStore>,
    );

    let principal = store
        .retrieve_by_id(&Id::Str("user-42".into()))
        .expect("principal should exist");
    let mut custom = Map::new();
    custom.insert("role".to_string(), "admin".into());
    let pair = guard
        .issue_token_pair_with_claims(&principal, custom)
        .unwrap();

    // Decoded claims carry the full registered set plus the custom claim.
    let claims = guard.codec().decode(&pair.access_token).unwrap();
    assert_eq!(claims.sub, "user-42");
    assert_eq!(claims.iss.as_deref(), Some("app"));
    assert_eq!(claims.token_type, TokenType::Access);
    assert_eq!(claims.get("role"), Some(&"admin".into()));
    let jti = claims.jti.clone().unwrap();

    // Authentication succeeds while the token is live.
    assert_eq!(
        guard.authenticate_token(&pair.access_token).unwrap().id,
        Id::Str("user-42".into())
    );

    // Revoke by jti: the list reports it, and authentication refuses the
    // token even though the signature still validates structurally.
    assert!(guard.revoke_token(&pair.access_token));
    assert!(revocations.has(&jti));
    assert!(guard.authenticate_token(&pair.access_token).is_none());
    assert!(guard.codec().validate(&pair.access_token));

    // Cleanup leaves the still-live entry alone.
    assert_eq!(revocations.cleanup(), 0);
    assert!(revocations.has(&jti));
}

#[test]
fn guards_stay_isolated_in_one_context() {
    let mut context = AuthContext::new("web");

    context.set_user(
        Principal::new("web-user").with_permission("posts.*"),
        Some("web"),
    );
    context.set_user(
        Principal::new("api-client").with_permission("*"),
        Some("api"),
    );

    assert_eq!(context.id(Some("web")), Some(Id::Str("web-user".into())));
    assert_eq!(context.id(Some("api")), Some(Id::Str("api-client".into())));
    assert!(context.has_permission("posts.delete", Some("web")));
    assert!(!context.has_permission("users.delete", Some("web")));
    assert!(context.has_permission("users.delete", Some("api")));

    context.clear(Some("api"));
    assert!(context.guest(Some("api")));
    assert!(context.check(Some("web")));
}

#[test]
fn session_guard_full_cycle_over_sled() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(SledUserStore::open(dir.path()).unwrap());
    store.create_user("kim", "password123").unwrap();

    let credentials = Credentials::new()
        .with("username", "kim")
        .with("password", "password123");

    // Login writes the id into the session and regenerates its id.
    let mut guard = SessionGuard::new(
        "web",
        MemorySessionStore::new(),
        Arc::clone(&store) as Arc<dyn UserStore>,
    );
    let before = guard.session().id().to_string();
    let principal = guard.attempt(&credentials).unwrap();
    assert_ne!(guard.session().id(), before);

    // A later request with the same session restores the same principal.
    let session = carry_session(guard);
    let mut next = SessionGuard::new("web", session, Arc::clone(&store) as Arc<dyn UserStore>);
    assert_eq!(next.id(), Some(principal.id.clone()));

    // Logout drops both the cache and the session entry.
    next.logout();
    assert!(next.guest());
    let session = carry_session(next);
    let mut after = SessionGuard::new("web", session, store);
    assert!(after.user().is_none());
}

/// Pull the session out of a finished "request".
fn carry_session(guard: SessionGuard<MemorySessionStore>) -> MemorySessionStore {
    let mut session = MemorySessionStore::new();
    for key in ["login:web", "remember:web"] {
        if let Some(value) = guard.session().get(key) {
            session.set(key, value);
        }
    }
    session
}

#[test]
fn key_guard_against_sled_store() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(SledUserStore::open(dir.path()).unwrap());
    let principal = store.create_user("service", "password123").unwrap();

    let generated = KeyGuard::generate_key();
    assert!(KeyGuard::is_valid_format(&generated.key));
    store
        .set_api_key_hash(&principal.id, &generated.hash)
        .unwrap();

    let mut guard = KeyGuard::new("machine", store);
    let credentials = Credentials::new().with("api_key", generated.key.clone());

    let found = guard.attempt(&credentials).unwrap();
    assert_eq!(found.id, principal.id);
    assert!(guard.check());
}

#[test]
fn refresh_rotation_is_single_use() {
    let store = Arc::new(MemoryUserStore::new());
    let principal = store.create_user("kim", "password123").unwrap();

    let guard = TokenGuard::new(
        "api",
        codec(),
        Arc::new(RevocationList::new()),
        store,
    );

    let first = guard.issue_token_pair(&principal).unwrap();
    let second = guard.refresh_token_pair(&first.refresh_token).unwrap();
    let third = guard.refresh_token_pair(&second.refresh_token).unwrap();

    // Every used refresh token is burned; every fresh one works.
    assert!(guard.refresh_token_pair(&first.refresh_token).is_none());
    assert!(guard.refresh_token_pair(&second.refresh_token).is_none());
    assert!(guard.authenticate_token(&third.access_token).is_some());
}
