//! # Lockzone Core
//!
//! Shared types and contracts for the Lockzone authentication toolkit.
//!
//! This crate provides:
//! - Principal and credential types with role/permission matching
//! - Identifier extraction from heterogeneous user values
//! - Authentication configuration loading and validation
//! - The password-hashing contract and its Argon2id implementation
//! - The session-store contract consumed by session-backed guards

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod password;
pub mod principal;
pub mod session;

pub use config::{AuthConfig, AuthConfigBuilder, ConfigError};
pub use password::{Argon2Hasher, PasswordError, PasswordHasher};
pub use principal::{Credentials, Id, Identifiable, Principal, UserValue};
pub use session::{MemorySessionStore, SessionStore};

/// Re-export commonly used types.
pub mod prelude {
    pub use crate::config::AuthConfig;
    pub use crate::password::{Argon2Hasher, PasswordHasher};
    pub use crate::principal::{Credentials, Id, Identifiable, Principal};
    pub use crate::session::SessionStore;
}
