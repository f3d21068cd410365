//! # Lockzone Guard
//!
//! Authentication orchestration for Lockzone:
//! - [`UserStore`]: the pluggable principal-storage contract, with
//!   in-memory and sled-backed implementations
//! - The three guard variants: [`SessionGuard`], [`TokenGuard`], and
//!   [`KeyGuard`], sharing one [`Guard`] contract
//! - [`AuthContext`]: the per-request guard-name → principal registry
//! - API-key generation and constant-time verification
//!
//! Guards translate every credential, token, and storage failure into
//! `None`/`false`; nothing on the authentication path throws.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod api_key;
pub mod context;
pub mod guard;
pub mod key;
pub mod session;
pub mod store;
pub mod token;

pub use api_key::GeneratedKey;
pub use context::{AuthContext, GuardView};
pub use guard::Guard;
pub use key::KeyGuard;
pub use session::SessionGuard;
pub use store::{MemoryUserStore, SledUserStore, StoreError, UserStore};
pub use token::{TokenGuard, TokenPair};
