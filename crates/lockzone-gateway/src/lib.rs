//! # Lockzone Gateway
//!
//! Axum glue for Lockzone: shared [`AuthState`], bearer/query token
//! extraction, the [`RequireAuth`]/[`OptionalAuth`] extractors, and
//! role/permission policy gates.
//!
//! Authentication failures map to HTTP 401, authorization failures to
//! 403; the core never produces those codes itself.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod extract;
mod state;

pub use extract::{
    AuthRejection, OptionalAuth, RequireAdmin, RequireAuth, extract_bearer, token_from_parts,
};
pub use state::{AuthState, GatewayError};
