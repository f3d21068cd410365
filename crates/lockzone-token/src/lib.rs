//! # Lockzone Token
//!
//! The signed-token core of Lockzone:
//! - [`Signer`]: HMAC (HS256/HS384/HS512) and RSA (RS256) signatures over
//!   opaque bytes, with PEM key handling and key-pair generation
//! - [`TokenCodec`]: the three-segment compact token format with claim
//!   semantics (subject, expiry, issuer, token type, unique id)
//! - [`RevocationList`]: early invalidation of otherwise-valid tokens,
//!   keyed by token id
//!
//! Authentication failures (bad signature, expired, malformed) surface as
//! `None`/`false`; only construction-time misconfiguration and signing
//! with a verify-only key are errors.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod codec;
pub mod revocation;
pub mod signer;

pub use codec::{Claims, TokenCodec, TokenError, TokenType};
pub use revocation::RevocationList;
pub use signer::{Algorithm, RsaKeyPair, Signer, SignerError};
