//! Authentication module for managing the signed-in session.
//!
//! This module provides:
//! - `TokenStore`: persistence for the single bearer token (keychain, file, memory)
//! - `token`: decoding of the token payload into a `Session`
//! - `SessionManager`: sign-in, sign-out and the lazy liveness check
//!
//! Only the raw token is ever persisted. The `Session` is always rederived
//! from it.

pub mod session;
pub mod store;
pub mod token;

pub use session::{AuthError, SessionManager};
pub use store::{FileTokenStore, KeyringTokenStore, MemoryTokenStore, TokenStore};
pub use token::{Session, TokenError};
