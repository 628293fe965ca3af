//! REST client module for the customer service.
//!
//! This module provides the `ApiClient` for the authentication and customer
//! endpoints. Requests are built with an `Access` flag; authenticated ones
//! carry the stored token as a bearer credential.

pub mod client;
pub mod error;

pub use client::{Access, ApiClient};
pub use error::ApiError;
