//! Core library for custportal.
//!
//! Everything except the front end lives here:
//!
//! - `api`: REST client for the customer service, with bearer-token attachment
//! - `auth`: token storage, token decoding and the session manager
//! - `routes`: route table and the guard in front of protected views
//! - `models`: wire types for customers and credentials, plus form validation
//! - `config`: configuration file and environment overrides

pub mod api;
pub mod auth;
pub mod config;
pub mod models;
pub mod routes;
pub mod utils;

pub use api::{Access, ApiClient, ApiError};
pub use auth::{AuthError, Session, SessionManager, TokenError, TokenStore};
pub use config::{Config, TokenStoreKind};
pub use routes::{GuardOutcome, Route, RouteGuard};
