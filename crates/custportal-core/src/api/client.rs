//! API client for the customer service REST API.
//!
//! Every request is built through [`ApiClient::request`] with an [`Access`]
//! flag. Authenticated requests read the token from the [`TokenStore`] at
//! send time; anonymous ones never carry an `Authorization` header.

use std::sync::Arc;
use std::time::Duration;

use reqwest::{header, multipart, Client, Method, RequestBuilder, Response};
use serde::Serialize;
use tracing::{debug, warn};

use crate::auth::TokenStore;
use crate::models::{
    CustomerDto, CustomerRegistrationRequest, CustomerUpdateRequest, UsernamePassword,
};

use super::ApiError;

// ============================================================================
// Constants
// ============================================================================

/// Default HTTP request timeout in seconds
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

const LOGIN_PATH: &str = "/api/v1/auth/login";
const CUSTOMERS_PATH: &str = "/api/v1/customers";

/// Scheme the server may put in front of the token in its response header
const BEARER_PREFIX: &str = "Bearer ";

/// Whether a request needs the stored bearer token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Anonymous,
    Authenticated,
}

/// API client for the customer service.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    store: Arc<dyn TokenStore>,
}

impl ApiClient {
    /// Create a new API client with the default timeout
    pub fn new(base_url: impl Into<String>, store: Arc<dyn TokenStore>) -> Result<Self, ApiError> {
        Self::with_timeout(
            base_url,
            store,
            Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        )
    }

    pub fn with_timeout(
        base_url: impl Into<String>,
        store: Arc<dyn TokenStore>,
        timeout: Duration,
    ) -> Result<Self, ApiError> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            store,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// The token store this client reads bearer tokens from
    pub fn token_store(&self) -> &Arc<dyn TokenStore> {
        &self.store
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn stored_token(&self) -> Option<String> {
        match self.store.load() {
            Ok(token) => token,
            Err(e) => {
                warn!(error = %e, "Failed to read stored token");
                None
            }
        }
    }

    /// Start a request, attaching the bearer token when `access` asks for it
    pub fn request(&self, method: Method, path: &str, access: Access) -> RequestBuilder {
        let builder = self.client.request(method, self.url(path));
        match access {
            Access::Anonymous => builder,
            Access::Authenticated => match self.stored_token() {
                Some(token) => builder.bearer_auth(token),
                None => {
                    debug!(path, "No stored token for authenticated request");
                    builder
                }
            },
        }
    }

    /// Check if response is successful, returning an error with body if not.
    async fn check_response(response: Response) -> Result<Response, ApiError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body))
        }
    }

    /// Same as `check_response` for endpoints that issue tokens
    async fn check_auth_response(response: Response) -> Result<Response, ApiError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::auth_rejected(status, &body))
        }
    }

    /// Token issued in the `authorization` response header, if any
    fn issued_token(response: &Response) -> Option<String> {
        let value = response.headers().get(header::AUTHORIZATION)?.to_str().ok()?;
        let value = value.trim();
        let token = value.strip_prefix(BEARER_PREFIX).unwrap_or(value);
        if token.is_empty() {
            None
        } else {
            Some(token.to_string())
        }
    }

    async fn send_json<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        access: Access,
        body: &B,
    ) -> Result<Response, ApiError> {
        debug!(%method, path, ?access, "Sending request");
        Ok(self.request(method, path, access).json(body).send().await?)
    }

    // ===== Authentication =====

    /// Exchange credentials for a bearer token.
    ///
    /// The token comes back in the `authorization` response header, not the body.
    pub async fn login(&self, credentials: &UsernamePassword) -> Result<String, ApiError> {
        let response = self
            .send_json(Method::POST, LOGIN_PATH, Access::Anonymous, credentials)
            .await?;
        let response = Self::check_auth_response(response).await?;
        Self::issued_token(&response).ok_or(ApiError::MissingAuthorizationHeader)
    }

    // ===== Customers =====

    /// Register a customer. Returns the token the server issues for the new account.
    pub async fn create_customer(
        &self,
        registration: &CustomerRegistrationRequest,
    ) -> Result<Option<String>, ApiError> {
        let response = self
            .send_json(Method::POST, CUSTOMERS_PATH, Access::Anonymous, registration)
            .await?;
        let response = Self::check_auth_response(response).await?;
        Ok(Self::issued_token(&response))
    }

    pub async fn get_customers(&self) -> Result<Vec<CustomerDto>, ApiError> {
        let response = self
            .request(Method::GET, CUSTOMERS_PATH, Access::Authenticated)
            .send()
            .await?;
        let response = Self::check_response(response).await?;
        Ok(response.json().await?)
    }

    pub async fn get_customer(&self, customer_id: i64) -> Result<CustomerDto, ApiError> {
        let path = format!("{}/{}", CUSTOMERS_PATH, customer_id);
        let response = self
            .request(Method::GET, &path, Access::Authenticated)
            .send()
            .await?;
        let response = Self::check_response(response).await?;
        Ok(response.json().await?)
    }

    pub async fn update_customer(
        &self,
        customer_id: i64,
        update: &CustomerUpdateRequest,
    ) -> Result<(), ApiError> {
        let path = format!("{}/{}", CUSTOMERS_PATH, customer_id);
        let response = self
            .send_json(Method::PUT, &path, Access::Authenticated, update)
            .await?;
        Self::check_response(response).await?;
        Ok(())
    }

    pub async fn delete_customer(&self, customer_id: i64) -> Result<(), ApiError> {
        let path = format!("{}/{}", CUSTOMERS_PATH, customer_id);
        let response = self
            .request(Method::DELETE, &path, Access::Authenticated)
            .send()
            .await?;
        Self::check_response(response).await?;
        Ok(())
    }

    /// Upload a profile image as the multipart `file` part
    pub async fn upload_profile_image(
        &self,
        customer_id: i64,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<(), ApiError> {
        let path = format!("{}/{}/profile-image", CUSTOMERS_PATH, customer_id);
        let part = multipart::Part::bytes(bytes).file_name(file_name.to_string());
        let form = multipart::Form::new().part("file", part);

        debug!(customer_id, file_name, "Uploading profile image");
        let response = self
            .request(Method::POST, &path, Access::Authenticated)
            .multipart(form)
            .send()
            .await?;
        Self::check_response(response).await?;
        Ok(())
    }

    /// Public URL of a customer's profile image (served without authentication)
    pub fn profile_image_url(&self, customer_id: i64) -> String {
        self.url(&format!("{}/{}/profile-image", CUSTOMERS_PATH, customer_id))
    }
}
