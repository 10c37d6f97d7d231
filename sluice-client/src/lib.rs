//! Sluice HTTP Client
//!
//! A small, typed HTTP client for the control-plane API that stores runs and
//! the definitions they reference.
//!
//! # Example
//!
//! ```no_run
//! use sluice_client::{ApiResource, ControlPlaneClient};
//! use serde_json::{json, Value};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), sluice_client::ClientError> {
//!     let client = ControlPlaneClient::new("http://localhost:8001");
//!
//!     // Ask the server whether a task would be accepted, without storing it
//!     let task = json!({ "apiVersion": "tekton.dev/v1", "kind": "Task" });
//!     let defaulted: Value = client
//!         .create(&ApiResource::new("tekton.dev", "v1", "tasks"), "ci", &task, true)
//!         .await?;
//!
//!     println!("{}", defaulted);
//!     Ok(())
//! }
//! ```

pub mod error;
mod resources;
mod runs;

// Re-export commonly used types
pub use error::{ClientError, Result, StatusReason};
pub use resources::ApiResource;

use error::ApiStatus;
use reqwest::{Client, Method, RequestBuilder};
use serde::de::DeserializeOwned;

/// HTTP client for the control-plane API
#[derive(Debug, Clone)]
pub struct ControlPlaneClient {
    /// Base URL of the API server (e.g., "https://cluster:6443")
    base_url: String,
    /// HTTP client instance
    client: Client,
    /// Bearer token sent with every request
    token: Option<String>,
}

impl ControlPlaneClient {
    /// Create a new client with default HTTP settings
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, Client::new())
    }

    /// Create a new client with a custom HTTP client
    ///
    /// This allows you to configure timeouts, proxies, TLS settings, etc.
    pub fn with_client(base_url: impl Into<String>, client: Client) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            token: None,
        }
    }

    /// Attach a bearer token to every request
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Get the base URL of the API server
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        let builder = self.client.request(method, url);
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    // =============================================================================
    // Response Handlers
    // =============================================================================

    /// Handle an API response and deserialize JSON
    ///
    /// Failed responses are decoded as an API status body when possible so the
    /// error carries the server's reason; otherwise the raw text becomes the
    /// message and the reason is derived from the status code.
    async fn handle_response<T: DeserializeOwned>(&self, response: reqwest::Response) -> Result<T> {
        let status = response.status();

        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            let parsed: ApiStatus = serde_json::from_str(&body).unwrap_or_default();
            let message = if parsed.message.is_empty() {
                body
            } else {
                parsed.message
            };
            tracing::debug!(status = status.as_u16(), reason = ?parsed.reason, "API request failed");
            return Err(ClientError::api_error(
                status.as_u16(),
                parsed.reason.as_deref(),
                message,
            ));
        }

        response
            .json()
            .await
            .map_err(|e| ClientError::ParseError(format!("Failed to parse JSON response: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = ControlPlaneClient::new("http://localhost:8001");
        assert_eq!(client.base_url(), "http://localhost:8001");
        assert!(client.token.is_none());
    }

    #[test]
    fn test_client_trims_trailing_slash() {
        let client = ControlPlaneClient::new("http://localhost:8001/");
        assert_eq!(client.base_url(), "http://localhost:8001");
    }

    #[test]
    fn test_client_with_token() {
        let client = ControlPlaneClient::with_client("http://localhost:8001", Client::new())
            .with_token("secret");
        assert_eq!(client.token.as_deref(), Some("secret"));
    }
}
