//! HTTP transport implementation using reqwest

use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderValue};
use std::sync::RwLock;

use crate::config::ClientConfig;
use crate::error::{ApiError, Result};
use crate::transport::{ApiRequest, ApiResponse, Transport};

/// reqwest-backed transport with a base URL and a swappable bearer token
pub struct HttpTransport {
    base_url: String,
    http_client: reqwest::Client,
    token: RwLock<Option<String>>,
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport")
            .field("base_url", &self.base_url)
            .field("token", &self.token().map(|_| "<redacted>"))
            .finish()
    }
}

impl HttpTransport {
    /// Create a transport for `base_url` with an optional initial token
    ///
    /// # Errors
    ///
    /// Returns `ApiError::InvalidConfig` if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>, initial_token: Option<String>) -> Result<Self> {
        Self::with_client(base_url, initial_token, Self::client_builder())
    }

    /// Create a transport from client configuration
    ///
    /// # Errors
    ///
    /// Returns `ApiError::InvalidConfig` if the HTTP client cannot be built.
    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        let mut builder = Self::client_builder().user_agent(config.user_agent.clone());
        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }
        Self::with_client(config.base_url.clone(), None, builder)
    }

    fn client_builder() -> reqwest::ClientBuilder {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        reqwest::Client::builder().default_headers(headers)
    }

    fn with_client(
        base_url: impl Into<String>,
        initial_token: Option<String>,
        builder: reqwest::ClientBuilder,
    ) -> Result<Self> {
        let http_client = builder
            .build()
            .map_err(|e| ApiError::invalid_config(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http_client,
            token: RwLock::new(initial_token),
        })
    }

    /// Base URL without trailing slash
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Absolute URL for a request path
    #[must_use]
    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Build the outgoing request, reading the current token.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::InvalidConfig` if the URL or body is malformed.
    pub fn build_request(&self, request: &ApiRequest) -> Result<reqwest::Request> {
        let mut builder = self
            .http_client
            .request(request.method().into(), self.url(request.path()));

        if !request.query().is_empty() {
            builder = builder.query(request.query());
        }
        if let Some(token) = self.token() {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = request.body() {
            builder = builder.json(body);
        }

        builder
            .build()
            .map_err(|e| ApiError::invalid_config(format!("Invalid request: {e}")))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse> {
        let outgoing = self.build_request(request)?;

        let response = self.http_client.execute(outgoing).await.map_err(|e| {
            tracing::debug!(method = %request.method(), path = %request.path(), error = %e, "Request failed without response");
            ApiError::network(e.to_string())
        })?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| ApiError::network(format!("Failed to read response body: {e}")))?;

        tracing::trace!(method = %request.method(), path = %request.path(), status, "Response received");

        Ok(ApiResponse { status, body })
    }

    fn set_token(&self, token: Option<String>) {
        let mut slot = self
            .token
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        *slot = token;
    }

    fn token(&self) -> Option<String> {
        self.token
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}
