//! Transport layer for talking to the remote API
//!
//! This module provides the transport abstraction used by the client and
//! the request/response descriptors that flow through it. The transport
//! owns the default `Authorization` header: [`Transport::set_token`] changes
//! it for every request dispatched afterwards, never for one already sent.

pub mod http;

use async_trait::async_trait;
use serde::de::DeserializeOwned;

use crate::error::{ApiError, Result};

/// HTTP method of an [`ApiRequest`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    /// GET
    Get,
    /// POST
    Post,
    /// PUT
    Put,
    /// PATCH
    Patch,
    /// DELETE
    Delete,
}

impl Method {
    /// Upper-case method name
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<Method> for reqwest::Method {
    fn from(method: Method) -> Self {
        match method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Patch => reqwest::Method::PATCH,
            Method::Delete => reqwest::Method::DELETE,
        }
    }
}

/// Immutable description of one API call.
///
/// Re-issuing a request after a refresh sends the same descriptor again;
/// the retry budget lives in the interceptor, not here.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    method: Method,
    path: String,
    body: Option<serde_json::Value>,
    query: Vec<(String, String)>,
}

impl ApiRequest {
    /// Create a request without body or query parameters
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
            query: Vec::new(),
        }
    }

    /// GET request
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path)
    }

    /// POST request
    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::Post, path)
    }

    /// PATCH request
    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::Patch, path)
    }

    /// PUT request
    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::Put, path)
    }

    /// DELETE request
    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::Delete, path)
    }

    /// Attach a JSON body
    #[must_use]
    pub fn with_body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Serialize a value as the JSON body
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Json` if the value cannot be serialized.
    pub fn with_json<T: serde::Serialize>(self, body: &T) -> Result<Self> {
        Ok(self.with_body(serde_json::to_value(body)?))
    }

    /// Append a query parameter
    #[must_use]
    pub fn with_query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((key.into(), value.to_string()));
        self
    }

    /// Append a query parameter when the value is present
    #[must_use]
    pub fn with_query_opt(self, key: impl Into<String>, value: Option<impl ToString>) -> Self {
        match value {
            Some(value) => self.with_query(key, value),
            None => self,
        }
    }

    /// HTTP method
    #[must_use]
    pub fn method(&self) -> Method {
        self.method
    }

    /// Path relative to the base URL
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// JSON body, if any
    #[must_use]
    pub fn body(&self) -> Option<&serde_json::Value> {
        self.body.as_ref()
    }

    /// Query parameters in insertion order
    #[must_use]
    pub fn query(&self) -> &[(String, String)] {
        &self.query
    }
}

/// HTTP response as seen by the client: status plus raw body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    /// HTTP status code
    pub status: u16,
    /// Response body as text
    pub body: String,
}

impl ApiResponse {
    /// Create a response
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Whether the status is 2xx
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Decode the body as JSON
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Json` if the body does not match `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_str(&self.body)?)
    }

    /// Turn a non-2xx response into `ApiError::Http`
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Http` when the status is not 2xx.
    pub fn error_for_status(self) -> Result<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(ApiError::http(self.status, self.body))
        }
    }
}

/// Transport trait for dispatching API requests
///
/// Implementations must read the current token at dispatch time, so that a
/// token installed with [`set_token`](Self::set_token) applies to every
/// request sent after the call.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a request.
    ///
    /// Any HTTP response, including non-2xx, is returned as `Ok`.
    ///
    /// # Errors
    /// Returns `ApiError::Network` when no HTTP response was received
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse>;

    /// Replace the bearer token used for subsequent requests
    fn set_token(&self, token: Option<String>);

    /// Bearer token that the next request would carry
    fn token(&self) -> Option<String>;
}

pub use http::HttpTransport;
