//! Error types for the session API client

use thiserror::Error;

use crate::session::StorageError;

/// Main error type for the session API client
#[derive(Error, Debug)]
pub enum ApiError {
    /// Transport failure with no HTTP response (DNS, connect, TLS, reset).
    /// Never retried automatically.
    #[error("Network error: {0}")]
    Network(String),

    /// The server answered with a non-2xx status
    #[error("HTTP {status}: {body}")]
    Http {
        /// HTTP status code
        status: u16,
        /// Raw response body (may be empty)
        body: String,
    },

    /// JSON encode/decode error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Durable session storage failed
    #[error("Session storage error: {0}")]
    Storage(#[from] StorageError),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Operation requires an authenticated session
    #[error("Not authenticated: {0}")]
    NotAuthenticated(String),

    /// A request could not be built from the given arguments
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Session event bus failure
    #[error("Session event bus error: {0}")]
    Bus(String),
}

/// Result type alias for client operations
pub type Result<T> = std::result::Result<T, ApiError>;

/// Coarse classification of failures, as seen by the refresh policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Transport failure, no HTTP response
    Network,
    /// 401 with an eligible retry, recovered by refreshing
    AuthExpired,
    /// 401/403 with no eligible retry, or a failed refresh exchange
    AuthInvalid,
    /// Any other non-2xx status
    Server,
    /// Client-side failure (storage, config, encoding)
    Local,
}

impl ApiError {
    /// Create a network error
    pub fn network(msg: impl Into<String>) -> Self {
        Self::Network(msg.into())
    }

    /// Create an HTTP status error
    pub fn http(status: u16, body: impl Into<String>) -> Self {
        Self::Http {
            status,
            body: body.into(),
        }
    }

    /// Create an invalid configuration error
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create an invalid request error
    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    /// Create a not-authenticated error
    pub fn not_authenticated(msg: impl Into<String>) -> Self {
        Self::NotAuthenticated(msg.into())
    }

    /// Create a bus error
    pub fn bus(msg: impl Into<String>) -> Self {
        Self::Bus(msg.into())
    }

    /// HTTP status carried by this error, if any
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Classify the error as the caller sees it.
    ///
    /// A 401/403 that reaches the caller was not recovered by a refresh, so
    /// it always reads as [`ErrorKind::AuthInvalid`] here.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Network(_) => ErrorKind::Network,
            Self::Http { status: 401 | 403, .. } => ErrorKind::AuthInvalid,
            Self::Http { .. } => ErrorKind::Server,
            _ => ErrorKind::Local,
        }
    }
}
