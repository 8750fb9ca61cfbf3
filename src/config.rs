//! Client configuration

use std::path::PathBuf;
use std::time::Duration;
use typed_builder::TypedBuilder;

use crate::error::{ApiError, Result};
use crate::interceptor::RefreshMode;

/// Storage lifetime of the persisted access token
pub const DEFAULT_ACCESS_TOKEN_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Storage lifetime of the persisted refresh token
pub const DEFAULT_REFRESH_TOKEN_TTL: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// Name of the cross-context session channel
pub const DEFAULT_CHANNEL_NAME: &str = "auth";

fn default_storage_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("session-api-client")
        .join("session.json")
}

fn default_user_agent() -> String {
    format!("session-api-client/{}", crate::VERSION)
}

/// Configuration for [`ApiClient`](crate::ApiClient)
#[derive(Debug, Clone, TypedBuilder)]
#[builder(
    builder_method(doc = "Create a new builder for ClientConfig"),
    builder_type(doc = "Builder for ClientConfig", vis = "pub"),
    build_method(doc = "Build the ClientConfig")
)]
pub struct ClientConfig {
    /// Base URL every request path is joined onto
    #[builder(setter(into))]
    pub base_url: String,

    /// File holding the persisted session
    #[builder(default = default_storage_path(), setter(into))]
    pub storage_path: PathBuf,

    /// Cross-context channel name
    #[builder(default = DEFAULT_CHANNEL_NAME.to_string(), setter(into))]
    pub channel_name: String,

    /// How concurrent refreshes are coordinated
    #[builder(default)]
    pub refresh_mode: RefreshMode,

    /// How long a stored access token stays readable
    #[builder(default = DEFAULT_ACCESS_TOKEN_TTL)]
    pub access_token_ttl: Duration,

    /// How long a stored refresh token stays readable
    #[builder(default = DEFAULT_REFRESH_TOKEN_TTL)]
    pub refresh_token_ttl: Duration,

    /// Per-request timeout; none by default
    #[builder(default, setter(strip_option))]
    pub request_timeout: Option<Duration>,

    /// User-Agent header value
    #[builder(default = default_user_agent(), setter(into))]
    pub user_agent: String,
}

impl ClientConfig {
    /// Check the configuration for values the client cannot work with
    ///
    /// # Errors
    ///
    /// Returns `ApiError::InvalidConfig` for a missing or non-HTTP base URL,
    /// zero storage lifetimes, or an empty channel name.
    pub fn validate(&self) -> Result<()> {
        let base = self.base_url.trim();
        if base.is_empty() {
            return Err(ApiError::invalid_config("base_url must not be empty"));
        }
        if !(base.starts_with("http://") || base.starts_with("https://")) {
            return Err(ApiError::invalid_config(format!(
                "base_url must start with http:// or https://, got {base}"
            )));
        }
        if self.access_token_ttl.is_zero() || self.refresh_token_ttl.is_zero() {
            return Err(ApiError::invalid_config("token lifetimes must be non-zero"));
        }
        if self.channel_name.is_empty() {
            return Err(ApiError::invalid_config("channel_name must not be empty"));
        }
        Ok(())
    }
}
