//! Typed request builders for the remote API
//!
//! Each submodule has free functions that build [`ApiRequest`]s and a thin
//! facade borrowing the [`ApiClient`](crate::ApiClient) that sends them
//! through the refresh interceptor.
//!
//! ```no_run
//! use session_api_client::{ApiClient, ClientConfig};
//! use session_api_client::api::content::ContentQuery;
//!
//! # async fn example() -> session_api_client::Result<()> {
//! let client = ApiClient::create(
//!     ClientConfig::builder().base_url("https://api.example.com").build(),
//! )?;
//! client.hydrate()?;
//!
//! let page = client
//!     .content()
//!     .list(&ContentQuery::default().with_limit(20))
//!     .await?;
//! println!("{} items", page.items.len());
//! # Ok(())
//! # }
//! ```
//!
//! [`ApiRequest`]: crate::transport::ApiRequest

pub mod auth;
pub mod content;
pub mod creator;

use serde::{Deserialize, Serialize};

use crate::error::{ApiError, Result};

/// Encode `id` as a single path segment.
///
/// Ids that would resolve to another path (empty, `.` or `..`) are rejected.
pub(crate) fn path_segment(id: &str) -> Result<String> {
    if matches!(id, "" | "." | "..") {
        return Err(ApiError::invalid_request(format!(
            "{id:?} is not a valid resource id"
        )));
    }
    Ok(urlencoding::encode(id).into_owned())
}

/// One page of a listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    /// Items on this page
    pub items: Vec<T>,
    /// Total number of items, when the server reports it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
    /// Page number
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    /// Page size
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

pub use auth::AuthApi;
pub use content::ContentApi;
pub use creator::CreatorApi;
