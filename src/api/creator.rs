//! Creator endpoints

use serde::{Deserialize, Serialize};

use super::{Page, path_segment};
use super::content::Content;
use crate::client::ApiClient;
use crate::error::Result;
use crate::transport::ApiRequest;

/// Creator collection
pub const CREATORS_PATH: &str = "/creators";

/// Public creator record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Creator {
    /// Creator id
    pub id: String,
    /// Display name
    #[serde(default)]
    pub name: String,
    /// Whether the current user subscribes
    #[serde(default)]
    pub subscribed: bool,
    /// Everything else the server sent
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

fn creator_path(id: &str) -> Result<String> {
    Ok(format!("{CREATORS_PATH}/{}", path_segment(id)?))
}

/// `GET /creators?page&limit`
#[must_use]
pub fn list_request(page: Option<u32>, limit: Option<u32>) -> ApiRequest {
    ApiRequest::get(CREATORS_PATH)
        .with_query_opt("page", page)
        .with_query_opt("limit", limit)
}

/// `GET /creators/{id}`
///
/// # Errors
/// Returns `ApiError::InvalidRequest` for an empty or dot-segment id
pub fn get_request(id: &str) -> Result<ApiRequest> {
    Ok(ApiRequest::get(creator_path(id)?))
}

/// `GET /creators/{id}/content?page`
///
/// # Errors
/// Returns `ApiError::InvalidRequest` for an empty or dot-segment id
pub fn content_request(id: &str, page: Option<u32>) -> Result<ApiRequest> {
    Ok(ApiRequest::get(format!("{}/content", creator_path(id)?)).with_query_opt("page", page))
}

/// `POST /creators/{id}/subscribe`
///
/// # Errors
/// Returns `ApiError::InvalidRequest` for an empty or dot-segment id
pub fn subscribe_request(id: &str) -> Result<ApiRequest> {
    Ok(ApiRequest::post(format!("{}/subscribe", creator_path(id)?)))
}

/// `DELETE /creators/{id}/subscribe`
///
/// # Errors
/// Returns `ApiError::InvalidRequest` for an empty or dot-segment id
pub fn unsubscribe_request(id: &str) -> Result<ApiRequest> {
    Ok(ApiRequest::delete(format!("{}/subscribe", creator_path(id)?)))
}

/// Creator calls
#[derive(Debug, Clone, Copy)]
pub struct CreatorApi<'a> {
    client: &'a ApiClient,
}

impl<'a> CreatorApi<'a> {
    pub(crate) fn new(client: &'a ApiClient) -> Self {
        Self { client }
    }

    /// List creators
    ///
    /// # Errors
    /// Returns the HTTP or decode error of the call
    pub async fn list(&self, page: Option<u32>, limit: Option<u32>) -> Result<Page<Creator>> {
        self.client.execute_json(&list_request(page, limit)).await
    }

    /// Fetch one creator
    ///
    /// # Errors
    /// Returns the HTTP or decode error of the call
    pub async fn get(&self, id: &str) -> Result<Creator> {
        self.client.execute_json(&get_request(id)?).await
    }

    /// List a creator's content
    ///
    /// # Errors
    /// Returns the HTTP or decode error of the call
    pub async fn content(&self, id: &str, page: Option<u32>) -> Result<Page<Content>> {
        self.client.execute_json(&content_request(id, page)?).await
    }

    /// Subscribe to a creator. Payment, if any, is handled by the caller
    /// before this call.
    ///
    /// # Errors
    /// Returns the HTTP error of the call
    pub async fn subscribe(&self, id: &str) -> Result<()> {
        self.client.execute(&subscribe_request(id)?).await?;
        Ok(())
    }

    /// Cancel a subscription
    ///
    /// # Errors
    /// Returns the HTTP error of the call
    pub async fn unsubscribe(&self, id: &str) -> Result<()> {
        self.client.execute(&unsubscribe_request(id)?).await?;
        Ok(())
    }
}
