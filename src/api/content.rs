//! Content endpoints

use serde::{Deserialize, Serialize};

use super::{Page, path_segment};
use crate::client::ApiClient;
use crate::error::Result;
use crate::transport::ApiRequest;

/// Content collection
pub const CONTENT_PATH: &str = "/content";

/// A published content item.
///
/// Fields the client does not model are kept in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Content {
    /// Content id
    pub id: String,
    /// Title
    pub title: String,
    /// Short description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Owning creator
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creator_id: Option<String>,
    /// Visible to subscribers only
    #[serde(default)]
    pub premium: bool,
    /// Everything else the server sent
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Filters for listing content
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContentQuery {
    /// 1-based page number
    pub page: Option<u32>,
    /// Page size
    pub limit: Option<u32>,
    /// Only content by this creator
    pub creator_id: Option<String>,
}

impl ContentQuery {
    /// Set the page number
    #[must_use]
    pub fn with_page(mut self, page: u32) -> Self {
        self.page = Some(page);
        self
    }

    /// Set the page size
    #[must_use]
    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Restrict to one creator
    #[must_use]
    pub fn with_creator(mut self, creator_id: impl Into<String>) -> Self {
        self.creator_id = Some(creator_id.into());
        self
    }
}

/// New content item
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentDraft {
    /// Title
    pub title: String,
    /// Short description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Visible to subscribers only
    pub premium: bool,
}

/// Partial update; absent fields stay unchanged
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentUpdate {
    /// New title
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// New description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// New visibility
    #[serde(skip_serializing_if = "Option::is_none")]
    pub premium: Option<bool>,
}

fn item_path(id: &str) -> Result<String> {
    Ok(format!("{CONTENT_PATH}/{}", path_segment(id)?))
}

/// `GET /content?page&limit&creatorId`
#[must_use]
pub fn list_request(query: &ContentQuery) -> ApiRequest {
    ApiRequest::get(CONTENT_PATH)
        .with_query_opt("page", query.page)
        .with_query_opt("limit", query.limit)
        .with_query_opt("creatorId", query.creator_id.as_deref())
}

/// `GET /content/{id}`
///
/// # Errors
/// Returns `ApiError::InvalidRequest` for an empty or dot-segment id
pub fn get_request(id: &str) -> Result<ApiRequest> {
    Ok(ApiRequest::get(item_path(id)?))
}

/// `POST /content`
///
/// # Errors
/// Returns `ApiError::Json` if the draft cannot be encoded
pub fn create_request(draft: &ContentDraft) -> Result<ApiRequest> {
    ApiRequest::post(CONTENT_PATH).with_json(draft)
}

/// `PATCH /content/{id}`
///
/// # Errors
/// Returns `ApiError::InvalidRequest` for an invalid id, `ApiError::Json`
/// if the update cannot be encoded
pub fn update_request(id: &str, update: &ContentUpdate) -> Result<ApiRequest> {
    ApiRequest::patch(item_path(id)?).with_json(update)
}

/// `DELETE /content/{id}`
///
/// # Errors
/// Returns `ApiError::InvalidRequest` for an empty or dot-segment id
pub fn delete_request(id: &str) -> Result<ApiRequest> {
    Ok(ApiRequest::delete(item_path(id)?))
}

/// Content calls
#[derive(Debug, Clone, Copy)]
pub struct ContentApi<'a> {
    client: &'a ApiClient,
}

impl<'a> ContentApi<'a> {
    pub(crate) fn new(client: &'a ApiClient) -> Self {
        Self { client }
    }

    /// List content
    ///
    /// # Errors
    /// Returns the HTTP or decode error of the call
    pub async fn list(&self, query: &ContentQuery) -> Result<Page<Content>> {
        self.client.execute_json(&list_request(query)).await
    }

    /// Fetch one item
    ///
    /// # Errors
    /// Returns the HTTP or decode error of the call
    pub async fn get(&self, id: &str) -> Result<Content> {
        self.client.execute_json(&get_request(id)?).await
    }

    /// Publish a new item
    ///
    /// # Errors
    /// Returns the HTTP or decode error of the call
    pub async fn create(&self, draft: &ContentDraft) -> Result<Content> {
        self.client.execute_json(&create_request(draft)?).await
    }

    /// Update an item
    ///
    /// # Errors
    /// Returns the HTTP or decode error of the call
    pub async fn update(&self, id: &str, update: &ContentUpdate) -> Result<Content> {
        self.client.execute_json(&update_request(id, update)?).await
    }

    /// Delete an item
    ///
    /// # Errors
    /// Returns the HTTP error of the call
    pub async fn delete(&self, id: &str) -> Result<()> {
        self.client.execute(&delete_request(id)?).await?;
        Ok(())
    }
}
