//! Authentication endpoints

use serde::{Deserialize, Serialize};

use crate::client::ApiClient;
use crate::error::{ApiError, Result};
use crate::session::{Profile, TokenPair};
use crate::transport::ApiRequest;

/// Password login
pub const LOGIN_PATH: &str = "/auth/login";
/// Account registration
pub const REGISTER_PATH: &str = "/auth/register";
/// Profile of the authenticated user
pub const ME_PATH: &str = "/auth/me";
/// Access token refresh exchange
pub const REFRESH_PATH: &str = "/auth/refresh-token";
/// Server-side logout notification
pub const LOGOUT_PATH: &str = "/auth/logout";

/// Email/password credentials
#[derive(Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    /// Account email
    pub email: String,
    /// Account password
    pub password: String,
}

impl Credentials {
    /// Create credentials
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Kind of account to register
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountRole {
    /// Consumes content
    Subscriber,
    /// Publishes content
    Creator,
}

/// New account details
#[derive(Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    /// Account email
    pub email: String,
    /// Account password
    pub password: String,
    /// Display name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Account role; server default when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<AccountRole>,
}

impl std::fmt::Debug for Registration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registration")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .field("name", &self.name)
            .field("role", &self.role)
            .finish()
    }
}

/// Body of a successful refresh exchange
#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResponse {
    /// Newly issued access token
    pub access_token: String,
    /// Present only if the server rotates refresh tokens
    #[serde(default)]
    pub refresh_token: Option<String>,
}

impl std::fmt::Debug for RefreshResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshResponse")
            .field("access_token", &"<redacted>")
            .field("rotated", &self.refresh_token.is_some())
            .finish()
    }
}

/// `POST /auth/login`
///
/// # Errors
/// Returns `ApiError::Json` if the credentials cannot be encoded
pub fn login_request(credentials: &Credentials) -> Result<ApiRequest> {
    ApiRequest::post(LOGIN_PATH).with_json(credentials)
}

/// `POST /auth/register`
///
/// # Errors
/// Returns `ApiError::Json` if the registration cannot be encoded
pub fn register_request(registration: &Registration) -> Result<ApiRequest> {
    ApiRequest::post(REGISTER_PATH).with_json(registration)
}

/// `GET /auth/me`
#[must_use]
pub fn me_request() -> ApiRequest {
    ApiRequest::get(ME_PATH)
}

/// `POST /auth/refresh-token { refreshToken }`
#[must_use]
pub fn refresh_request(refresh_token: &str) -> ApiRequest {
    ApiRequest::post(REFRESH_PATH).with_body(serde_json::json!({ "refreshToken": refresh_token }))
}

/// `POST /auth/logout`
#[must_use]
pub fn logout_request() -> ApiRequest {
    ApiRequest::post(LOGOUT_PATH)
}

/// Authentication calls and the login flow
#[derive(Debug, Clone, Copy)]
pub struct AuthApi<'a> {
    client: &'a ApiClient,
}

impl<'a> AuthApi<'a> {
    pub(crate) fn new(client: &'a ApiClient) -> Self {
        Self { client }
    }

    /// Log in: exchange credentials for tokens, fetch the profile, install
    /// both and tell other contexts. If the profile cannot be fetched the
    /// new tokens are discarded again.
    ///
    /// # Errors
    ///
    /// Returns the HTTP error of the login or profile call, or a storage
    /// error if the session cannot be persisted.
    pub async fn login(&self, credentials: &Credentials) -> Result<Profile> {
        let tokens: TokenPair = self
            .client
            .execute_public(&login_request(credentials)?)
            .await?
            .json()?;
        self.establish(tokens).await
    }

    /// Register a new account and log it in
    ///
    /// # Errors
    ///
    /// Returns the HTTP error of the register or profile call, or a storage
    /// error if the session cannot be persisted.
    pub async fn register(&self, registration: &Registration) -> Result<Profile> {
        let tokens: TokenPair = self
            .client
            .execute_public(&register_request(registration)?)
            .await?
            .json()?;
        self.establish(tokens).await
    }

    async fn establish(&self, tokens: TokenPair) -> Result<Profile> {
        if tokens.access_token.is_empty() {
            return Err(ApiError::not_authenticated("server issued an empty access token"));
        }

        let session = self.client.session();
        session.set_tokens(tokens.access_token.clone(), tokens.refresh_token.clone())?;
        let profile = match self.me().await {
            Ok(profile) => profile,
            Err(e) => {
                tracing::warn!(error = %e, "Profile fetch failed, discarding new tokens");
                if let Err(discard_err) = session.discard() {
                    tracing::warn!(error = %discard_err, "Failed to discard new tokens");
                }
                return Err(e);
            }
        };
        session.login(&tokens, profile.clone())?;
        Ok(profile)
    }

    /// Fetch the authenticated profile without installing it
    ///
    /// # Errors
    ///
    /// Returns the HTTP error of the call.
    pub async fn me(&self) -> Result<Profile> {
        self.client.execute_json(&me_request()).await
    }

    /// Fetch the authenticated profile and install it on the session
    ///
    /// # Errors
    ///
    /// Returns the HTTP error of the call or a storage error.
    pub async fn load_profile(&self) -> Result<Profile> {
        let profile = self.me().await?;
        self.client.session().set_profile(profile.clone())?;
        Ok(profile)
    }

    /// Log out; see [`Session::logout`](crate::session::Session::logout)
    ///
    /// # Errors
    ///
    /// Returns a storage error if stored values cannot be removed.
    pub async fn logout(&self) -> Result<()> {
        self.client.session().logout().await
    }
}
