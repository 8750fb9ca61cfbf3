//! Refresh interceptor: recover from expired access tokens
//!
//! Every request sent through [`RefreshInterceptor::execute`] follows this
//! state machine:
//!
//! ```text
//! INITIAL ──2xx / other status──────────────────────────────▶ DONE
//!    │
//!    ├──401, attempt 0, refresh token held──▶ REFRESHING
//!    │                                          │
//!    │                      refresh ok ◀────────┤
//!    │                          │               └── refresh failed ──▶ LOGGED_OUT
//!    │                          ▼
//!    │                       RETRIED (attempt 1) ──▶ DONE or FAILED
//!    │
//!    └──401 after retry / 401 without refresh token / 403──▶ LOGGED_OUT
//! ```
//!
//! The retry budget is the `attempt` counter local to one `execute` call, so
//! concurrent requests each get their own single retry. Teardown goes through
//! [`Session::logout`], whose latch makes the server call and the broadcast
//! happen once however many requests fail together.
//!
//! The caller never sees an `AuthExpired` failure; when recovery is not
//! possible it receives the original HTTP error (or the retry's error).

use std::sync::Arc;
use tokio::sync::Mutex;

use crate::api::auth::{RefreshResponse, refresh_request};
use crate::error::{ApiError, ErrorKind, Result};
use crate::session::Session;
use crate::transport::{ApiRequest, ApiResponse, Transport};

/// How concurrent refresh exchanges are coordinated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RefreshMode {
    /// One refresh in flight at a time. A request that waited while another
    /// installed a newer access token retries with it instead of exchanging
    /// again.
    #[default]
    SingleFlight,
    /// Every failing request runs its own exchange: N concurrent 401s make
    /// N refresh calls.
    PerRequest,
}

/// What to do with a response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Hand the response to the caller
    Deliver,
    /// Refresh the access token, then re-issue the request once
    Refresh,
    /// Tear the session down, then hand the response to the caller
    Teardown,
}

impl RetryDecision {
    /// Failure kind this decision stands for, if any
    #[must_use]
    pub fn error_kind(self) -> Option<ErrorKind> {
        match self {
            Self::Deliver => None,
            Self::Refresh => Some(ErrorKind::AuthExpired),
            Self::Teardown => Some(ErrorKind::AuthInvalid),
        }
    }
}

/// Retry policy.
///
/// `attempt` is 0 for the first dispatch and 1 for the re-issue after a
/// refresh. Only a 401 on the first dispatch with a refresh token available
/// is refreshable; 403 never is.
#[must_use]
pub fn decide(status: u16, attempt: u32, has_refresh_token: bool) -> RetryDecision {
    match status {
        401 if attempt == 0 && has_refresh_token => RetryDecision::Refresh,
        401 | 403 => RetryDecision::Teardown,
        _ => RetryDecision::Deliver,
    }
}

/// Sends requests and applies the refresh-and-retry policy
pub struct RefreshInterceptor {
    transport: Arc<dyn Transport>,
    session: Arc<Session>,
    mode: RefreshMode,
    refresh_guard: Mutex<()>,
}

impl std::fmt::Debug for RefreshInterceptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshInterceptor")
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

impl RefreshInterceptor {
    /// Create an interceptor over `transport`, reading and updating `session`
    pub fn new(transport: Arc<dyn Transport>, session: Arc<Session>, mode: RefreshMode) -> Self {
        Self {
            transport,
            session,
            mode,
            refresh_guard: Mutex::new(()),
        }
    }

    /// Refresh coordination mode
    #[must_use]
    pub fn mode(&self) -> RefreshMode {
        self.mode
    }

    /// Send `request`, refreshing and retrying once on an expired token.
    ///
    /// # Errors
    ///
    /// - `ApiError::Network` when no response was received (never retried)
    /// - `ApiError::Http` for a non-2xx response the policy did not recover;
    ///   for auth failures the session has been torn down by then
    pub async fn execute(&self, request: &ApiRequest) -> Result<ApiResponse> {
        let mut attempt = 0;
        loop {
            let sent_with = self.transport.token();
            let response = self.transport.send(request).await?;

            let decision = decide(
                response.status,
                attempt,
                self.session.refresh_token().is_some(),
            );

            match decision {
                RetryDecision::Deliver => return response.error_for_status(),
                RetryDecision::Teardown => {
                    tracing::warn!(
                        method = %request.method(),
                        path = %request.path(),
                        status = response.status,
                        attempt,
                        "Authorization rejected, tearing session down"
                    );
                    self.teardown().await;
                    return response.error_for_status();
                }
                RetryDecision::Refresh => {
                    tracing::debug!(
                        method = %request.method(),
                        path = %request.path(),
                        attempt,
                        "Access token expired, refreshing"
                    );
                    if !self.recover(sent_with.as_deref()).await {
                        return response.error_for_status();
                    }
                    attempt += 1;
                }
            }
        }
    }

    /// Obtain a fresh access token; on failure the session is torn down.
    /// Returns whether the request should be re-issued.
    async fn recover(&self, stale_token: Option<&str>) -> bool {
        let _singleflight = match self.mode {
            RefreshMode::SingleFlight => Some(self.refresh_guard.lock().await),
            RefreshMode::PerRequest => None,
        };

        if self.mode == RefreshMode::SingleFlight {
            if self.session.is_torn_down() {
                tracing::debug!("Session torn down while waiting for refresh");
                return false;
            }
            let current = self.session.access_token();
            if current.is_some() && current.as_deref() != stale_token {
                tracing::debug!("Access token already refreshed by a concurrent request");
                return true;
            }
        }

        let generation = self.session.generation();
        match self.exchange(generation).await {
            Ok(()) => true,
            Err(e) if self.session.generation() != generation => {
                tracing::debug!(error = %e, "Session changed during refresh, result dropped");
                // A newer login may have installed usable tokens meanwhile
                !self.session.is_torn_down() && self.session.access_token().is_some()
            }
            Err(e) => {
                tracing::warn!(error = %e, "Token refresh failed");
                self.teardown().await;
                false
            }
        }
    }

    /// Run one refresh exchange and install the result unless the session
    /// moved past `generation` meanwhile
    async fn exchange(&self, generation: u64) -> Result<()> {
        let refresh_token = self
            .session
            .refresh_token()
            .ok_or_else(|| ApiError::not_authenticated("no refresh token held"))?;

        let refreshed: RefreshResponse = self
            .transport
            .send(&refresh_request(&refresh_token))
            .await?
            .error_for_status()?
            .json()?;

        if refreshed.access_token.is_empty() {
            return Err(ApiError::not_authenticated(
                "refresh exchange returned an empty access token",
            ));
        }

        self.session.set_refreshed(
            &refreshed.access_token,
            refreshed.refresh_token.as_deref(),
            generation,
        )?;
        tracing::debug!(
            rotated = refreshed.refresh_token.is_some(),
            "Access token refreshed"
        );
        Ok(())
    }

    async fn teardown(&self) {
        if let Err(e) = self.session.logout().await {
            tracing::warn!(error = %e, "Session teardown did not complete cleanly");
        }
    }
}
