//! Session state: the token pair and the authenticated profile
//!
//! [`Session`] is the only writer of the token pair. Every change is written
//! to memory, to durable storage, and to the transport's default
//! `Authorization` header, so requests dispatched afterwards carry it.
//!
//! # Lifecycle
//!
//! 1. `Session::new` creates an empty, logged-out session
//! 2. [`Session::hydrate`] restores persisted values (no network)
//! 3. [`Session::set_tokens`] / [`Session::set_profile`] / [`Session::login`]
//!    establish a session
//! 4. [`Session::logout`] tears it down, at most once per established session

pub mod storage;

pub use storage::{
    ACCESS_TOKEN_KEY, FileSessionStore, MemorySessionStore, PROFILE_KEY, REFRESH_TOKEN_KEY,
    SessionStore, StorageError,
};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use crate::api::auth::logout_request;
use crate::config::{DEFAULT_ACCESS_TOKEN_TTL, DEFAULT_REFRESH_TOKEN_TTL};
use crate::error::{ApiError, Result};
use crate::sync::{ReloadHandler, SessionEvent, SessionEventBus};
use crate::transport::Transport;

/// Authenticated user or creator record. Not interpreted beyond emptiness.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Profile(serde_json::Value);

impl Profile {
    /// Wrap a profile record
    #[must_use]
    pub fn new(value: serde_json::Value) -> Self {
        Self(value)
    }

    /// Whether the record carries no data (null, `{}`, `[]` or `""`)
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match &self.0 {
            serde_json::Value::Null => true,
            serde_json::Value::Object(map) => map.is_empty(),
            serde_json::Value::Array(items) => items.is_empty(),
            serde_json::Value::String(s) => s.is_empty(),
            _ => false,
        }
    }

    /// Look up a top-level field
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&serde_json::Value> {
        self.0.get(field)
    }

    /// Raw record
    #[must_use]
    pub fn as_value(&self) -> &serde_json::Value {
        &self.0
    }

    /// Decode the record into a concrete type
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Json` if the record does not match `T`.
    pub fn decode<T: serde::de::DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(self.0.clone())?)
    }
}

impl From<serde_json::Value> for Profile {
    fn from(value: serde_json::Value) -> Self {
        Self(value)
    }
}

/// Access/refresh token pair as issued by the server
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    /// Short-lived bearer credential
    pub access_token: String,
    /// Credential used only to obtain new access tokens
    pub refresh_token: String,
}

impl TokenPair {
    /// Create a token pair
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
        }
    }
}

impl std::fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenPair")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .finish()
    }
}

/// Snapshot of the in-memory session
#[derive(Clone, Default, PartialEq)]
pub struct SessionData {
    /// Current access token
    pub access_token: Option<String>,
    /// Current refresh token
    pub refresh_token: Option<String>,
    /// Authenticated profile
    pub profile: Option<Profile>,
}

impl SessionData {
    /// Access token present and a non-empty profile present
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.access_token.is_some() && self.profile.as_ref().is_some_and(|p| !p.is_empty())
    }
}

impl std::fmt::Debug for SessionData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionData")
            .field("access_token", &self.access_token.as_ref().map(|_| "<redacted>"))
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .field("profile", &self.profile)
            .finish()
    }
}

/// How long each persisted value stays readable
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageLifetimes {
    /// Access token lifetime in storage
    pub access_token: Duration,
    /// Refresh token lifetime in storage
    pub refresh_token: Duration,
}

impl Default for StorageLifetimes {
    fn default() -> Self {
        Self {
            access_token: DEFAULT_ACCESS_TOKEN_TTL,
            refresh_token: DEFAULT_REFRESH_TOKEN_TTL,
        }
    }
}

/// Session context for one client instance
pub struct Session {
    store: Arc<dyn SessionStore>,
    transport: Arc<dyn Transport>,
    bus: Arc<dyn SessionEventBus>,
    lifetimes: StorageLifetimes,
    state: RwLock<SessionData>,
    /// Set by the first teardown; cleared when a new token pair is installed
    torn_down: AtomicBool,
    /// Bumped whenever the token pair is replaced or cleared wholesale
    generation: AtomicU64,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("state", &self.snapshot())
            .field("lifetimes", &self.lifetimes)
            .field("torn_down", &self.torn_down.load(Ordering::SeqCst))
            .field("generation", &self.generation())
            .finish()
    }
}

impl Session {
    /// Create an empty session. Nothing is read until [`hydrate`](Self::hydrate).
    pub fn new(
        store: Arc<dyn SessionStore>,
        transport: Arc<dyn Transport>,
        bus: Arc<dyn SessionEventBus>,
        lifetimes: StorageLifetimes,
    ) -> Self {
        Self {
            store,
            transport,
            bus,
            lifetimes,
            state: RwLock::new(SessionData::default()),
            torn_down: AtomicBool::new(false),
            generation: AtomicU64::new(0),
        }
    }

    fn read_state(&self) -> std::sync::RwLockReadGuard<'_, SessionData> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> std::sync::RwLockWriteGuard<'_, SessionData> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace in-memory state with what storage holds. Idempotent; makes
    /// no network calls.
    ///
    /// A stored profile without a stored access token is discarded.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Storage` if storage cannot be read.
    pub fn hydrate(&self) -> Result<()> {
        let access_token = self.store.get(ACCESS_TOKEN_KEY)?;
        let refresh_token = self.store.get(REFRESH_TOKEN_KEY)?;
        let profile = match (&access_token, self.store.get(PROFILE_KEY)?) {
            (Some(_), Some(blob)) => match serde_json::from_str::<Profile>(&blob) {
                Ok(profile) => Some(profile),
                Err(e) => {
                    tracing::warn!(error = %e, "Discarding unreadable stored profile");
                    None
                }
            },
            _ => None,
        };

        let restored = access_token.is_some();
        {
            let mut state = self.write_state();
            self.transport.set_token(access_token.clone());
            *state = SessionData {
                access_token,
                refresh_token,
                profile,
            };
            self.generation.fetch_add(1, Ordering::SeqCst);
        }
        if restored {
            self.torn_down.store(false, Ordering::SeqCst);
        }

        tracing::debug!(restored, "Session hydrated from storage");
        Ok(())
    }

    /// Install a new token pair and persist both halves with their own
    /// lifetimes. Re-arms teardown for the new session.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Storage` if storage cannot be written.
    pub fn set_tokens(
        &self,
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
    ) -> Result<()> {
        let access_token = access_token.into();
        let refresh_token = refresh_token.into();

        let mut state = self.write_state();
        state.access_token = Some(access_token.clone());
        state.refresh_token = Some(refresh_token.clone());
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.transport.set_token(Some(access_token.clone()));
        self.torn_down.store(false, Ordering::SeqCst);

        self.store.set(
            ACCESS_TOKEN_KEY,
            &access_token,
            Some(self.lifetimes.access_token),
        )?;
        self.store.set(
            REFRESH_TOKEN_KEY,
            &refresh_token,
            Some(self.lifetimes.refresh_token),
        )?;
        Ok(())
    }

    /// Token-pair generation. A refresh exchange records it before sending
    /// and passes it back to [`set_refreshed`](Self::set_refreshed).
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Install a refreshed access token, and a rotated refresh token when the
    /// server sent one.
    ///
    /// `generation` is the value of [`generation`](Self::generation) taken
    /// before the exchange; if the session was replaced since, or a teardown
    /// has started, nothing is installed.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::NotAuthenticated` if the session changed during the
    /// exchange, `ApiError::Storage` if storage cannot be written.
    pub fn set_refreshed(
        &self,
        access_token: &str,
        rotated_refresh: Option<&str>,
        generation: u64,
    ) -> Result<()> {
        let mut state = self.write_state();
        if self.generation() != generation || self.is_torn_down() {
            return Err(ApiError::not_authenticated(
                "session changed while the refresh was in flight",
            ));
        }
        state.access_token = Some(access_token.to_string());
        if let Some(refresh) = rotated_refresh {
            state.refresh_token = Some(refresh.to_string());
        }
        self.transport.set_token(Some(access_token.to_string()));

        self.store.set(
            ACCESS_TOKEN_KEY,
            access_token,
            Some(self.lifetimes.access_token),
        )?;
        if let Some(refresh) = rotated_refresh {
            self.store
                .set(REFRESH_TOKEN_KEY, refresh, Some(self.lifetimes.refresh_token))?;
        }
        Ok(())
    }

    /// Attach the authenticated profile and persist it for quick rehydration
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Storage` or `ApiError::Json` if it cannot be persisted.
    pub fn set_profile(&self, profile: Profile) -> Result<()> {
        let blob = serde_json::to_string(&profile)?;
        self.write_state().profile = Some(profile);
        self.store
            .set(PROFILE_KEY, &blob, Some(self.lifetimes.access_token))?;
        Ok(())
    }

    /// Install tokens and profile together, then tell other contexts.
    ///
    /// # Errors
    ///
    /// Returns an error if the session cannot be persisted.
    pub fn login(&self, tokens: &TokenPair, profile: Profile) -> Result<()> {
        self.set_tokens(tokens.access_token.clone(), tokens.refresh_token.clone())?;
        self.set_profile(profile)?;
        if let Err(e) = self.bus.publish(SessionEvent::Login) {
            tracing::warn!(error = %e, "Failed to broadcast login");
        }
        tracing::info!("Session established");
        Ok(())
    }

    /// Tear the session down.
    ///
    /// The first call after a session was established notifies the server
    /// (failures ignored), and after clearing publishes a logout event.
    /// Every call clears memory and storage. Safe to call concurrently and
    /// repeatedly.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Storage` if stored values cannot be removed; memory
    /// is cleared regardless.
    pub async fn logout(&self) -> Result<()> {
        let first = !self.torn_down.swap(true, Ordering::SeqCst);

        if first {
            match self.transport.send(&logout_request()).await {
                Ok(response) if response.is_success() => {
                    tracing::debug!("Server acknowledged logout");
                }
                Ok(response) => {
                    tracing::debug!(status = response.status, "Server rejected logout, ignoring");
                }
                Err(e) => {
                    tracing::debug!(error = %e, "Logout notification failed, ignoring");
                }
            }
        }

        let cleared = self.discard();

        if first {
            if let Err(e) = self.bus.publish(SessionEvent::Logout) {
                tracing::warn!(error = %e, "Failed to broadcast logout");
            }
            tracing::warn!("Session torn down");
        }

        cleared
    }

    /// Drop tokens and profile from memory, the transport and storage,
    /// without notifying the server or other contexts
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Storage` if stored values cannot be removed; memory
    /// is cleared regardless.
    pub fn discard(&self) -> Result<()> {
        let mut state = self.write_state();
        *state = SessionData::default();
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.transport.set_token(None);

        self.store.remove(ACCESS_TOKEN_KEY)?;
        self.store.remove(REFRESH_TOKEN_KEY)?;
        self.store.remove(PROFILE_KEY)?;
        Ok(())
    }

    /// Whether a teardown already ran for the current session
    #[must_use]
    pub fn is_torn_down(&self) -> bool {
        self.torn_down.load(Ordering::SeqCst)
    }

    /// Access token present and a non-empty profile present.
    /// Computed on every call; never stored.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.read_state().is_authenticated()
    }

    /// Current access token
    #[must_use]
    pub fn access_token(&self) -> Option<String> {
        self.read_state().access_token.clone()
    }

    /// Current refresh token
    #[must_use]
    pub fn refresh_token(&self) -> Option<String> {
        self.read_state().refresh_token.clone()
    }

    /// Current profile; `None` while no access token is held
    #[must_use]
    pub fn profile(&self) -> Option<Profile> {
        let state = self.read_state();
        state.access_token.as_ref().and(state.profile.clone())
    }

    /// Copy of the whole in-memory state
    #[must_use]
    pub fn snapshot(&self) -> SessionData {
        self.read_state().clone()
    }
}

/// Reloading a context means re-reading storage from scratch.
#[async_trait]
impl ReloadHandler for Session {
    async fn reload(&self, event: SessionEvent) -> Result<()> {
        tracing::debug!(?event, "Reloading session from storage");
        self.hydrate()
    }
}
