//! `ApiClient`: transport, session, refresh interceptor and cross-context sync
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                          ApiClient                            │
//! │                                                               │
//! │  api::{auth, content, creator}                                │
//! │              │                                                │
//! │              ▼                                                │
//! │  ┌────────────────────┐  refresh / teardown  ┌─────────────┐ │
//! │  │ RefreshInterceptor │─────────────────────▶│   Session   │ │
//! │  └─────────┬──────────┘                      │ (tokens,    │ │
//! │            │ send                            │  profile)   │ │
//! │            ▼                 set_token       └──┬───────┬──┘ │
//! │  ┌────────────────────┐◀──────────────────────┘       │    │
//! │  │     Transport      │               persist │ publish│    │
//! │  └────────────────────┘                       ▼       ▼    │
//! │                                      SessionStore  EventBus │
//! │                                                        │    │
//! │  CrossTabSync ◀── events from other contexts ──────────┘    │
//! │      └── reload: Session::hydrate + optional handler          │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use session_api_client::{ApiClient, ClientConfig};
//! use session_api_client::api::auth::Credentials;
//!
//! # async fn example() -> session_api_client::Result<()> {
//! let config = ClientConfig::builder()
//!     .base_url("https://api.example.com")
//!     .build();
//!
//! let client = ApiClient::create(config)?;
//! client.hydrate()?;
//!
//! if !client.is_authenticated() {
//!     client
//!         .auth()
//!         .login(&Credentials::new("me@example.com", "secret"))
//!         .await?;
//! }
//!
//! let creator = client.creators().get("creator-1").await?;
//! println!("{creator:?}");
//!
//! client.dispose().await;
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::sync::{Arc, Mutex, PoisonError};

use crate::api::{AuthApi, ContentApi, CreatorApi};
use crate::config::ClientConfig;
use crate::error::Result;
use crate::interceptor::RefreshInterceptor;
use crate::session::{FileSessionStore, Session, SessionStore, StorageLifetimes};
use crate::sync::{
    BroadcastHub, CrossTabSync, NoopBus, ReloadHandler, SessionEvent, SessionEventBus,
};
use crate::transport::{ApiRequest, ApiResponse, HttpTransport, Transport};

/// Reload = rehydrate the session, then run the application's handler
struct ReloadChain {
    session: Arc<Session>,
    extra: Option<Arc<dyn ReloadHandler>>,
}

#[async_trait]
impl ReloadHandler for ReloadChain {
    async fn reload(&self, event: SessionEvent) -> Result<()> {
        self.session.reload(event).await?;
        if let Some(ref extra) = self.extra {
            extra.reload(event).await?;
        }
        Ok(())
    }
}

/// Builder for [`ApiClient`]
pub struct ApiClientBuilder {
    config: ClientConfig,
    transport: Option<Arc<dyn Transport>>,
    store: Option<Arc<dyn SessionStore>>,
    bus: Option<Arc<dyn SessionEventBus>>,
    on_reload: Option<Arc<dyn ReloadHandler>>,
}

impl ApiClientBuilder {
    /// Create a new builder
    #[must_use]
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            transport: None,
            store: None,
            bus: None,
            on_reload: None,
        }
    }

    /// Use a custom transport (default: [`HttpTransport`] from the config)
    #[must_use]
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Use custom storage (default: [`FileSessionStore`] at `storage_path`)
    #[must_use]
    pub fn store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Use a session event bus (default: [`NoopBus`])
    #[must_use]
    pub fn bus(mut self, bus: Arc<dyn SessionEventBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Join `hub` on the configured `channel_name`
    #[must_use]
    pub fn hub(mut self, hub: &BroadcastHub) -> Self {
        self.bus = Some(Arc::new(hub.channel(&self.config.channel_name)));
        self
    }

    /// Run `handler` after this context reloaded because of another context
    #[must_use]
    pub fn on_reload(mut self, handler: Arc<dyn ReloadHandler>) -> Self {
        self.on_reload = Some(handler);
        self
    }

    /// Build the client
    ///
    /// # Errors
    ///
    /// Returns `ApiError::InvalidConfig` for an invalid configuration or if
    /// the HTTP client cannot be built.
    pub fn build(self) -> Result<ApiClient> {
        self.config.validate()?;

        let transport: Arc<dyn Transport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(HttpTransport::from_config(&self.config)?),
        };
        let store: Arc<dyn SessionStore> = self
            .store
            .unwrap_or_else(|| Arc::new(FileSessionStore::new(self.config.storage_path.clone())));
        let bus: Arc<dyn SessionEventBus> = self.bus.unwrap_or_else(|| Arc::new(NoopBus));

        let lifetimes = StorageLifetimes {
            access_token: self.config.access_token_ttl,
            refresh_token: self.config.refresh_token_ttl,
        };
        let session = Arc::new(Session::new(
            store,
            transport.clone(),
            bus.clone(),
            lifetimes,
        ));
        let interceptor =
            RefreshInterceptor::new(transport.clone(), session.clone(), self.config.refresh_mode);

        Ok(ApiClient {
            config: self.config,
            transport,
            session,
            interceptor,
            bus,
            on_reload: self.on_reload,
            listener: Mutex::new(None),
        })
    }
}

/// Authenticated API client for one context
pub struct ApiClient {
    config: ClientConfig,
    transport: Arc<dyn Transport>,
    session: Arc<Session>,
    interceptor: RefreshInterceptor,
    bus: Arc<dyn SessionEventBus>,
    on_reload: Option<Arc<dyn ReloadHandler>>,
    listener: Mutex<Option<CrossTabSync>>,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.config.base_url)
            .field("refresh_mode", &self.config.refresh_mode)
            .field("session", &self.session)
            .field("listening", &self.is_listening())
            .finish_non_exhaustive()
    }
}

impl ApiClient {
    /// Create a client with default transport, storage and no cross-context bus
    ///
    /// # Errors
    ///
    /// Returns `ApiError::InvalidConfig` for an invalid configuration.
    pub fn create(config: ClientConfig) -> Result<Self> {
        Self::builder(config).build()
    }

    /// Create a builder for custom transport, storage or bus
    #[must_use]
    pub fn builder(config: ClientConfig) -> ApiClientBuilder {
        ApiClientBuilder::new(config)
    }

    /// Restore the persisted session and start listening for session events
    /// from other contexts. Idempotent; makes no network calls.
    ///
    /// The listener needs a tokio runtime; outside one only the session is
    /// restored.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Storage` if storage cannot be read.
    pub fn hydrate(&self) -> Result<()> {
        self.session.hydrate()?;

        let mut listener = self
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if listener.is_none() {
            if tokio::runtime::Handle::try_current().is_ok() {
                let handler: Arc<dyn ReloadHandler> = Arc::new(ReloadChain {
                    session: self.session.clone(),
                    extra: self.on_reload.clone(),
                });
                *listener = Some(CrossTabSync::start(self.bus.as_ref(), handler));
            } else {
                tracing::warn!("No tokio runtime; cross-context session sync disabled");
            }
        }
        Ok(())
    }

    /// Stop listening for session events. Idempotent. The persisted session
    /// is left untouched.
    pub async fn dispose(&self) {
        let listener = self
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(listener) = listener {
            listener.stop().await;
            tracing::debug!("Client disposed");
        }
    }

    /// Whether the cross-context listener is running
    #[must_use]
    pub fn is_listening(&self) -> bool {
        self.listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(CrossTabSync::is_running)
    }

    /// Send a request through the refresh interceptor
    ///
    /// # Errors
    ///
    /// See [`RefreshInterceptor::execute`].
    pub async fn execute(&self, request: &ApiRequest) -> Result<ApiResponse> {
        self.interceptor.execute(request).await
    }

    /// Send a request through the refresh interceptor and decode the body
    ///
    /// # Errors
    ///
    /// See [`RefreshInterceptor::execute`]; additionally `ApiError::Json`
    /// if the body does not decode.
    pub async fn execute_json<T: DeserializeOwned>(&self, request: &ApiRequest) -> Result<T> {
        self.execute(request).await?.json()
    }

    /// Send a request to a public endpoint, bypassing refresh and teardown.
    /// A 401 here (e.g. wrong password) says nothing about the session.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Network` or `ApiError::Http` unchanged.
    pub async fn execute_public(&self, request: &ApiRequest) -> Result<ApiResponse> {
        self.transport.send(request).await?.error_for_status()
    }

    /// Tear the session down; see [`Session::logout`]
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Storage` if stored values cannot be removed.
    pub async fn logout(&self) -> Result<()> {
        self.session.logout().await
    }

    /// Access token and non-empty profile both present
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.session.is_authenticated()
    }

    /// Session context
    #[must_use]
    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Underlying transport
    #[must_use]
    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Client configuration
    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Authentication endpoints
    #[must_use]
    pub fn auth(&self) -> AuthApi<'_> {
        AuthApi::new(self)
    }

    /// Content endpoints
    #[must_use]
    pub fn content(&self) -> ContentApi<'_> {
        ContentApi::new(self)
    }

    /// Creator endpoints
    #[must_use]
    pub fn creators(&self) -> CreatorApi<'_> {
        CreatorApi::new(self)
    }
}
