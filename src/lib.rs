//! # Session API Client
//!
//! Authenticated client for a content-subscription API.
//! Async/await, strong typing, tokio-based.
//!
//! The client attaches the current bearer token to every request, recovers
//! from an expired access token with a single refresh-and-retry, and keeps
//! several contexts (tabs, windows, processes) sharing one persisted session
//! consistent.
//!
//! ## Quick Start
//!
//! ```no_run
//! use session_api_client::{ApiClient, ClientConfig};
//! use session_api_client::api::auth::Credentials;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = ApiClient::create(
//!         ClientConfig::builder()
//!             .base_url("https://api.example.com")
//!             .build(),
//!     )?;
//!
//!     // Restore tokens from the last run
//!     client.hydrate()?;
//!
//!     if !client.is_authenticated() {
//!         client
//!             .auth()
//!             .login(&Credentials::new("me@example.com", "secret"))
//!             .await?;
//!     }
//!
//!     let item = client.content().get("42").await?;
//!     println!("{}", item.title);
//!
//!     client.dispose().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Token refresh
//!
//! A request answered with 401 while a refresh token is held triggers one
//! `POST /auth/refresh-token`; the new access token is installed and the
//! request re-issued once. A 403, a second 401, or a failed refresh tears the
//! session down: the server is told (best effort), tokens and profile are
//! cleared from memory and storage, and other contexts are notified. The
//! caller receives the original HTTP error either way.
//!
//! By default concurrent refreshes are coalesced
//! ([`RefreshMode::SingleFlight`]); [`RefreshMode::PerRequest`] gives every
//! failing request its own exchange.
//!
//! ## Multiple contexts
//!
//! ```no_run
//! use session_api_client::{ApiClient, ClientConfig};
//! use session_api_client::session::MemorySessionStore;
//! use session_api_client::sync::BroadcastHub;
//! use std::sync::Arc;
//!
//! # fn example() -> session_api_client::Result<()> {
//! let hub = BroadcastHub::new();
//! let storage = MemorySessionStore::new();
//! let config = ClientConfig::builder().base_url("https://api.example.com").build();
//!
//! let tab = |hub: &BroadcastHub| {
//!     ApiClient::builder(config.clone())
//!         .store(Arc::new(storage.clone()))
//!         .hub(hub)
//!         .build()
//! };
//! let tab_a = tab(&hub)?;
//! let tab_b = tab(&hub)?;
//! tab_a.hydrate()?;
//! tab_b.hydrate()?;
//! // A logout in tab_a makes tab_b reload its session from storage.
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`transport`]: request/response descriptors and the HTTP transport
//! - [`session`]: token pair, profile and durable storage
//! - [`interceptor`]: refresh-and-retry policy
//! - [`sync`]: cross-context session events
//! - [`api`]: typed endpoint builders
//! - [`client`]: [`ApiClient`] tying them together
//! - [`config`]: [`ClientConfig`]
//! - [`error`]: error types and classification
//!
//! ## Logging
//!
//! This crate uses [`tracing`](https://crates.io/crates/tracing) for structured logging.
//! Token values are never logged. To see logs, attach a subscriber:
//!
//! ```rust,ignore
//! tracing_subscriber::fmt::init();
//! ```
//!
//! ## Error Handling
//!
//! All fallible operations return [`Result<T, ApiError>`](Result):
//!
//! ```no_run
//! # use session_api_client::{ApiClient, ApiError, ErrorKind};
//! # async fn example(client: &ApiClient) {
//! match client.content().get("42").await {
//!     Ok(item) => println!("{}", item.title),
//!     Err(e) if e.kind() == ErrorKind::AuthInvalid => {
//!         eprintln!("Session ended, please log in again");
//!     }
//!     Err(ApiError::Network(msg)) => eprintln!("Offline: {msg}"),
//!     Err(e) => eprintln!("Error: {e}"),
//! }
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod api;
pub mod client;
pub mod config;
pub mod error;
pub mod interceptor;
pub mod session;
pub mod sync;
pub mod transport;

// Re-export commonly used types
pub use client::{ApiClient, ApiClientBuilder};
pub use config::ClientConfig;
pub use error::{ApiError, ErrorKind, Result};
pub use interceptor::{RefreshInterceptor, RefreshMode, RetryDecision, decide};
pub use session::{
    FileSessionStore, MemorySessionStore, Profile, Session, SessionData, SessionStore, TokenPair,
};
pub use sync::{
    BroadcastHub, ChannelBus, CrossTabSync, NoopBus, ReloadHandler, SessionEvent, SessionEventBus,
};
pub use transport::{ApiRequest, ApiResponse, HttpTransport, Method, Transport};

/// Version of the client
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
