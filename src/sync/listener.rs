//! Background listener that reloads a context when another one changes the session

use async_trait::async_trait;
use futures::StreamExt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::{SessionEvent, SessionEventBus};
use crate::error::Result;

/// Reaction to a session change made by another context.
///
/// The expected reaction is a full reload from persisted storage, never an
/// in-memory merge.
#[async_trait]
pub trait ReloadHandler: Send + Sync {
    /// Called once per event received from another context
    async fn reload(&self, event: SessionEvent) -> Result<()>;
}

#[async_trait]
impl<T: ReloadHandler + ?Sized> ReloadHandler for Arc<T> {
    async fn reload(&self, event: SessionEvent) -> Result<()> {
        (**self).reload(event).await
    }
}

/// Wrapper to convert a closure into a [`ReloadHandler`].
///
/// # Example
///
/// ```no_run
/// use session_api_client::sync::{FnReloadHandler, ReloadHandler};
/// use std::sync::Arc;
///
/// let handler = FnReloadHandler::new(|event| {
///     Box::pin(async move {
///         println!("session changed elsewhere: {event:?}");
///         Ok(())
///     })
/// });
///
/// let shared: Arc<dyn ReloadHandler> = Arc::new(handler);
/// ```
pub struct FnReloadHandler<F>
where
    F: Fn(SessionEvent) -> Pin<Box<dyn Future<Output = Result<()>> + Send>> + Send + Sync,
{
    func: F,
}

impl<F> FnReloadHandler<F>
where
    F: Fn(SessionEvent) -> Pin<Box<dyn Future<Output = Result<()>> + Send>> + Send + Sync,
{
    /// Create a new function-based reload handler.
    pub fn new(func: F) -> Self {
        Self { func }
    }
}

#[async_trait]
impl<F> ReloadHandler for FnReloadHandler<F>
where
    F: Fn(SessionEvent) -> Pin<Box<dyn Future<Output = Result<()>> + Send>> + Send + Sync,
{
    async fn reload(&self, event: SessionEvent) -> Result<()> {
        (self.func)(event).await
    }
}

/// Listener task for one context. Stops on [`stop`](Self::stop) or drop.
pub struct CrossTabSync {
    cancellation_token: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for CrossTabSync {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CrossTabSync")
            .field("running", &self.is_running())
            .finish()
    }
}

impl CrossTabSync {
    /// Subscribe to `bus` and spawn the listener task.
    ///
    /// The subscription is taken before this returns, so events published
    /// afterwards are never missed. Must be called inside a tokio runtime.
    pub fn start(bus: &dyn SessionEventBus, handler: Arc<dyn ReloadHandler>) -> Self {
        let mut events = bus.subscribe();
        let cancellation_token = CancellationToken::new();
        let cancelled = cancellation_token.clone();

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = cancelled.cancelled() => {
                        tracing::debug!("Session listener cancelled");
                        break;
                    }
                    next = events.next() => {
                        let Some(event) = next else {
                            tracing::debug!("Session channel closed");
                            break;
                        };
                        tracing::info!(?event, "Session changed in another context, reloading");
                        if let Err(e) = handler.reload(event).await {
                            tracing::warn!(error = %e, ?event, "Reload after session event failed");
                        }
                    }
                }
            }
        });

        Self {
            cancellation_token,
            task: Mutex::new(Some(task)),
        }
    }

    /// Whether the listener has not been stopped
    #[must_use]
    pub fn is_running(&self) -> bool {
        !self.cancellation_token.is_cancelled()
    }

    /// Stop listening and wait for the task to finish. Idempotent.
    pub async fn stop(&self) {
        self.cancellation_token.cancel();
        let task = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                tracing::debug!(error = %e, "Session listener task ended abnormally");
            }
        }
    }
}

impl Drop for CrossTabSync {
    fn drop(&mut self) {
        self.cancellation_token.cancel();
    }
}
