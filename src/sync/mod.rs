//! Cross-context session synchronization
//!
//! Several contexts (tabs, windows, processes) can share one persisted
//! session. When one of them logs in or out it publishes a [`SessionEvent`]
//! on a named channel; every *other* context reacts by reloading its state
//! from storage instead of patching it in memory.
//!
//! # Example
//!
//! ```no_run
//! use session_api_client::sync::{BroadcastHub, SessionEvent, SessionEventBus};
//!
//! let hub = BroadcastHub::new();
//! let tab_a = hub.channel("auth");
//! let tab_b = hub.channel("auth");
//!
//! let _events = tab_b.subscribe();
//! tab_a.publish(SessionEvent::Logout).unwrap();
//! ```

mod hub;
mod listener;

pub use hub::{BroadcastHub, ChannelBus, ContextId};
pub use listener::{CrossTabSync, FnReloadHandler, ReloadHandler};

use futures::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;

use crate::error::Result;

/// Session lifecycle event carried on the channel.
///
/// Wire format is `{"type":"login"}` / `{"type":"logout"}`; receivers
/// re-read storage, so no payload travels with it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SessionEvent {
    /// A context established a session
    Login,
    /// A context tore its session down
    Logout,
}

/// Stream of events published by other contexts
pub type EventStream = Pin<Box<dyn Stream<Item = SessionEvent> + Send>>;

/// Publish/subscribe seam for session events
pub trait SessionEventBus: Send + Sync {
    /// Publish an event to every other context. Fire-and-forget: having no
    /// listeners is not an error.
    ///
    /// # Errors
    /// Returns `ApiError::Bus` if the event cannot be put on the wire
    fn publish(&self, event: SessionEvent) -> Result<()>;

    /// Subscribe to events from other contexts. Events published by this
    /// handle are never delivered back to it.
    fn subscribe(&self) -> EventStream;
}

/// Bus for single-context deployments: publishes go nowhere
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopBus;

impl SessionEventBus for NoopBus {
    fn publish(&self, event: SessionEvent) -> Result<()> {
        tracing::trace!(?event, "Dropping session event (no-op bus)");
        Ok(())
    }

    fn subscribe(&self) -> EventStream {
        Box::pin(futures::stream::pending())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_wire_format() {
        assert_eq!(
            serde_json::to_string(&SessionEvent::Login).unwrap(),
            r#"{"type":"login"}"#
        );
        let event: SessionEvent = serde_json::from_str(r#"{"type":"logout"}"#).unwrap();
        assert_eq!(event, SessionEvent::Logout);
        assert!(serde_json::from_str::<SessionEvent>(r#"{"type":"refresh"}"#).is_err());
    }

    #[test]
    fn test_noop_bus_publish() {
        assert!(NoopBus.publish(SessionEvent::Logout).is_ok());
    }
}
