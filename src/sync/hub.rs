//! In-process broadcast channels shared by several contexts

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

use super::{EventStream, SessionEvent, SessionEventBus};
use crate::error::{ApiError, Result};

const CHANNEL_CAPACITY: usize = 64;

/// Identity of one context attached to a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextId(u64);

impl std::fmt::Display for ContextId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ctx-{}", self.0)
    }
}

/// Message on the wire: serialized event plus the sender's identity
#[derive(Debug, Clone)]
struct Envelope {
    origin: ContextId,
    payload: String,
}

/// Registry of named channels. Every [`channel`](Self::channel) call
/// attaches a new context to the named channel.
#[derive(Debug, Clone, Default)]
pub struct BroadcastHub {
    channels: Arc<Mutex<HashMap<String, broadcast::Sender<Envelope>>>>,
    next_id: Arc<AtomicU64>,
}

impl BroadcastHub {
    /// Create an empty hub
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a new context to the channel called `name`
    #[must_use]
    pub fn channel(&self, name: &str) -> ChannelBus {
        let sender = {
            let mut channels = self
                .channels
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            channels
                .entry(name.to_string())
                .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
                .clone()
        };

        let context_id = ContextId(self.next_id.fetch_add(1, Ordering::Relaxed));
        tracing::debug!(channel = name, context = %context_id, "Attached to session channel");

        ChannelBus {
            name: name.to_string(),
            context_id,
            sender,
        }
    }
}

/// One context's handle on a named channel
#[derive(Debug, Clone)]
pub struct ChannelBus {
    name: String,
    context_id: ContextId,
    sender: broadcast::Sender<Envelope>,
}

impl ChannelBus {
    /// Channel name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// This context's identity
    #[must_use]
    pub fn context_id(&self) -> ContextId {
        self.context_id
    }
}

impl SessionEventBus for ChannelBus {
    fn publish(&self, event: SessionEvent) -> Result<()> {
        let payload = serde_json::to_string(&event)
            .map_err(|e| ApiError::bus(format!("Failed to encode session event: {e}")))?;

        let envelope = Envelope {
            origin: self.context_id,
            payload,
        };

        match self.sender.send(envelope) {
            Ok(receivers) => {
                tracing::debug!(channel = %self.name, ?event, receivers, "Published session event");
            }
            Err(_) => {
                tracing::trace!(channel = %self.name, ?event, "No listeners for session event");
            }
        }
        Ok(())
    }

    fn subscribe(&self) -> EventStream {
        let mut receiver = self.sender.subscribe();
        let own_id = self.context_id;
        let channel = self.name.clone();

        Box::pin(async_stream::stream! {
            loop {
                match receiver.recv().await {
                    Ok(envelope) if envelope.origin == own_id => {}
                    Ok(envelope) => match serde_json::from_str::<SessionEvent>(&envelope.payload) {
                        Ok(event) => {
                            yield event;
                        }
                        Err(e) => {
                            tracing::warn!(channel = %channel, error = %e, "Ignoring malformed session event");
                        }
                    },
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(channel = %channel, skipped, "Session event listener lagged");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }
}
