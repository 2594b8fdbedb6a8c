//! The host: the application-facing sink that receives routed events.
//!
//! A host is anything implementing [`Host`]. The router only ever talks to a
//! host through [`Host::emit`] and treats a host whose channel is gone
//! exactly like no host at all. [`ChannelHost`] is the stock implementation,
//! backed by a bounded `tokio` channel.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// Why an emission did not reach the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum EmitError {
    /// The host's queue is full.
    #[error("host channel full")]
    Full,
    /// The host's communication channel is torn down.
    #[error("host channel closed")]
    Closed,
}

/// Application-facing event sink.
///
/// `emit` is called while the router holds its lock: it must return quickly
/// and must not call back into the router.
pub trait Host: Send + Sync {
    /// Stable identifier of this host instance.
    fn id(&self) -> &str;

    /// Whether the host's communication channel is still usable.
    fn is_channel_alive(&self) -> bool;

    /// Deliver one event.
    fn emit(&self, event: &str, payload: Value, retain_until_consumed: bool) -> Result<(), EmitError>;
}

/// Shared handle to an attached host.
pub type HostRef = Arc<dyn Host>;

/// One event as seen by a [`ChannelHost`] consumer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostEnvelope {
    /// Public event name.
    pub event: String,
    /// Event payload.
    pub payload: Value,
    /// Whether the consumer should keep the event until a listener reads it.
    pub retain_until_consumed: bool,
}

/// Host backed by a bounded mpsc channel.
pub struct ChannelHost {
    id: String,
    tx: mpsc::Sender<HostEnvelope>,
    dropped: AtomicU64,
}

impl ChannelHost {
    /// Create a host and the receiving half of its channel.
    ///
    /// A zero capacity is raised to one.
    pub fn new(id: impl Into<String>, capacity: usize) -> (Arc<Self>, mpsc::Receiver<HostEnvelope>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let host = Arc::new(Self {
            id: id.into(),
            tx,
            dropped: AtomicU64::new(0),
        });
        (host, rx)
    }

    /// Events this host failed to accept.
    pub fn drop_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for ChannelHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelHost")
            .field("id", &self.id)
            .field("alive", &!self.tx.is_closed())
            .field("dropped", &self.drop_count())
            .finish()
    }
}

impl Host for ChannelHost {
    fn id(&self) -> &str {
        &self.id
    }

    fn is_channel_alive(&self) -> bool {
        !self.tx.is_closed()
    }

    fn emit(&self, event: &str, payload: Value, retain_until_consumed: bool) -> Result<(), EmitError> {
        let envelope = HostEnvelope {
            event: event.to_owned(),
            payload,
            retain_until_consumed,
        };
        self.tx.try_send(envelope).map_err(|e| {
            let _ = self.dropped.fetch_add(1, Ordering::Relaxed);
            match e {
                TrySendError::Full(_) => EmitError::Full,
                TrySendError::Closed(_) => EmitError::Closed,
            }
        })
    }
}
