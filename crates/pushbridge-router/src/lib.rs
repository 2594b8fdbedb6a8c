//! # pushbridge-router
//!
//! Routes platform push events to the application host, buffering the latest
//! lifecycle notification while no host is attached.
//!
//! ## Components
//!
//! | Module | Purpose |
//! |--------|---------|
//! | `receiver` | Transport entry point; classifies messages, never fails back |
//! | `router` | Deliver / buffer / drop decisions under one lock |
//! | `registry` | Which host is attached, and whether its channel is alive |
//! | `slot` | Latest-wins buffer for one lifecycle notification |
//! | `lifecycle` | Host attach (with flush), detach, tap activation |
//! | `registration` | Token fetch with exactly one outcome event |
//! | `host` | `Host` trait and the channel-backed host |
//!
//! ## Data Flow
//!
//! transport → `receiver` → `router` → host, or → `slot`;
//! host attach → `lifecycle` → `router` flush → host.

#![deny(unsafe_code)]

pub mod host;
pub mod lifecycle;
pub mod metrics;
pub mod receiver;
pub mod registration;
pub mod registry;
pub mod router;
pub mod slot;

use std::sync::Arc;

use pushbridge_settings::BridgeSettings;

pub use host::{ChannelHost, EmitError, Host, HostEnvelope, HostRef};
pub use lifecycle::{AttachReport, HostLifecycleHook};
pub use receiver::{MessageReceiver, ReceiveReport};
pub use registration::{Registrar, TokenProvider};
pub use router::{Delivery, DropReason, EventRouter, RouteError};

/// One router with its transport- and host-facing endpoints.
#[derive(Debug, Clone)]
pub struct PushBridge {
    router: Arc<EventRouter>,
    receiver: MessageReceiver,
    lifecycle: HostLifecycleHook,
}

impl PushBridge {
    /// Wire a bridge from settings.
    pub fn new(settings: &BridgeSettings) -> Self {
        Self::with_router(Arc::new(EventRouter::from_settings(&settings.host)))
    }

    /// Wire a bridge around an existing router.
    pub fn with_router(router: Arc<EventRouter>) -> Self {
        Self {
            receiver: MessageReceiver::new(Arc::clone(&router)),
            lifecycle: HostLifecycleHook::new(Arc::clone(&router)),
            router,
        }
    }

    /// Transport-facing endpoint.
    pub fn receiver(&self) -> &MessageReceiver {
        &self.receiver
    }

    /// Host-facing lifecycle endpoint.
    pub fn lifecycle(&self) -> &HostLifecycleHook {
        &self.lifecycle
    }

    /// The shared router.
    pub fn router(&self) -> &Arc<EventRouter> {
        &self.router
    }

    /// Registrar for `provider` emitting through this bridge.
    pub fn registrar(&self, provider: Arc<dyn TokenProvider>, settings: &BridgeSettings) -> Registrar {
        Registrar::new(provider, Arc::clone(&self.router), &settings.registration)
    }
}
