//! Delivery decisions: deliver now, buffer, or drop.
//!
//! All router state (the [`HostRegistry`] and the [`PendingLifecycleSlot`])
//! sits behind one mutex. The host check, the deliver-or-buffer branch and
//! the emission itself all happen under that lock, so a lifecycle message
//! racing a host attach takes exactly one path (direct delivery or
//! buffer-then-flush) and events reach the host in decision order.

use metrics::counter;
use parking_lot::{Mutex, MutexGuard};
use thiserror::Error;
use tracing::{debug, info, warn};

use pushbridge_core::BridgeError;
use pushbridge_core::events::{LifecycleEvent, RoutedEvent, TapEvent};
use pushbridge_core::message::InboundMessage;
use pushbridge_settings::HostSettings;

use crate::host::EmitError;
use crate::metrics::{
    EVENTS_DROPPED_TOTAL, EVENTS_EMITTED_TOTAL, HOST_EMIT_FAILURES_TOTAL, LIFECYCLE_BUFFERED_TOTAL,
    LIFECYCLE_FLUSHED_TOTAL, LIFECYCLE_SUPERSEDED_TOTAL,
};
use crate::registry::HostRegistry;
use crate::slot::PendingLifecycleSlot;

/// Why an event reached a host but was not accepted.
#[derive(Debug, Error)]
pub enum RouteError {
    /// The host rejected the emission.
    #[error(transparent)]
    Emit(#[from] EmitError),
    /// The payload could not be built.
    #[error(transparent)]
    Payload(#[from] BridgeError),
}

/// Why an event was discarded without reaching a host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// No live host attached.
    NoHost,
}

impl DropReason {
    /// Metric/log label.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NoHost => "no_host",
        }
    }
}

/// Outcome of one routing decision.
#[derive(Debug)]
pub enum Delivery {
    /// Emitted to the attached host.
    Delivered,
    /// Stored in the pending lifecycle slot.
    Buffered {
        /// ID of the buffered message this one replaced, if any.
        superseded: Option<String>,
    },
    /// Discarded.
    Dropped(DropReason),
    /// Handed to the host, which failed to accept it.
    Failed(RouteError),
}

impl Delivery {
    /// Whether the event was accepted by a host.
    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered)
    }

    /// Whether the event went into the pending slot.
    pub fn is_buffered(&self) -> bool {
        matches!(self, Self::Buffered { .. })
    }
}

/// Router state guarded by [`EventRouter`]'s lock.
#[derive(Debug, Default)]
pub struct RouterState {
    /// Attached host.
    pub registry: HostRegistry,
    /// Latest undelivered lifecycle message.
    pub pending: PendingLifecycleSlot,
}

/// The dispatch core.
#[derive(Debug)]
pub struct EventRouter {
    state: Mutex<RouterState>,
    retain_until_consumed: bool,
}

impl EventRouter {
    /// Router whose emissions carry the given retain flag.
    pub fn new(retain_until_consumed: bool) -> Self {
        Self {
            state: Mutex::new(RouterState::default()),
            retain_until_consumed,
        }
    }

    /// Router configured from host settings.
    pub fn from_settings(settings: &HostSettings) -> Self {
        Self::new(settings.retain_until_consumed)
    }

    /// Emit a data message to the attached host, or drop it.
    ///
    /// Data messages are never buffered: a stale data ping replayed on a
    /// later attach would be wrong.
    pub fn deliver_data(&self, msg: &InboundMessage) -> Delivery {
        let state = self.state.lock();
        self.emit_locked(&state, &RoutedEvent::data(msg))
    }

    /// Emit a lifecycle message, or buffer it when no host is attached.
    ///
    /// A host whose channel turns out to be closed at emit time counts as
    /// no host: the message goes to the slot.
    pub fn deliver_lifecycle(&self, msg: &InboundMessage) -> Delivery {
        let event = LifecycleEvent::from_message(msg);
        let mut state = self.state.lock();
        if state.registry.current().is_none() {
            return Self::buffer_locked(&mut state, event);
        }

        match self.emit_locked(&state, &RoutedEvent::Lifecycle(event.clone())) {
            Delivery::Failed(RouteError::Emit(EmitError::Closed)) => {
                debug!(message_id = %event.id, "host channel closed during emit, buffering");
                Self::buffer_locked(&mut state, event)
            }
            outcome => outcome,
        }
    }

    /// Emit a registration token. Lost if no host is attached.
    pub fn deliver_token(&self, token: &str) -> Delivery {
        let state = self.state.lock();
        self.emit_locked(&state, &RoutedEvent::token(token))
    }

    /// Emit a registration failure. Lost if no host is attached.
    pub fn deliver_token_error(&self, error: &str) -> Delivery {
        let state = self.state.lock();
        self.emit_locked(&state, &RoutedEvent::token_error(error))
    }

    /// Emit a notification-tap event. Never buffered.
    pub fn deliver_tap(&self, tap: TapEvent) -> Delivery {
        let state = self.state.lock();
        self.emit_locked(&state, &RoutedEvent::Tap(tap))
    }

    /// ID of the buffered lifecycle message, if any.
    pub fn pending_message_id(&self) -> Option<String> {
        self.state.lock().pending.peek().map(|e| e.id.clone())
    }

    /// ID of the recorded host, live or not.
    pub fn attached_host_id(&self) -> Option<String> {
        self.state.lock().registry.attached_id().map(str::to_owned)
    }

    /// Whether a live host is attached.
    pub fn has_host(&self) -> bool {
        self.state.lock().registry.current().is_some()
    }

    /// Take the router lock. Used by the lifecycle hook so that recording a
    /// host and flushing the slot happen in one critical section.
    pub(crate) fn lock(&self) -> MutexGuard<'_, RouterState> {
        self.state.lock()
    }

    /// Deliver the buffered lifecycle message to the attached host.
    ///
    /// Returns `None` when nothing was flushed: the slot is empty, or no live
    /// host is attached (the message then stays buffered). Once taken, the
    /// slot stays cleared even if the host fails to accept the event.
    pub(crate) fn flush_pending(&self, state: &mut RouterState) -> Option<Delivery> {
        if !state.pending.is_occupied() {
            return None;
        }
        if state.registry.current().is_none() {
            debug!("flush skipped, attached host channel is not alive");
            return None;
        }
        let event = state.pending.take()?;
        info!(message_id = %event.id, "flushing buffered lifecycle message");
        counter!(LIFECYCLE_FLUSHED_TOTAL).increment(1);
        Some(self.emit_locked(state, &RoutedEvent::Lifecycle(event)))
    }

    fn buffer_locked(state: &mut RouterState, event: LifecycleEvent) -> Delivery {
        let id = event.id.clone();
        let superseded = state.pending.store(event).map(|old| old.id);
        counter!(LIFECYCLE_BUFFERED_TOTAL).increment(1);
        if let Some(ref old) = superseded {
            counter!(LIFECYCLE_SUPERSEDED_TOTAL).increment(1);
            debug!(message_id = %id, superseded = %old, "buffered lifecycle message replaced older one");
        } else {
            debug!(message_id = %id, "no host attached, buffered lifecycle message");
        }
        Delivery::Buffered { superseded }
    }

    fn emit_locked(&self, state: &RouterState, event: &RoutedEvent) -> Delivery {
        let name = event.name();
        let message_id = event.message_id().unwrap_or("-");

        let Some(host) = state.registry.current() else {
            let reason = DropReason::NoHost;
            counter!(EVENTS_DROPPED_TOTAL, "event" => name, "reason" => reason.as_str()).increment(1);
            debug!(event = name, message_id, reason = reason.as_str(), "dropping event");
            return Delivery::Dropped(reason);
        };

        let payload = match event.payload() {
            Ok(p) => p,
            Err(e) => {
                warn!(event = name, message_id, error = %e, "failed to build event payload");
                return Delivery::Failed(e.into());
            }
        };

        match host.emit(name, payload, self.retain_until_consumed) {
            Ok(()) => {
                counter!(EVENTS_EMITTED_TOTAL, "event" => name).increment(1);
                debug!(event = name, message_id, host_id = host.id(), "event emitted");
                Delivery::Delivered
            }
            Err(e) => {
                counter!(HOST_EMIT_FAILURES_TOTAL, "event" => name).increment(1);
                warn!(event = name, message_id, host_id = host.id(), error = %e, "host rejected event");
                Delivery::Failed(e.into())
            }
        }
    }
}

impl Default for EventRouter {
    fn default() -> Self {
        Self::new(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{ChannelHost, Host, HostEnvelope, HostRef};
    use crate::metrics::{counter_total, record_locally};
    use assert_matches::assert_matches;
    use pushbridge_core::logging::capture_logs;
    use pushbridge_core::message::RawMessage;
    use std::sync::Arc;
    use tokio::sync::mpsc;
    use tracing::Level;

    fn msg(json: &str) -> InboundMessage {
        RawMessage::from_json(json).unwrap().into()
    }

    fn lifecycle(id: &str) -> InboundMessage {
        msg(&format!(r#"{{"messageId":"{id}","notification":{{"title":"T","body":"B"}}}}"#))
    }

    fn attach(router: &EventRouter, id: &str) -> mpsc::Receiver<HostEnvelope> {
        let (host, rx) = ChannelHost::new(id, 16);
        let host: HostRef = host;
        let mut state = router.lock();
        let _ = state.registry.attach(host);
        rx
    }

    #[test]
    fn data_without_host_is_dropped() {
        let router = EventRouter::default();
        let out = router.deliver_data(&msg(r#"{"messageId":"m","data":{"k":"v"}}"#));
        assert_matches!(out, Delivery::Dropped(DropReason::NoHost));
        assert!(router.pending_message_id().is_none());
    }

    #[test]
    fn data_with_host_is_emitted() {
        let router = EventRouter::default();
        let mut rx = attach(&router, "h");
        let out = router.deliver_data(&msg(r#"{"messageId":"m","data":{"k":"v"}}"#));
        assert!(out.is_delivered());
        let env = rx.try_recv().unwrap();
        assert_eq!(env.event, "dataMessage");
        assert_eq!(env.payload["data"]["k"], "v");
        assert!(env.retain_until_consumed);
    }

    #[test]
    fn lifecycle_without_host_is_buffered() {
        let router = EventRouter::default();
        let out = router.deliver_lifecycle(&lifecycle("m1"));
        assert_matches!(out, Delivery::Buffered { superseded: None });
        assert_eq!(router.pending_message_id().as_deref(), Some("m1"));
    }

    #[test]
    fn lifecycle_buffer_is_latest_wins() {
        let router = EventRouter::default();
        let _ = router.deliver_lifecycle(&lifecycle("m1"));
        let out = router.deliver_lifecycle(&lifecycle("m2"));
        assert_matches!(out, Delivery::Buffered { superseded: Some(ref s) } if s == "m1");
        assert_eq!(router.pending_message_id().as_deref(), Some("m2"));
    }

    #[test]
    fn lifecycle_with_host_skips_slot() {
        let router = EventRouter::default();
        let mut rx = attach(&router, "h");
        assert!(router.deliver_lifecycle(&lifecycle("m1")).is_delivered());
        assert!(router.pending_message_id().is_none());
        assert_eq!(rx.try_recv().unwrap().event, "pushNotificationReceived");
    }

    #[test]
    fn lifecycle_with_dead_host_is_buffered() {
        let router = EventRouter::default();
        let rx = attach(&router, "h");
        drop(rx);
        assert!(!router.has_host());
        assert!(router.deliver_lifecycle(&lifecycle("m1")).is_buffered());
    }

    #[test]
    fn lifecycle_emit_failure_does_not_buffer() {
        let router = EventRouter::default();
        let (host, _rx) = ChannelHost::new("full", 1);
        host.emit("filler", serde_json::Value::Null, true).unwrap();
        let host: HostRef = host;
        let _ = router.lock().registry.attach(host);

        let out = router.deliver_lifecycle(&lifecycle("m1"));
        assert_matches!(out, Delivery::Failed(RouteError::Emit(EmitError::Full)));
        assert!(router.pending_message_id().is_none());
    }

    #[test]
    fn token_events_not_buffered() {
        let router = EventRouter::default();
        assert_matches!(router.deliver_token("t"), Delivery::Dropped(_));
        assert_matches!(router.deliver_token_error("e"), Delivery::Dropped(_));
        let mut rx = attach(&router, "h");
        assert!(rx.try_recv().is_err());
        assert!(router.deliver_token("t").is_delivered());
        assert_eq!(rx.try_recv().unwrap().payload["value"], "t");
    }

    #[test]
    fn flush_delivers_once_and_clears() {
        let router = EventRouter::default();
        let _ = router.deliver_lifecycle(&lifecycle("m1"));
        let mut rx = attach(&router, "h");

        let mut state = router.lock();
        assert!(router.flush_pending(&mut state).unwrap().is_delivered());
        assert!(router.flush_pending(&mut state).is_none());
        drop(state);

        assert_eq!(rx.try_recv().unwrap().payload["id"], "m1");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn flush_clears_slot_even_when_emit_fails() {
        let router = EventRouter::default();
        let _ = router.deliver_lifecycle(&lifecycle("poison"));
        let (host, _rx) = ChannelHost::new("full", 1);
        host.emit("filler", serde_json::Value::Null, true).unwrap();
        let host: HostRef = host;

        let mut state = router.lock();
        let _ = state.registry.attach(host);
        assert_matches!(router.flush_pending(&mut state), Some(Delivery::Failed(_)));
        assert!(!state.pending.is_occupied());
    }

    #[test]
    fn flush_keeps_slot_without_live_host() {
        let router = EventRouter::default();
        let _ = router.deliver_lifecycle(&lifecycle("m1"));
        let rx = attach(&router, "h");
        drop(rx);

        let mut state = router.lock();
        assert!(router.flush_pending(&mut state).is_none());
        assert!(state.pending.is_occupied());
    }

    #[test]
    fn retain_flag_follows_settings() {
        let settings = HostSettings {
            channel_capacity: 4,
            retain_until_consumed: false,
        };
        let router = EventRouter::from_settings(&settings);
        let mut rx = attach(&router, "h");
        let _ = router.deliver_token("t");
        assert!(!rx.try_recv().unwrap().retain_until_consumed);
    }

    #[test]
    fn drop_is_logged_with_reason() {
        let (logs, _guard) = capture_logs();
        let router = Arc::new(EventRouter::default());
        let _ = router.deliver_data(&msg(r#"{"messageId":"m7","data":{"k":"v"}}"#));

        let drops = logs.matching("dropping event");
        assert_eq!(drops.len(), 1);
        assert_eq!(drops[0].level, Level::DEBUG);
        assert_eq!(drops[0].field("reason"), Some("no_host"));
        assert_eq!(drops[0].field("message_id"), Some("m7"));
    }

    /// Reports a live channel until the first emit, which finds it closed.
    struct ClosingHost;

    impl Host for ClosingHost {
        fn id(&self) -> &str {
            "closing"
        }

        fn is_channel_alive(&self) -> bool {
            true
        }

        fn emit(&self, _event: &str, _payload: serde_json::Value, _retain: bool) -> Result<(), EmitError> {
            Err(EmitError::Closed)
        }
    }

    #[test]
    fn lifecycle_closed_at_emit_is_buffered() {
        let router = EventRouter::default();
        let host: HostRef = Arc::new(ClosingHost);
        let _ = router.lock().registry.attach(host);

        let out = router.deliver_lifecycle(&lifecycle("m1"));
        assert_matches!(out, Delivery::Buffered { superseded: None });
        assert_eq!(router.pending_message_id().as_deref(), Some("m1"));

        let mut rx = attach(&router, "fresh");
        let mut state = router.lock();
        assert!(router.flush_pending(&mut state).unwrap().is_delivered());
        drop(state);
        assert_eq!(rx.try_recv().unwrap().payload["id"], "m1");
    }

    #[test]
    fn lifecycle_closed_at_emit_keeps_latest_wins() {
        let router = EventRouter::default();
        let _ = router.deliver_lifecycle(&lifecycle("older"));
        let host: HostRef = Arc::new(ClosingHost);
        let _ = router.lock().registry.attach(host);

        let out = router.deliver_lifecycle(&lifecycle("newer"));
        assert_matches!(out, Delivery::Buffered { superseded: Some(ref s) } if s == "older");
        assert_eq!(router.pending_message_id().as_deref(), Some("newer"));
    }

    #[test]
    fn data_closed_at_emit_is_not_buffered() {
        let router = EventRouter::default();
        let host: HostRef = Arc::new(ClosingHost);
        let _ = router.lock().registry.attach(host);

        let out = router.deliver_data(&msg(r#"{"messageId":"m","data":{"k":"v"}}"#));
        assert_matches!(out, Delivery::Failed(RouteError::Emit(EmitError::Closed)));
        assert!(router.pending_message_id().is_none());
    }

    #[test]
    fn drops_are_counted_by_reason() {
        let router = EventRouter::default();
        let (_, rendered) = record_locally(|| {
            let _ = router.deliver_data(&msg(r#"{"messageId":"m","data":{"k":"v"}}"#));
            let _ = router.deliver_token("t");
        });
        assert_eq!(counter_total(&rendered, EVENTS_DROPPED_TOTAL), 2);
        assert!(rendered.contains(r#"reason="no_host""#));
        assert_eq!(counter_total(&rendered, EVENTS_EMITTED_TOTAL), 0);
    }

    #[test]
    fn buffering_and_flush_are_counted() {
        let router = EventRouter::default();
        let (_, rendered) = record_locally(|| {
            let _ = router.deliver_lifecycle(&lifecycle("m1"));
            let _ = router.deliver_lifecycle(&lifecycle("m2"));
            let _rx = attach(&router, "h");
            let mut state = router.lock();
            let _ = router.flush_pending(&mut state);
        });
        assert_eq!(counter_total(&rendered, LIFECYCLE_BUFFERED_TOTAL), 2);
        assert_eq!(counter_total(&rendered, LIFECYCLE_SUPERSEDED_TOTAL), 1);
        assert_eq!(counter_total(&rendered, LIFECYCLE_FLUSHED_TOTAL), 1);
        assert_eq!(counter_total(&rendered, EVENTS_EMITTED_TOTAL), 1);
    }

    #[test]
    fn emit_failures_are_counted() {
        let router = EventRouter::default();
        let host: HostRef = Arc::new(ClosingHost);
        let _ = router.lock().registry.attach(host);
        let (_, rendered) = record_locally(|| router.deliver_token("t"));
        assert_eq!(counter_total(&rendered, HOST_EMIT_FAILURES_TOTAL), 1);
    }
}
