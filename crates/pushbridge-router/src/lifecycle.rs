//! Host attach/detach and activation handling.
//!
//! Attaching records the host and flushes the pending lifecycle slot inside
//! one router critical section, so no lifecycle message can slip between
//! "host recorded" and "slot flushed".

use std::sync::Arc;

use metrics::counter;
use tracing::{debug, info};

use pushbridge_core::message::ActivationIntent;

use crate::host::HostRef;
use crate::metrics::HOST_ATTACH_TOTAL;
use crate::router::{Delivery, EventRouter};

/// What happened on attach.
#[derive(Debug)]
pub struct AttachReport {
    /// ID of the host this attach replaced.
    pub superseded: Option<String>,
    /// Outcome of the flush, if a buffered message was flushed.
    pub flushed: Option<Delivery>,
}

/// Reacts to host lifecycle transitions.
#[derive(Debug, Clone)]
pub struct HostLifecycleHook {
    router: Arc<EventRouter>,
}

impl HostLifecycleHook {
    /// Hook driving the given router.
    pub fn new(router: Arc<EventRouter>) -> Self {
        Self { router }
    }

    /// Record `host` as attached and flush any buffered lifecycle message to it.
    ///
    /// Attaching again (same or different host) with an empty slot emits
    /// nothing.
    pub fn attach(&self, host: HostRef) -> AttachReport {
        let host_id = host.id().to_owned();
        let mut state = self.router.lock();
        let superseded = state.registry.attach(host).map(|h| h.id().to_owned());
        let flushed = self.router.flush_pending(&mut state);
        drop(state);

        counter!(HOST_ATTACH_TOTAL).increment(1);
        info!(
            host_id = %host_id,
            superseded = ?superseded,
            flushed = flushed.is_some(),
            "host attached"
        );
        AttachReport { superseded, flushed }
    }

    /// Detach whatever host is attached. Returns its ID.
    pub fn detach(&self) -> Option<String> {
        let detached = self.router.lock().registry.detach().map(|h| h.id().to_owned());
        if let Some(ref id) = detached {
            info!(host_id = %id, "host detached");
        }
        detached
    }

    /// Detach the host identified by `host_id`, if it is still the attached
    /// one. A superseded instance tearing down is ignored.
    pub fn detach_host(&self, host_id: &str) -> bool {
        let detached = self.router.lock().registry.detach_if(host_id).is_some();
        if detached {
            info!(host_id, "host detached");
        } else {
            debug!(host_id, "ignoring detach of host that is no longer attached");
        }
        detached
    }

    /// Handle the host being (re-)activated by an intent.
    ///
    /// If the intent came from a notification tap, emits one
    /// `pushNotificationActionPerformed` event. The intent is not retained:
    /// later activations never replay it.
    pub fn on_activation(&self, intent: &ActivationIntent) -> Option<Delivery> {
        let Some(tap) = intent.tap_event() else {
            debug!("activation without notification message id, ignoring");
            return None;
        };
        debug!(message_id = ?tap.notification.id, "notification tap activation");
        Some(self.router.deliver_tap(tap))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::ChannelHost;
    use assert_matches::assert_matches;
    use pushbridge_core::message::{InboundMessage, RawMessage};
    use serde_json::json;

    fn setup() -> (Arc<EventRouter>, HostLifecycleHook) {
        let router = Arc::new(EventRouter::default());
        let hook = HostLifecycleHook::new(Arc::clone(&router));
        (router, hook)
    }

    fn lifecycle(id: &str) -> InboundMessage {
        RawMessage::from_json(&format!(r#"{{"messageId":"{id}","notification":{{"title":"T"}}}}"#))
            .unwrap()
            .into()
    }

    #[test]
    fn attach_with_empty_slot_emits_nothing() {
        let (_router, hook) = setup();
        let (host, mut rx) = ChannelHost::new("h", 4);
        let report = hook.attach(host);
        assert!(report.flushed.is_none());
        assert!(report.superseded.is_none());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn attach_flushes_buffered_message() {
        let (router, hook) = setup();
        let _ = router.deliver_lifecycle(&lifecycle("m1"));
        let (host, mut rx) = ChannelHost::new("h", 4);
        let report = hook.attach(host);
        assert_matches!(report.flushed, Some(Delivery::Delivered));
        assert_eq!(rx.try_recv().unwrap().payload["id"], "m1");
        assert!(router.pending_message_id().is_none());
    }

    #[test]
    fn reattach_does_not_redeliver() {
        let (router, hook) = setup();
        let _ = router.deliver_lifecycle(&lifecycle("m1"));
        let (host, mut rx) = ChannelHost::new("h", 4);
        let _ = hook.attach(host.clone());
        let report = hook.attach(host);
        assert_eq!(report.superseded.as_deref(), Some("h"));
        assert!(report.flushed.is_none());
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn replaced_host_stops_receiving() {
        let (router, hook) = setup();
        let (old, mut old_rx) = ChannelHost::new("old", 4);
        let (new, mut new_rx) = ChannelHost::new("new", 4);
        let _ = hook.attach(old);
        let _ = hook.attach(new);
        let _ = router.deliver_token("t");
        assert!(old_rx.try_recv().is_err());
        assert_eq!(new_rx.try_recv().unwrap().event, "registration");
    }

    #[test]
    fn stale_detach_keeps_new_host() {
        let (router, hook) = setup();
        let (old, _old_rx) = ChannelHost::new("old", 4);
        let (new, _new_rx) = ChannelHost::new("new", 4);
        let _ = hook.attach(old);
        let _ = hook.attach(new);
        assert!(!hook.detach_host("old"));
        assert_eq!(router.attached_host_id().as_deref(), Some("new"));
        assert!(hook.detach_host("new"));
        assert!(!router.has_host());
    }

    #[test]
    fn detach_then_lifecycle_buffers_again() {
        let (router, hook) = setup();
        let (host, _rx) = ChannelHost::new("h", 4);
        let _ = hook.attach(host);
        assert_eq!(hook.detach().as_deref(), Some("h"));
        assert!(hook.detach().is_none());
        assert!(router.deliver_lifecycle(&lifecycle("m2")).is_buffered());
    }

    #[test]
    fn tap_activation_emits_action_performed() {
        let (_router, hook) = setup();
        let (host, mut rx) = ChannelHost::new("h", 4);
        let _ = hook.attach(host);

        let intent = ActivationIntent::from_value(json!({"google.message_id": "m3", "foo": "bar"})).unwrap();
        assert_matches!(hook.on_activation(&intent), Some(Delivery::Delivered));

        let env = rx.try_recv().unwrap();
        assert_eq!(env.event, "pushNotificationActionPerformed");
        assert_eq!(
            env.payload,
            json!({"actionId": "tap", "notification": {"id": "m3", "data": {"foo": "bar"}}})
        );
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn plain_activation_emits_nothing() {
        let (_router, hook) = setup();
        let (host, mut rx) = ChannelHost::new("h", 4);
        let _ = hook.attach(host);
        let intent = ActivationIntent::from_value(json!({"foo": "bar"})).unwrap();
        assert!(hook.on_activation(&intent).is_none());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn tap_is_not_replayed_on_next_attach() {
        let (_router, hook) = setup();
        let intent = ActivationIntent::from_value(json!({"google.message_id": "m3"})).unwrap();
        assert_matches!(hook.on_activation(&intent), Some(Delivery::Dropped(_)));

        let (host, mut rx) = ChannelHost::new("h", 4);
        let _ = hook.attach(host);
        assert!(rx.try_recv().is_err());
    }
}
