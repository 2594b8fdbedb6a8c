//! Transport-facing entry point.
//!
//! The platform transport calls into [`MessageReceiver`] on its own thread.
//! Nothing here may fail back into the transport: a failure there would
//! trigger redelivery or crash the messaging service. Delivery outcomes are
//! returned for observability only, and a panicking host is contained.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use metrics::counter;
use tracing::{debug, error};

use pushbridge_core::Result;
use pushbridge_core::message::{InboundMessage, RawMessage};
use pushbridge_core::text::redact_token;

use crate::metrics::RECEIVER_PANICS_TOTAL;
use crate::router::{Delivery, EventRouter};

/// How one transport message was routed.
///
/// A message carrying both a data payload and a notification takes both
/// paths independently; a panic on one path leaves the other unaffected
/// and shows up as `None` for that path.
#[derive(Debug, Default)]
pub struct ReceiveReport {
    /// Outcome of the data path, if the message had a non-empty data payload.
    pub data: Option<Delivery>,
    /// Outcome of the lifecycle path, if the message had a notification.
    pub lifecycle: Option<Delivery>,
    /// A host panicked while handling this message.
    pub panicked: bool,
}

/// Passive endpoint invoked by the platform transport.
#[derive(Debug, Clone)]
pub struct MessageReceiver {
    router: Arc<EventRouter>,
}

impl MessageReceiver {
    /// Receiver forwarding to `router`.
    pub fn new(router: Arc<EventRouter>) -> Self {
        Self { router }
    }

    /// Classify and forward one transport message.
    pub fn on_message(&self, raw: RawMessage) -> ReceiveReport {
        let msg = InboundMessage::from(raw);
        debug!(
            message_id = msg.message_id(),
            data_keys = msg.data().len(),
            lifecycle = msg.is_lifecycle(),
            "push message received"
        );

        let mut report = ReceiveReport::default();
        if msg.has_data() {
            report.data = contain(msg.message_id(), || self.router.deliver_data(&msg));
            report.panicked |= report.data.is_none();
        }
        if msg.is_lifecycle() {
            report.lifecycle = contain(msg.message_id(), || self.router.deliver_lifecycle(&msg));
            report.panicked |= report.lifecycle.is_none();
        }
        report
    }

    /// Decode a JSON transport message and forward it.
    ///
    /// Malformed input is rejected to the caller before any routing happens.
    pub fn on_message_json(&self, json: &str) -> Result<ReceiveReport> {
        let raw = RawMessage::from_json(json)?;
        Ok(self.on_message(raw))
    }

    /// Forward a refreshed registration token. Never buffered.
    pub fn on_token_refresh(&self, token: &str) -> Option<Delivery> {
        debug!(token = %redact_token(token), "registration token refreshed");
        contain("-", || self.router.deliver_token(token))
    }

    /// Forward a token error. Never buffered.
    pub fn on_token_error(&self, message: &str) -> Option<Delivery> {
        debug!(error = message, "registration token error");
        contain("-", || self.router.deliver_token_error(message))
    }
}

/// Run `f`, turning a panic into `None`.
fn contain<T>(message_id: &str, f: impl FnOnce() -> T) -> Option<T> {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(v) => Some(v),
        Err(_) => {
            counter!(RECEIVER_PANICS_TOTAL).increment(1);
            error!(message_id, "panic while routing push message, contained");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{ChannelHost, EmitError, Host};
    use crate::lifecycle::HostLifecycleHook;
    use assert_matches::assert_matches;
    use pushbridge_core::BridgeError;
    use serde_json::Value;

    fn setup() -> (Arc<EventRouter>, MessageReceiver, HostLifecycleHook) {
        let router = Arc::new(EventRouter::default());
        (
            Arc::clone(&router),
            MessageReceiver::new(Arc::clone(&router)),
            HostLifecycleHook::new(router),
        )
    }

    #[test]
    fn data_only_message_takes_data_path() {
        let (_router, receiver, hook) = setup();
        let (host, mut rx) = ChannelHost::new("h", 4);
        let _ = hook.attach(host);

        let report = receiver
            .on_message_json(r#"{"messageId":"m2","data":{"k":"v"}}"#)
            .unwrap();
        assert_matches!(report.data, Some(Delivery::Delivered));
        assert!(report.lifecycle.is_none());
        assert_eq!(rx.try_recv().unwrap().event, "dataMessage");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn message_with_both_payloads_takes_both_paths() {
        let (_router, receiver, hook) = setup();
        let (host, mut rx) = ChannelHost::new("h", 4);
        let _ = hook.attach(host);

        let report = receiver
            .on_message_json(r#"{"messageId":"m","data":{"k":"v"},"notification":{"title":"T"}}"#)
            .unwrap();
        assert!(report.data.unwrap().is_delivered());
        assert!(report.lifecycle.unwrap().is_delivered());
        assert_eq!(rx.try_recv().unwrap().event, "dataMessage");
        assert_eq!(rx.try_recv().unwrap().event, "pushNotificationReceived");
    }

    #[test]
    fn empty_message_is_ignored() {
        let (router, receiver, _hook) = setup();
        let report = receiver.on_message_json(r#"{"messageId":"m"}"#).unwrap();
        assert!(report.data.is_none());
        assert!(report.lifecycle.is_none());
        assert!(router.pending_message_id().is_none());
    }

    #[test]
    fn malformed_json_is_rejected_without_effect() {
        let (router, receiver, _hook) = setup();
        let err = receiver
            .on_message_json(r#"{"notification":{"title":"T"}}"#)
            .unwrap_err();
        assert_matches!(err, BridgeError::MalformedInput(_));
        assert!(router.pending_message_id().is_none());
    }

    #[test]
    fn token_refresh_and_error_forwarded() {
        let (_router, receiver, hook) = setup();
        assert_matches!(receiver.on_token_refresh("tok"), Some(Delivery::Dropped(_)));

        let (host, mut rx) = ChannelHost::new("h", 4);
        let _ = hook.attach(host);
        assert!(receiver.on_token_refresh("tok").unwrap().is_delivered());
        assert!(receiver.on_token_error("boom").unwrap().is_delivered());
        assert_eq!(rx.try_recv().unwrap().payload["value"], "tok");
        assert_eq!(rx.try_recv().unwrap().payload["error"], "boom");
    }

    struct PanickingHost;

    impl Host for PanickingHost {
        fn id(&self) -> &str {
            "panicky"
        }

        fn is_channel_alive(&self) -> bool {
            true
        }

        fn emit(&self, _event: &str, _payload: Value, _retain: bool) -> std::result::Result<(), EmitError> {
            panic!("host blew up");
        }
    }

    #[test]
    fn panicking_host_is_contained() {
        let (router, receiver, hook) = setup();
        let _ = hook.attach(Arc::new(PanickingHost));

        let report = receiver
            .on_message_json(r#"{"messageId":"m","data":{"k":"v"}}"#)
            .unwrap();
        assert!(report.panicked);
        assert!(receiver.on_token_refresh("t").is_none());

        // parking_lot does not poison: the router keeps working.
        let _ = hook.detach();
        assert!(router.deliver_lifecycle(&RawMessage::from_json(r#"{"messageId":"x","notification":{}}"#).unwrap().into()).is_buffered());
    }

    /// Panics on `dataMessage`, accepts everything else.
    struct DataPanickingHost {
        seen: parking_lot::Mutex<Vec<String>>,
    }

    impl Host for DataPanickingHost {
        fn id(&self) -> &str {
            "data-panicky"
        }

        fn is_channel_alive(&self) -> bool {
            true
        }

        fn emit(&self, event: &str, _payload: Value, _retain: bool) -> std::result::Result<(), EmitError> {
            assert_ne!(event, "dataMessage", "host blew up on data");
            self.seen.lock().push(event.to_owned());
            Ok(())
        }
    }

    #[test]
    fn panic_on_data_path_does_not_skip_lifecycle_path() {
        let (_router, receiver, hook) = setup();
        let host = Arc::new(DataPanickingHost {
            seen: parking_lot::Mutex::new(Vec::new()),
        });
        let _ = hook.attach(Arc::clone(&host) as Arc<dyn Host>);

        let report = receiver
            .on_message_json(r#"{"messageId":"m","data":{"k":"v"},"notification":{"title":"T"}}"#)
            .unwrap();
        assert!(report.panicked);
        assert!(report.data.is_none());
        assert_matches!(report.lifecycle, Some(Delivery::Delivered));
        assert_eq!(*host.seen.lock(), vec!["pushNotificationReceived".to_owned()]);
    }
}
