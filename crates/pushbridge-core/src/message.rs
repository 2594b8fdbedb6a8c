//! Transport-side message types.
//!
//! [`RawMessage`] is what the platform messaging service hands us. It is
//! decoded leniently (both `camelCase` and `snake_case` keys are accepted)
//! and converted into an [`InboundMessage`] for a single routing attempt.
//! [`ActivationIntent`] carries the extras of an intent that (re-)opened the
//! host, which may describe a tapped notification.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{BridgeError, Result};
use crate::events::TapEvent;

/// Intent extra that carries the platform message ID of a tapped notification.
pub const MESSAGE_ID_EXTRA: &str = "google.message_id";

/// Visible notification block of a push message.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawNotification {
    /// Notification title.
    #[serde(default)]
    pub title: Option<String>,
    /// Notification body text.
    #[serde(default)]
    pub body: Option<String>,
    /// Action the platform associates with a click.
    #[serde(default, alias = "click_action")]
    pub click_action: Option<String>,
    /// Deep link attached to the notification.
    #[serde(default)]
    pub link: Option<String>,
}

/// A push message exactly as delivered by the transport.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawMessage {
    /// Platform-assigned message ID.
    #[serde(alias = "message_id")]
    pub message_id: String,
    /// Key/value data payload. May be empty.
    #[serde(default)]
    pub data: HashMap<String, String>,
    /// Visible notification block, if the message carries one.
    #[serde(default)]
    pub notification: Option<RawNotification>,
}

impl RawMessage {
    /// Decode a transport message from JSON.
    ///
    /// Shape errors (missing `messageId`, non-string data values, ...) are
    /// reported as [`BridgeError::MalformedInput`].
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(BridgeError::malformed)
    }

    /// Decode a transport message from an already-parsed JSON value.
    pub fn from_value(value: Value) -> Result<Self> {
        serde_json::from_value(value).map_err(BridgeError::malformed)
    }
}

/// Lifecycle (human-visible) part of an [`InboundMessage`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LifecycleNotification {
    /// Notification title.
    pub title: Option<String>,
    /// Notification body text.
    pub body: Option<String>,
    /// Click action.
    pub click_action: Option<String>,
    /// Deep link.
    pub link: Option<String>,
}

impl From<RawNotification> for LifecycleNotification {
    fn from(raw: RawNotification) -> Self {
        Self {
            title: raw.title,
            body: raw.body,
            click_action: raw.click_action,
            link: raw.link,
        }
    }
}

/// A message accepted for routing.
///
/// Immutable once built and scoped to one delivery attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InboundMessage {
    message_id: String,
    data: HashMap<String, String>,
    lifecycle: Option<LifecycleNotification>,
}

impl InboundMessage {
    /// Build a message from its parts.
    pub fn new(
        message_id: impl Into<String>,
        data: HashMap<String, String>,
        lifecycle: Option<LifecycleNotification>,
    ) -> Self {
        Self {
            message_id: message_id.into(),
            data,
            lifecycle,
        }
    }

    /// Platform message ID.
    pub fn message_id(&self) -> &str {
        &self.message_id
    }

    /// Data payload.
    pub fn data(&self) -> &HashMap<String, String> {
        &self.data
    }

    /// Lifecycle notification block, if present.
    pub fn lifecycle(&self) -> Option<&LifecycleNotification> {
        self.lifecycle.as_ref()
    }

    /// Whether the message carries a non-empty data payload.
    pub fn has_data(&self) -> bool {
        !self.data.is_empty()
    }

    /// Whether the message carries a visible notification.
    pub fn is_lifecycle(&self) -> bool {
        self.lifecycle.is_some()
    }
}

impl From<RawMessage> for InboundMessage {
    fn from(raw: RawMessage) -> Self {
        Self {
            message_id: raw.message_id,
            data: raw.data,
            lifecycle: raw.notification.map(LifecycleNotification::from),
        }
    }
}

/// Extras of an intent that activated the host.
///
/// Values are kept as raw JSON: the platform stores arbitrary objects in the
/// bundle, and only their string form reaches the host.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActivationIntent {
    /// Raw intent extras.
    pub extras: HashMap<String, Value>,
}

impl ActivationIntent {
    /// Wrap a set of extras.
    pub fn new(extras: HashMap<String, Value>) -> Self {
        Self { extras }
    }

    /// Decode an intent from a JSON object.
    pub fn from_value(value: Value) -> Result<Self> {
        serde_json::from_value(value).map_err(BridgeError::malformed)
    }

    /// Derive the tap event this activation represents, if any.
    ///
    /// Only intents carrying the [`MESSAGE_ID_EXTRA`] key came from a
    /// notification tap; a null value there yields a tap without an ID.
    /// Every other extra with a non-null value lands in `data`.
    pub fn tap_event(&self) -> Option<TapEvent> {
        let id = self.extras.get(MESSAGE_ID_EXTRA).map(value_to_string)?;
        let data = self
            .extras
            .iter()
            .filter(|(key, _)| key.as_str() != MESSAGE_ID_EXTRA)
            .filter_map(|(key, value)| value_to_string(value).map(|v| (key.clone(), v)))
            .collect();
        Some(TapEvent::from_parts(id, data))
    }
}

fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}
