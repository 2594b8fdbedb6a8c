//! Public event surface.
//!
//! [`RoutedEvent`] is the only thing the bridge ever hands to a host. Each
//! variant maps to one event name and one JSON payload shape; both are part
//! of the wire contract and must not change.
//!
//! | Event | Payload |
//! |-------|---------|
//! | `registration` | `{value}` |
//! | `registrationError` | `{error}` |
//! | `pushNotificationReceived` | `{id, data, title?, body?, click_action?, link?}` |
//! | `dataMessage` | `{id, data}` |
//! | `pushNotificationActionPerformed` | `{actionId: "tap", notification: {id, data}}` |

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{BridgeError, Result};
use crate::message::InboundMessage;

/// Token obtained or refreshed.
pub const EVENT_REGISTRATION: &str = "registration";
/// Token fetch failed.
pub const EVENT_REGISTRATION_ERROR: &str = "registrationError";
/// Lifecycle (visible) notification received.
pub const EVENT_NOTIFICATION_RECEIVED: &str = "pushNotificationReceived";
/// Data-only message received.
pub const EVENT_DATA_MESSAGE: &str = "dataMessage";
/// Host opened by tapping a notification.
pub const EVENT_ACTION_PERFORMED: &str = "pushNotificationActionPerformed";

/// Action ID reported for notification taps.
pub const TAP_ACTION_ID: &str = "tap";

/// Data-only push message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataEvent {
    /// Message ID.
    pub id: String,
    /// Data payload.
    pub data: HashMap<String, String>,
}

/// Visible push notification.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleEvent {
    /// Message ID.
    pub id: String,
    /// Data payload (possibly empty).
    pub data: HashMap<String, String>,
    /// Notification title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Notification body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    /// Click action. Serialized as `click_action` on the wire.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub click_action: Option<String>,
    /// Deep link.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
}

impl LifecycleEvent {
    /// Build the event for a message's lifecycle block.
    pub fn from_message(msg: &InboundMessage) -> Self {
        let notification = msg.lifecycle().cloned().unwrap_or_default();
        Self {
            id: msg.message_id().to_owned(),
            data: msg.data().clone(),
            title: notification.title,
            body: notification.body,
            click_action: notification.click_action,
            link: notification.link,
        }
    }
}

/// New or refreshed registration token.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenEvent {
    /// Token value.
    pub value: String,
}

/// Failed token fetch.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenErrorEvent {
    /// Provider error message.
    pub error: String,
}

/// Notification reference inside a [`TapEvent`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TappedNotification {
    /// Message ID of the tapped notification. Absent when the intent
    /// carried the message-id key with a null value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Remaining intent extras.
    pub data: HashMap<String, String>,
}

/// Host activated from a notification tap.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TapEvent {
    /// Always [`TAP_ACTION_ID`].
    pub action_id: String,
    /// The tapped notification.
    pub notification: TappedNotification,
}

impl TapEvent {
    /// Build a tap event for the given message.
    pub fn new(id: impl Into<String>, data: HashMap<String, String>) -> Self {
        Self::from_parts(Some(id.into()), data)
    }

    /// Build a tap event whose message ID may be missing.
    pub fn from_parts(id: Option<String>, data: HashMap<String, String>) -> Self {
        Self {
            action_id: TAP_ACTION_ID.to_owned(),
            notification: TappedNotification { id, data },
        }
    }
}

/// An event ready to be emitted to a host.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum RoutedEvent {
    /// `dataMessage`
    Data(DataEvent),
    /// `pushNotificationReceived`
    Lifecycle(LifecycleEvent),
    /// `registration`
    Token(TokenEvent),
    /// `registrationError`
    TokenError(TokenErrorEvent),
    /// `pushNotificationActionPerformed`
    Tap(TapEvent),
}

impl RoutedEvent {
    /// Data event for a message. The lifecycle block, if any, is ignored.
    pub fn data(msg: &InboundMessage) -> Self {
        Self::Data(DataEvent {
            id: msg.message_id().to_owned(),
            data: msg.data().clone(),
        })
    }

    /// Lifecycle event for a message.
    ///
    /// A message without a lifecycle block still yields an event with only
    /// `id` and `data`; callers classify before routing.
    pub fn lifecycle(msg: &InboundMessage) -> Self {
        Self::Lifecycle(LifecycleEvent::from_message(msg))
    }

    /// Registration token event.
    pub fn token(value: impl Into<String>) -> Self {
        Self::Token(TokenEvent {
            value: value.into(),
        })
    }

    /// Registration failure event.
    pub fn token_error(error: impl Into<String>) -> Self {
        Self::TokenError(TokenErrorEvent {
            error: error.into(),
        })
    }

    /// Public event name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Data(_) => EVENT_DATA_MESSAGE,
            Self::Lifecycle(_) => EVENT_NOTIFICATION_RECEIVED,
            Self::Token(_) => EVENT_REGISTRATION,
            Self::TokenError(_) => EVENT_REGISTRATION_ERROR,
            Self::Tap(_) => EVENT_ACTION_PERFORMED,
        }
    }

    /// Message ID this event refers to, if it refers to one.
    pub fn message_id(&self) -> Option<&str> {
        match self {
            Self::Data(e) => Some(&e.id),
            Self::Lifecycle(e) => Some(&e.id),
            Self::Tap(e) => e.notification.id.as_deref(),
            Self::Token(_) | Self::TokenError(_) => None,
        }
    }

    /// JSON payload delivered with the event.
    pub fn payload(&self) -> Result<Value> {
        serde_json::to_value(self).map_err(|source| BridgeError::Payload {
            event: self.name(),
            source,
        })
    }
}
