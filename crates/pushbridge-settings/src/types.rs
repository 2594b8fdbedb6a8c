//! Settings schema.
//!
//! Serialized in `camelCase` to match `~/.pushbridge/settings.json`. Every
//! section has a compiled default, so a partial file is always valid.

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Upper bound for the host channel capacity.
pub const MAX_CHANNEL_CAPACITY: usize = 65_536;

/// Root settings object.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BridgeSettings {
    /// Log output.
    pub logging: LoggingSettings,
    /// Host event channel.
    pub host: HostSettings,
    /// Token registration.
    pub registration: RegistrationSettings,
}

impl BridgeSettings {
    /// Reject values the bridge cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.host.channel_capacity == 0 || self.host.channel_capacity > MAX_CHANNEL_CAPACITY {
            return Err(SettingsError::InvalidValue(format!(
                "host.channelCapacity must be within 1..={MAX_CHANNEL_CAPACITY}, got {}",
                self.host.channel_capacity
            )));
        }
        if self.logging.level.trim().is_empty() {
            return Err(SettingsError::InvalidValue(
                "logging.level must not be empty".into(),
            ));
        }
        Ok(())
    }
}

/// Log output settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub level: String,
    /// Emit JSON lines instead of compact text.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json: false,
        }
    }
}

/// Host event channel settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HostSettings {
    /// Bounded capacity of a channel-backed host.
    pub channel_capacity: usize,
    /// Ask the host to retain events until a listener consumes them.
    pub retain_until_consumed: bool,
}

impl Default for HostSettings {
    fn default() -> Self {
        Self {
            channel_capacity: 64,
            retain_until_consumed: true,
        }
    }
}

/// Token registration settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RegistrationSettings {
    /// Enable provider auto-init before fetching the token.
    pub auto_init: bool,
}

impl Default for RegistrationSettings {
    fn default() -> Self {
        Self { auto_init: true }
    }
}
