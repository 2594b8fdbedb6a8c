//! Replay script format.
//!
//! One JSON object per line, tagged by `op`. Blank lines and `#` comments
//! are skipped.

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::Value;

use pushbridge_core::{BridgeError, Result};

/// One scripted transport or host step.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Step {
    /// Transport delivers a push message.
    Message {
        /// Raw transport message, decoded when the step runs.
        message: Value,
    },
    /// Transport reports a refreshed token.
    Token {
        /// Token value.
        value: String,
    },
    /// Transport reports a token failure.
    TokenError {
        /// Provider error text.
        error: String,
    },
    /// A host attaches.
    Attach {
        /// Host ID.
        host_id: String,
    },
    /// A host detaches. Without an ID, whatever is attached goes.
    Detach {
        /// Host ID.
        #[serde(default)]
        host_id: Option<String>,
    },
    /// A host's receiving end goes away without detaching.
    Close {
        /// Host ID.
        host_id: String,
    },
    /// The host is activated by an intent.
    Tap {
        /// Intent extras.
        #[serde(default)]
        extras: HashMap<String, Value>,
    },
    /// One token registration.
    Register {
        /// Token the provider hands out.
        #[serde(default)]
        token: Option<String>,
        /// Failure the provider reports when no token is scripted.
        #[serde(default)]
        error: Option<String>,
    },
}

/// Parse one script line. `Ok(None)` for blank and comment lines.
pub fn parse_line(line: &str) -> Result<Option<Step>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    serde_json::from_str(line).map(Some).map_err(BridgeError::malformed)
}
