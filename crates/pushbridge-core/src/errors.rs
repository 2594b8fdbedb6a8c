//! Error taxonomy for the push bridge.
//!
//! Nothing here is fatal: every variant is contained locally. Routing drops
//! (an event with nowhere to go) are an accepted outcome and are not errors;
//! they are logged and counted by the router instead.

use thiserror::Error;

/// Errors surfaced by bridge operations.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Unexpected payload shape. Rejected to the caller with no partial effect.
    #[error("malformed input: {0}")]
    MalformedInput(String),

    /// The token provider failed to produce a registration token.
    #[error("token fetch failed: {0}")]
    TokenFetch(String),

    /// An event payload could not be serialized for the host.
    #[error("failed to serialize {event} payload: {source}")]
    Payload {
        /// Public event name.
        event: &'static str,
        /// Underlying serializer error.
        #[source]
        source: serde_json::Error,
    },
}

impl BridgeError {
    /// Build a [`BridgeError::MalformedInput`] from any displayable reason.
    pub fn malformed(reason: impl std::fmt::Display) -> Self {
        Self::MalformedInput(reason.to_string())
    }
}

/// Result type for bridge operations.
pub type Result<T> = std::result::Result<T, BridgeError>;
