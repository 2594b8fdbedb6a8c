//! # pushbridge-core
//!
//! Shared vocabulary for the push bridge:
//!
//! - **Transport input**: [`message::RawMessage`] as delivered by the platform
//!   messaging service, [`message::InboundMessage`] once accepted for routing,
//!   and [`message::ActivationIntent`] for "opened from notification tap"
//! - **Public events**: [`events::RoutedEvent`] and its payloads, whose names
//!   and JSON shapes are the wire contract with the host
//! - **Errors**: [`errors::BridgeError`] via `thiserror`
//! - **Logging**: [`logging::init_subscriber`] and test capture helpers
//!
//! ## Crate Position
//!
//! Foundation crate. Depended on by `pushbridge-router` and the binary.

#![deny(unsafe_code)]

pub mod errors;
pub mod events;
pub mod logging;
pub mod message;
pub mod text;

pub use errors::{BridgeError, Result};
pub use events::RoutedEvent;
pub use message::{ActivationIntent, InboundMessage, RawMessage};
