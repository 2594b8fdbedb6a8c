//! Token registration.
//!
//! One call to [`Registrar::register`] performs one token fetch and emits
//! exactly one of `registration` / `registrationError`. The fetch itself is
//! an opaque capability of the platform, behind [`TokenProvider`].
//! [`Registrar::register_in_background`] returns at once and lets the
//! outcome arrive as an event.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use pushbridge_core::BridgeError;
use pushbridge_core::text::redact_token;
use pushbridge_settings::RegistrationSettings;

use crate::router::{Delivery, EventRouter};

/// Platform capability that yields the current registration token.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Turn on automatic token generation at the platform level.
    fn set_auto_init_enabled(&self, _enabled: bool) {}

    /// Fetch the current token.
    async fn fetch_token(&self) -> Result<String, BridgeError>;
}

/// Drives token fetches and reports their outcome through the router.
#[derive(Clone)]
pub struct Registrar {
    provider: Arc<dyn TokenProvider>,
    router: Arc<EventRouter>,
    auto_init: bool,
}

impl Registrar {
    /// Registrar using `provider` and emitting through `router`.
    pub fn new(provider: Arc<dyn TokenProvider>, router: Arc<EventRouter>, settings: &RegistrationSettings) -> Self {
        Self {
            provider,
            router,
            auto_init: settings.auto_init,
        }
    }

    /// Fetch a token and emit the outcome.
    ///
    /// Failures are surfaced as `registrationError` and never retried.
    pub async fn register(&self) -> Delivery {
        if self.auto_init {
            self.provider.set_auto_init_enabled(true);
        }
        match self.provider.fetch_token().await {
            Ok(token) => {
                info!(token = %redact_token(&token), "registration token fetched");
                self.router.deliver_token(&token)
            }
            Err(e) => {
                let message = match e {
                    BridgeError::TokenFetch(reason) => reason,
                    other => other.to_string(),
                };
                warn!(error = %message, "registration token fetch failed");
                self.router.deliver_token_error(&message)
            }
        }
    }

    /// Start a registration on the runtime and return immediately.
    ///
    /// The caller learns nothing but that the fetch started; the outcome
    /// reaches the host as an event. The handle resolves to the delivery
    /// outcome for observability.
    pub fn register_in_background(&self) -> JoinHandle<Delivery> {
        let registrar = self.clone();
        tokio::spawn(async move { registrar.register().await })
    }
}

impl std::fmt::Debug for Registrar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registrar")
            .field("auto_init", &self.auto_init)
            .finish_non_exhaustive()
    }
}
