//! Which host, if any, is currently attached.
//!
//! The registry is a plain value; it is only ever touched while the
//! router's lock is held.

use tracing::debug;

use crate::host::HostRef;

/// Single-slot record of the attached host.
#[derive(Default)]
pub struct HostRegistry {
    host: Option<HostRef>,
}

impl HostRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `host` as attached, returning the host it superseded.
    pub fn attach(&mut self, host: HostRef) -> Option<HostRef> {
        let previous = self.host.replace(host);
        if let Some(ref prev) = previous {
            debug!(host_id = prev.id(), "attached host superseded");
        }
        previous
    }

    /// Clear the attached host.
    pub fn detach(&mut self) -> Option<HostRef> {
        self.host.take()
    }

    /// Clear the attached host only if it is the one identified by `host_id`.
    ///
    /// A stale instance tearing down after its replacement attached must not
    /// detach the replacement.
    pub fn detach_if(&mut self, host_id: &str) -> Option<HostRef> {
        if self.host.as_ref().is_some_and(|h| h.id() == host_id) {
            self.host.take()
        } else {
            None
        }
    }

    /// The attached host, or `None` if there is none or its channel is dead.
    pub fn current(&self) -> Option<HostRef> {
        self.host.as_ref().filter(|h| h.is_channel_alive()).cloned()
    }

    /// ID of the recorded host, live or not.
    pub fn attached_id(&self) -> Option<&str> {
        self.host.as_ref().map(|h| h.id())
    }
}

impl std::fmt::Debug for HostRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostRegistry")
            .field("host", &self.attached_id())
            .finish()
    }
}
