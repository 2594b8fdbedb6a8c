//! Single-slot buffer for the latest undelivered lifecycle notification.
//!
//! Latest-wins: storing while occupied replaces the occupant. This keeps the
//! "last known notification", not a delivery queue.

use pushbridge_core::events::LifecycleEvent;

/// Holds zero or one [`LifecycleEvent`] awaiting a host.
#[derive(Debug, Default)]
pub struct PendingLifecycleSlot {
    pending: Option<LifecycleEvent>,
}

impl PendingLifecycleSlot {
    /// Empty slot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `event`, returning the occupant it replaced.
    pub fn store(&mut self, event: LifecycleEvent) -> Option<LifecycleEvent> {
        self.pending.replace(event)
    }

    /// Remove and return the occupant.
    pub fn take(&mut self) -> Option<LifecycleEvent> {
        self.pending.take()
    }

    /// Borrow the occupant.
    pub fn peek(&self) -> Option<&LifecycleEvent> {
        self.pending.as_ref()
    }

    /// Whether an event is waiting.
    pub fn is_occupied(&self) -> bool {
        self.pending.is_some()
    }
}
