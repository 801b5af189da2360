//! Best-effort side-channel notifications.
//!
//! Story status and timeline updates are pushed after a transition commits.
//! Delivery failures are logged and never fail the transition.

use onair_core::events::{EventBus, EventPayload};
use onair_core::Result;

/// A sink for playout notifications.
pub trait Notifier: Send + Sync {
    /// Deliver one message.
    fn send(&self, payload: EventPayload) -> Result<()>;
}

impl Notifier for EventBus {
    fn send(&self, payload: EventPayload) -> Result<()> {
        self.broadcast(payload);
        Ok(())
    }
}

/// Send each payload, logging and swallowing failures.
pub fn deliver(notifier: &dyn Notifier, payloads: Vec<EventPayload>) {
    for payload in payloads {
        if let Err(e) = notifier.send(payload) {
            tracing::warn!("Notification delivery failed: {}", e);
        }
    }
}
