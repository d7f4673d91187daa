//! Broadcast router: delivers one chat line to every registered session.
//!
//! Delivery only enqueues onto each recipient's writer queue, so a broadcast
//! never suspends while it holds the registry guard. A failed recipient is
//! logged and skipped; it never fails the broadcast as a whole. Recipients
//! whose queue is full are reported back so the caller can disconnect them.

use super::registry::RegistryGuard;
use relay_core::{ChatLine, RelayError, SessionId};
use tracing::{debug, warn};

/// Outcome of one fan-out.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Delivery {
    /// Recipients the line was queued for.
    pub delivered: usize,
    /// Recipients skipped because their queue was closed or full.
    pub failed: usize,
    /// Recipients whose queue was full.
    pub lagging: Vec<SessionId>,
}

/// Fans chat lines out to the registry.
#[derive(Debug, Clone)]
pub struct BroadcastRouter {
    echo_to_sender: bool,
}

impl BroadcastRouter {
    /// Create a router. With `echo_to_sender`, a user's message is also
    /// delivered back to its sender.
    pub fn new(echo_to_sender: bool) -> Self {
        Self { echo_to_sender }
    }

    /// Deliver `line` to every session in the registry except `exclude`.
    pub fn broadcast(
        &self,
        registry: &RegistryGuard<'_>,
        line: &ChatLine,
        exclude: Option<&SessionId>,
    ) -> Delivery {
        let text = line.render();
        let mut outcome = Delivery::default();

        for recipient in registry.snapshot() {
            if exclude == Some(&recipient.id) {
                continue;
            }
            match recipient.deliver(text.clone()) {
                Ok(()) => outcome.delivered += 1,
                Err(e) => {
                    outcome.failed += 1;
                    warn!(session_id = %recipient.id, error = %e, "delivery failed");
                    if matches!(e, RelayError::QueueFull(_)) {
                        outcome.lagging.push(recipient.id);
                    }
                }
            }
        }

        debug!(
            delivered = outcome.delivered,
            failed = outcome.failed,
            "broadcast"
        );
        outcome
    }

    /// Relay a user-originated message, applying the self-echo policy.
    pub fn relay(
        &self,
        registry: &RegistryGuard<'_>,
        sender: &SessionId,
        text: impl Into<String>,
    ) -> Delivery {
        let line = ChatLine::user(sender.clone(), text);
        let exclude = if self.echo_to_sender {
            None
        } else {
            Some(sender)
        };
        self.broadcast(registry, &line, exclude)
    }
}

impl Default for BroadcastRouter {
    fn default() -> Self {
        Self::new(true)
    }
}
