//! # Broadcast channel for diagnostics.
//!
//! [`DiagnosticBus`] is a thin wrapper around [`tokio::sync::broadcast`] that lets
//! every part of the runtime (brokers, context workers, the delay scheduler,
//! sink workers) report faults without blocking.
//!
//! ```text
//! Publishers (many):                      Consumers:
//!   context workers ──┐
//!   brokers         ──┼──► DiagnosticBus ──┬──► sink listener ──► SinkSet
//!   scheduler       ──┘   (broadcast chan) └──► EventBus::diagnostics() receivers
//! ```
//!
//! ## Rules
//! - **Non-blocking publish**: `publish()` never blocks.
//! - **Bounded capacity**: one ring buffer shared by all receivers.
//! - **Lag handling**: slow receivers get `RecvError::Lagged(n)` and skip `n` oldest items.
//! - **No persistence**: diagnostics are lost if nobody is listening.

use tokio::sync::broadcast;

use super::diagnostic::Diagnostic;

/// Broadcast channel for [`Diagnostic`]s.
///
/// Cheap to clone (internally an `Arc`-backed sender).
#[derive(Clone, Debug)]
pub struct DiagnosticBus {
    tx: broadcast::Sender<Diagnostic>,
}

impl DiagnosticBus {
    /// Creates a new bus with the given channel capacity (clamped to at least 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, _rx) = broadcast::channel::<Diagnostic>(capacity);
        Self { tx }
    }

    /// Publishes a diagnostic to all current receivers; dropped if there are none.
    pub fn publish(&self, d: Diagnostic) {
        let _ = self.tx.send(d);
    }

    /// Creates a receiver that observes diagnostics published **after** this call.
    pub fn subscribe(&self) -> broadcast::Receiver<Diagnostic> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::DiagnosticKind;

    #[tokio::test]
    async fn test_receiver_sees_later_publishes_only() {
        let bus = DiagnosticBus::new(0);
        bus.publish(Diagnostic::new(DiagnosticKind::ScopeCreated));

        let mut rx = bus.subscribe();
        bus.publish(Diagnostic::new(DiagnosticKind::ScopeReleased));

        let got = rx.recv().await.unwrap();
        assert_eq!(got.kind, DiagnosticKind::ScopeReleased);
        assert!(rx.try_recv().is_err());
    }
}
