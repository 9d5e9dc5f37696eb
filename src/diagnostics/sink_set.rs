//! # Non-blocking diagnostic fan-out to multiple sinks.
//!
//! ```text
//! emit(diagnostic)
//!     │
//!     ├──► [queue 1] ──► worker 1 ──► sink1.on_diagnostic()
//!     │    (bounded)         └──────► panic → SinkPanicked
//!     └──► [queue N] ──► worker N ──► sinkN.on_diagnostic()
//! ```
//!
//! ## Rules
//! - **Per-sink FIFO**, no cross-sink ordering.
//! - **Overflow**: diagnostic dropped for that sink only, `SinkOverflow` published.
//! - **Non-blocking**: `emit()` uses `try_send`.
//! - **Isolation**: a panicking sink is caught with `catch_unwind` and keeps running.
//!
//! **Warning**: `AssertUnwindSafe` is used, which can leave shared state inconsistent
//! if a sink panics while holding a lock.

use std::sync::Arc;

use futures::FutureExt;
use tokio::{sync::mpsc, task::JoinHandle};

use super::{Diagnostic, DiagnosticBus, DiagnosticSink, diagnostic::panic_message};

/// Per-sink channel metadata.
struct SinkChannel {
    name: &'static str,
    sender: mpsc::Sender<Arc<Diagnostic>>,
}

/// Fan-out coordinator for diagnostic sinks.
pub struct SinkSet {
    channels: Vec<SinkChannel>,
    workers: Vec<JoinHandle<()>>,
    bus: DiagnosticBus,
}

impl SinkSet {
    /// Creates a new set and spawns one worker task per sink.
    ///
    /// Must be called inside a tokio runtime.
    #[must_use]
    pub fn new(sinks: Vec<Arc<dyn DiagnosticSink>>, bus: DiagnosticBus) -> Self {
        let mut channels = Vec::with_capacity(sinks.len());
        let mut workers = Vec::with_capacity(sinks.len());

        for sink in sinks {
            let cap = sink.queue_capacity().max(1);
            let name = sink.name();
            let (tx, mut rx) = mpsc::channel::<Arc<Diagnostic>>(cap);
            let bus_for_worker = bus.clone();

            let handle = tokio::spawn(async move {
                while let Some(d) = rx.recv().await {
                    let fut = sink.on_diagnostic(d.as_ref());
                    if let Err(panic_err) = std::panic::AssertUnwindSafe(fut).catch_unwind().await {
                        bus_for_worker
                            .publish(Diagnostic::sink_panicked(sink.name(), panic_message(&*panic_err)));
                    }
                }
            });
            channels.push(SinkChannel { name, sender: tx });
            workers.push(handle);
        }
        Self {
            channels,
            workers,
            bus,
        }
    }

    /// Number of sinks in the set.
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    /// True when no sinks are registered.
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Emits a shared diagnostic to all sinks.
    ///
    /// Sink-fault diagnostics are not re-reported when they overflow themselves.
    pub fn emit_arc(&self, d: Arc<Diagnostic>) {
        let is_sink_fault = d.is_sink_fault();

        for channel in &self.channels {
            let reason = match channel.sender.try_send(Arc::clone(&d)) {
                Ok(()) => continue,
                Err(mpsc::error::TrySendError::Full(_)) => "full",
                Err(mpsc::error::TrySendError::Closed(_)) => "closed",
            };
            if !is_sink_fault {
                self.bus.publish(Diagnostic::sink_overflow(channel.name, reason));
            }
        }
    }

    /// Drops all queues and awaits the workers.
    pub async fn shutdown(self) {
        drop(self.channels);
        for h in self.workers {
            let _ = h.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::DiagnosticKind;
    use async_trait::async_trait;
    use tokio::sync::mpsc::UnboundedSender;

    struct Recorder(UnboundedSender<DiagnosticKind>);

    #[async_trait]
    impl DiagnosticSink for Recorder {
        async fn on_diagnostic(&self, d: &Diagnostic) {
            let _ = self.0.send(d.kind);
        }
        fn name(&self) -> &'static str {
            "recorder"
        }
    }

    struct Exploder;

    #[async_trait]
    impl DiagnosticSink for Exploder {
        async fn on_diagnostic(&self, _d: &Diagnostic) {
            panic!("sink exploded");
        }
        fn name(&self) -> &'static str {
            "exploder"
        }
    }

    #[tokio::test]
    async fn test_fans_out_in_order() {
        let bus = DiagnosticBus::new(16);
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let set = SinkSet::new(vec![Arc::new(Recorder(tx))], bus);

        set.emit_arc(Arc::new(Diagnostic::new(DiagnosticKind::ScopeCreated)));
        set.emit_arc(Arc::new(Diagnostic::new(DiagnosticKind::ScopeReleased)));

        assert_eq!(rx.recv().await, Some(DiagnosticKind::ScopeCreated));
        assert_eq!(rx.recv().await, Some(DiagnosticKind::ScopeReleased));
        set.shutdown().await;
    }

    #[tokio::test]
    async fn test_panicking_sink_is_reported_and_isolated() {
        let bus = DiagnosticBus::new(16);
        let mut faults = bus.subscribe();
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let set = SinkSet::new(
            vec![Arc::new(Exploder), Arc::new(Recorder(tx))],
            bus,
        );
        assert_eq!(set.len(), 2);

        set.emit_arc(Arc::new(Diagnostic::new(DiagnosticKind::TypeMismatch)));

        assert_eq!(rx.recv().await, Some(DiagnosticKind::TypeMismatch));
        let fault = faults.recv().await.unwrap();
        assert_eq!(fault.kind, DiagnosticKind::SinkPanicked);
        assert_eq!(fault.context.as_deref(), Some("exploder"));
        assert_eq!(fault.reason.as_deref(), Some("sink exploded"));
    }
}
