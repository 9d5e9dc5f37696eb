//! # Diagnostic sink trait
//!
//! `DiagnosticSink` is the injected reporting seam: callback faults, context
//! overflows and scope teardown are delivered here. Each sink is driven by a
//! dedicated worker loop fed by a bounded queue owned by the
//! [`SinkSet`](crate::diagnostics::SinkSet).
//!
//! ## Contract
//! - Implementations may be slow (I/O, batching); they do **not** block the
//!   bus nor other sinks.
//! - Each sink declares its queue capacity via [`DiagnosticSink::queue_capacity`].
//!   On overflow, diagnostics for that sink are **dropped** and a
//!   `SinkOverflow` diagnostic is published.

use async_trait::async_trait;

use super::diagnostic::Diagnostic;

/// Contract for diagnostic sinks.
///
/// Called from a sink-dedicated worker task. Implementations should avoid
/// blocking the async runtime.
#[async_trait]
pub trait DiagnosticSink: Send + Sync + 'static {
    /// Handle a single diagnostic.
    async fn on_diagnostic(&self, diagnostic: &Diagnostic);

    /// Human-readable name (for logs).
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Preferred capacity of this sink's queue.
    fn queue_capacity(&self) -> usize {
        256
    }
}
