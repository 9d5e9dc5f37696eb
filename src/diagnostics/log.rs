//! # LogWriter: diagnostics through `tracing`
//!
//! A sink that renders every [`Diagnostic`] as a `tracing` record. Faults are
//! logged at `warn`/`error`, scope bookkeeping at `debug`. Install any
//! `tracing` subscriber to see the output.
//!
//! ## Example output (fmt subscriber)
//! ```text
//! ERROR scopebus: callback panicked scope=owner#3 key=app.login sub=7 context=main reason=boom
//!  WARN scopebus: context overflow scope=global key=app.tick sub=2 context=background
//! DEBUG scopebus: scope released scope=owner#3 reason=2 subscriptions cancelled
//! ```

use async_trait::async_trait;

use super::{Diagnostic, DiagnosticKind, DiagnosticSink};

/// Diagnostic sink backed by `tracing`.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    /// Construct a new [`LogWriter`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DiagnosticSink for LogWriter {
    async fn on_diagnostic(&self, d: &Diagnostic) {
        let scope = d.scope.map(|s| s.to_string()).unwrap_or_default();
        let key = d.key.as_ref().map(|k| k.as_str()).unwrap_or("");
        let sub = d.subscription.map(|s| s.get()).unwrap_or(0);
        let context = d.context.as_deref().unwrap_or("");
        let reason = d.reason.as_deref().unwrap_or("");

        match d.kind {
            DiagnosticKind::CallbackPanicked => {
                tracing::error!(target: "scopebus", %scope, key, sub, context, reason, "callback panicked");
            }
            DiagnosticKind::SinkPanicked => {
                tracing::error!(target: "scopebus", sink = context, reason, "diagnostic sink panicked");
            }
            DiagnosticKind::TypeMismatch => {
                tracing::warn!(target: "scopebus", %scope, key, sub, context, "payload type mismatch");
            }
            DiagnosticKind::ContextClosed => {
                tracing::warn!(target: "scopebus", %scope, key, sub, context, "context closed");
            }
            DiagnosticKind::SinkOverflow => {
                tracing::warn!(target: "scopebus", sink = context, reason, "diagnostic sink overflow");
            }
            DiagnosticKind::DelayedPostDropped => {
                tracing::debug!(target: "scopebus", %scope, key, "delayed post dropped");
            }
            DiagnosticKind::ScopeCreated => {
                tracing::debug!(target: "scopebus", %scope, "scope created");
            }
            DiagnosticKind::ScopeReleased => {
                tracing::debug!(target: "scopebus", %scope, reason, "scope released");
            }
            DiagnosticKind::SubscriptionTerminated => {
                tracing::trace!(target: "scopebus", %scope, key, sub, "subscription terminated");
            }
        }
    }

    fn name(&self) -> &'static str {
        "LogWriter"
    }
}
