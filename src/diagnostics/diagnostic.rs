//! # Diagnostic records emitted by the bus runtime.
//!
//! The [`DiagnosticKind`] enum classifies what happened:
//! - **Delivery faults**: a callback panicked, a payload did not match the
//!   subscriber's type, a context queue was full or closed
//! - **Scope lifecycle**: brokers created and released, subscriptions terminated
//! - **Scheduling**: a delayed post fired after its scope was gone
//! - **Sink faults**: a diagnostic sink panicked or overflowed
//!
//! The [`Diagnostic`] struct carries the optional metadata (scope, key,
//! subscription id, context name, reason).
//!
//! ## Ordering guarantees
//! Each diagnostic has a globally unique sequence number (`seq`) that increases
//! monotonically, so sinks can restore emission order.
//!
//! ## Example
//! ```rust
//! use scopebus::{Diagnostic, DiagnosticKind};
//!
//! let d = Diagnostic::new(DiagnosticKind::CallbackPanicked)
//!     .with_context("main")
//!     .with_reason("boom");
//!
//! assert_eq!(d.kind, DiagnosticKind::CallbackPanicked);
//! assert_eq!(d.context.as_deref(), Some("main"));
//! assert_eq!(d.reason.as_deref(), Some("boom"));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::SystemTime;

use crate::core::Scope;
use crate::events::TypeKey;
use crate::subscription::SubscriptionId;

/// Global sequence counter for diagnostic ordering.
static DIAGNOSTIC_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticKind {
    // === Delivery faults ===
    /// A subscriber callback panicked; remaining deliveries continued.
    ///
    /// Sets `scope`, `key`, `subscription`, `context`, `reason` (panic message).
    CallbackPanicked,

    /// A payload posted under an overridden key could not be downcast to the
    /// subscriber's event type; the delivery was skipped.
    ///
    /// Sets `scope`, `key`, `subscription`, `context`.
    TypeMismatch,

    /// A context worker has stopped; the delivery was dropped.
    ///
    /// Sets `scope`, `key`, `subscription`, `context`.
    ContextClosed,

    // === Scheduling ===
    /// A delayed post fired after its scope had been released; nothing was delivered.
    ///
    /// Sets `scope`, `key`.
    DelayedPostDropped,

    // === Scope lifecycle ===
    /// A broker was created for a scope.
    ///
    /// Sets `scope`.
    ScopeCreated,

    /// A broker was torn down (owner destroyed, explicit release or shutdown).
    ///
    /// Sets `scope`, `reason` (number of cancelled subscriptions).
    ScopeReleased,

    /// A subscription reached its terminal gate state and left its broker.
    ///
    /// Sets `scope`, `key`, `subscription`.
    SubscriptionTerminated,

    // === Sink faults ===
    /// A diagnostic sink panicked while handling a diagnostic.
    ///
    /// Sets `context` (sink name), `reason` (panic message).
    SinkPanicked,

    /// A diagnostic sink dropped a diagnostic (queue full or worker closed).
    ///
    /// Sets `context` (sink name), `reason`.
    SinkOverflow,
}

/// Diagnostic record with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`DiagnosticKind`]
#[derive(Clone, Debug)]
pub struct Diagnostic {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Diagnostic classification.
    pub kind: DiagnosticKind,
    /// Scope the diagnostic belongs to, if any.
    pub scope: Option<Scope>,
    /// Event key involved, if any.
    pub key: Option<TypeKey>,
    /// Subscription involved, if any.
    pub subscription: Option<SubscriptionId>,
    /// Execution context or sink name, if any.
    pub context: Option<Arc<str>>,
    /// Human-readable reason (panic messages, counts, etc.).
    pub reason: Option<Arc<str>>,
}

impl Diagnostic {
    /// Creates a diagnostic of the given kind with current timestamp and next sequence number.
    pub fn new(kind: DiagnosticKind) -> Self {
        Self {
            seq: DIAGNOSTIC_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            scope: None,
            key: None,
            subscription: None,
            context: None,
            reason: None,
        }
    }

    /// Attaches a scope.
    #[inline]
    pub fn with_scope(mut self, scope: Scope) -> Self {
        self.scope = Some(scope);
        self
    }

    /// Attaches an event key.
    #[inline]
    pub fn with_key(mut self, key: TypeKey) -> Self {
        self.key = Some(key);
        self
    }

    /// Attaches a subscription id.
    #[inline]
    pub fn with_subscription(mut self, id: SubscriptionId) -> Self {
        self.subscription = Some(id);
        self
    }

    /// Attaches an execution context (or sink) name.
    #[inline]
    pub fn with_context(mut self, name: impl Into<Arc<str>>) -> Self {
        self.context = Some(name.into());
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Creates a sink overflow diagnostic.
    #[inline]
    pub fn sink_overflow(sink: &'static str, reason: &'static str) -> Self {
        Diagnostic::new(DiagnosticKind::SinkOverflow)
            .with_context(sink)
            .with_reason(format!("sink={sink} reason={reason}"))
    }

    /// Creates a sink panic diagnostic.
    #[inline]
    pub fn sink_panicked(sink: &'static str, info: String) -> Self {
        Diagnostic::new(DiagnosticKind::SinkPanicked)
            .with_context(sink)
            .with_reason(info)
    }

    /// True for diagnostics about sinks themselves (never re-reported on overflow).
    #[inline]
    pub fn is_sink_fault(&self) -> bool {
        matches!(
            self.kind,
            DiagnosticKind::SinkOverflow | DiagnosticKind::SinkPanicked
        )
    }
}

/// Renders a caught panic payload as text.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_is_monotonic() {
        let a = Diagnostic::new(DiagnosticKind::ScopeCreated);
        let b = Diagnostic::new(DiagnosticKind::ScopeReleased);
        assert!(b.seq > a.seq);
    }

    #[test]
    fn test_sink_faults() {
        let d = Diagnostic::sink_overflow("log", "full");
        assert!(d.is_sink_fault());
        assert_eq!(d.reason.as_deref(), Some("sink=log reason=full"));
        assert!(!Diagnostic::new(DiagnosticKind::TypeMismatch).is_sink_fault());
    }

    #[test]
    fn test_panic_message_variants() {
        let owned: Box<dyn std::any::Any + Send> = Box::new(String::from("owned"));
        let fixed: Box<dyn std::any::Any + Send> = Box::new("fixed");
        let other: Box<dyn std::any::Any + Send> = Box::new(7u8);
        assert_eq!(panic_message(owned.as_ref()), "owned");
        assert_eq!(panic_message(fixed.as_ref()), "fixed");
        assert_eq!(panic_message(other.as_ref()), "unknown panic");
    }
}
