//! Diagnostics: fault reporting for the bus runtime.
//!
//! Callback faults are caught at the delivery boundary and never reach the
//! poster. They are reported here instead, together with scope bookkeeping.
//!
//! ## Contents
//! - [`DiagnosticKind`], [`Diagnostic`] classification and metadata
//! - [`DiagnosticBus`] thin wrapper over `tokio::sync::broadcast`
//! - [`DiagnosticSink`] injectable sink trait, fanned out by [`SinkSet`]
//! - `LogWriter` a `tracing` sink (feature `logging`)
//!
//! ## Implementing a sink
//! ```no_run
//! use scopebus::{Diagnostic, DiagnosticKind, DiagnosticSink};
//! use async_trait::async_trait;
//!
//! struct PanicCounter;
//!
//! #[async_trait]
//! impl DiagnosticSink for PanicCounter {
//!     async fn on_diagnostic(&self, d: &Diagnostic) {
//!         if d.kind == DiagnosticKind::CallbackPanicked {
//!             // increment a counter
//!         }
//!     }
//! }
//! ```

mod bus;
mod diagnostic;
#[cfg(feature = "logging")]
mod log;
mod sink;
mod sink_set;

pub use bus::DiagnosticBus;
pub use diagnostic::{Diagnostic, DiagnosticKind};
pub(crate) use diagnostic::panic_message;
#[cfg(feature = "logging")]
pub use log::LogWriter;
pub use sink::DiagnosticSink;
pub use sink_set::SinkSet;
