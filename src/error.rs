//! Error types surfaced by the scopebus API.
//!
//! Only failures the caller can act on are returned as [`BusError`]:
//! configuration problems on `subscribe*` and scheduling problems on delayed
//! `post*`. Faults inside subscriber callbacks never reach the poster; they are
//! reported as [`Diagnostic`](crate::Diagnostic)s instead.
//!
//! Bookkeeping invariant violations (for example a poisoned per-scope lock)
//! are programming errors and panic.

use std::time::Duration;
use thiserror::Error;

use crate::events::TypeKey;
use crate::lifecycle::OwnerId;

/// # Errors produced by the event bus.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum BusError {
    /// The owner already reported its terminal phase; it cannot host new subscriptions.
    #[error("owner {owner} is already destroyed")]
    OwnerDestroyed {
        /// Identity of the destroyed owner.
        owner: OwnerId,
    },

    /// No tokio runtime is available to host delivery workers.
    #[error("no async runtime available: {reason}")]
    NoRuntime {
        /// Underlying runtime lookup error.
        reason: String,
    },

    /// A delayed post could not be armed.
    #[error("failed to schedule `{key}` after {delay:?}: {reason}")]
    Scheduling {
        /// Key of the event that was being scheduled.
        key: TypeKey,
        /// Requested delay.
        delay: Duration,
        /// Why the timer could not be armed.
        reason: String,
    },

    /// The bus was shut down; no further work is accepted.
    #[error("event bus is shut down")]
    ShutDown,
}

impl BusError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use scopebus::BusError;
    ///
    /// assert_eq!(BusError::ShutDown.as_label(), "bus_shut_down");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            BusError::OwnerDestroyed { .. } => "bus_owner_destroyed",
            BusError::NoRuntime { .. } => "bus_no_runtime",
            BusError::Scheduling { .. } => "bus_scheduling_failed",
            BusError::ShutDown => "bus_shut_down",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            BusError::OwnerDestroyed { owner } => format!("owner destroyed: {owner}"),
            BusError::NoRuntime { reason } => format!("no runtime: {reason}"),
            BusError::Scheduling { key, delay, reason } => {
                format!("schedule failed: key={key} delay={delay:?} reason={reason}")
            }
            BusError::ShutDown => "bus shut down".to_string(),
        }
    }

    /// Indicates a caller-side configuration problem (bad scope or missing runtime).
    ///
    /// # Example
    /// ```
    /// use scopebus::BusError;
    ///
    /// let err = BusError::NoRuntime { reason: "not inside tokio".into() };
    /// assert!(err.is_configuration());
    /// assert!(!BusError::ShutDown.is_configuration());
    /// ```
    pub fn is_configuration(&self) -> bool {
        matches!(self, BusError::OwnerDestroyed { .. } | BusError::NoRuntime { .. })
    }
}

/// Looks up the ambient tokio runtime, mapping its absence to [`BusError::NoRuntime`].
pub(crate) fn current_runtime() -> Result<tokio::runtime::Handle, BusError> {
    tokio::runtime::Handle::try_current().map_err(|e| BusError::NoRuntime {
        reason: e.to_string(),
    })
}
