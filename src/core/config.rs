//! # Bus configuration.
//!
//! [`BusConfig`] centralizes the runtime settings handed to
//! [`EventBus::builder`](crate::EventBus::builder).
//!
//! ## Sentinel values
//! - a capacity of `0` is clamped to 1

use crate::lifecycle::Phase;

/// Configuration for an [`EventBus`](crate::EventBus).
///
/// ## Field semantics
/// - `diagnostics_capacity`: ring buffer size of the diagnostic broadcast channel
/// - `default_min_phase`: minimum phase used when `SubscribeOptions::min_phase` is unset
#[derive(Clone, Debug)]
pub struct BusConfig {
    /// Capacity of the diagnostic broadcast channel.
    ///
    /// Receivers lagging more than this many diagnostics skip the oldest ones.
    pub diagnostics_capacity: usize,

    /// Default gate minimum for lifecycle-bound subscriptions.
    pub default_min_phase: Phase,
}

impl BusConfig {
    /// Diagnostic channel capacity clamped to a minimum of 1.
    #[inline]
    pub fn diagnostics_capacity_clamped(&self) -> usize {
        self.diagnostics_capacity.max(1)
    }
}

impl Default for BusConfig {
    /// Default configuration:
    ///
    /// - `diagnostics_capacity = 1024`
    /// - `default_min_phase = Phase::Started`
    fn default() -> Self {
        Self {
            diagnostics_capacity: 1024,
            default_min_phase: Phase::Started,
        }
    }
}
