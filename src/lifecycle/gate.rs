//! # Gate: per-subscription delivery state machine.
//!
//! ```text
//!         phase ≥ min            phase < min
//! Idle ───────────────► Active ─────────────► Suspended
//!                         ▲                      │
//!                         └──── phase ≥ min ─────┘
//!
//! any state ── terminal phase / cancel ──► Terminated (final)
//! ```
//!
//! ## Rules
//! - Only `Active` lets deliveries through; events posted while `Idle` or
//!   `Suspended` are dropped for this subscription, never backlogged.
//! - Deliveries still queued on a context when the gate leaves `Active` are
//!   skipped there. A phase change takes effect once the gate driver has fed
//!   it; a callback already running, or one dequeued before that, completes.
//! - The first `Idle → Active` transition is flagged so the broker can run the
//!   one-time sticky replay. Later re-activations are not flagged.
//! - `Terminated` absorbs every further input.

use super::phase::Phase;

/// Externally visible state of a gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    /// Waiting for the owner to first reach the minimum phase.
    Idle,
    /// Delivering.
    Active,
    /// Owner dropped below the minimum phase; deliveries are dropped.
    Suspended,
    /// Finished; the subscription is gone.
    Terminated,
}

/// Result of feeding a phase into a gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Transition {
    /// No state change.
    Unchanged,
    /// Gate opened. `first` is true only for the very first activation.
    Activated { first: bool },
    /// Gate closed temporarily.
    Suspended,
    /// Gate reached its terminal state.
    Terminated,
}

/// Delivery gate of one subscription.
#[derive(Debug, Clone)]
pub(crate) struct Gate {
    state: GateState,
    min: Phase,
    activations: u32,
}

impl Gate {
    pub(crate) fn new(min: Phase) -> Self {
        Self {
            state: GateState::Idle,
            min,
            activations: 0,
        }
    }

    pub(crate) fn state(&self) -> GateState {
        self.state
    }

    pub(crate) fn is_open(&self) -> bool {
        self.state == GateState::Active
    }

    /// Feeds the owner's current phase into the gate.
    pub(crate) fn on_phase(&mut self, phase: Phase) -> Transition {
        if self.state == GateState::Terminated {
            return Transition::Unchanged;
        }
        if phase.is_terminal() {
            return self.terminate();
        }

        match (self.state, phase.satisfies(self.min)) {
            (GateState::Idle | GateState::Suspended, true) => {
                let first = self.activations == 0;
                self.activations += 1;
                self.state = GateState::Active;
                Transition::Activated { first }
            }
            (GateState::Active, false) => {
                self.state = GateState::Suspended;
                Transition::Suspended
            }
            _ => Transition::Unchanged,
        }
    }

    /// Forces the terminal state (explicit cancellation or owner destruction).
    pub(crate) fn terminate(&mut self) -> Transition {
        if self.state == GateState::Terminated {
            return Transition::Unchanged;
        }
        self.state = GateState::Terminated;
        Transition::Terminated
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stays_idle_below_min() {
        let mut gate = Gate::new(Phase::Resumed);
        assert_eq!(gate.on_phase(Phase::Created), Transition::Unchanged);
        assert_eq!(gate.on_phase(Phase::Started), Transition::Unchanged);
        assert_eq!(gate.state(), GateState::Idle);
        assert!(!gate.is_open());
    }

    #[test]
    fn test_only_first_activation_is_flagged() {
        let mut gate = Gate::new(Phase::Started);
        assert_eq!(
            gate.on_phase(Phase::Resumed),
            Transition::Activated { first: true }
        );
        assert_eq!(gate.on_phase(Phase::Started), Transition::Unchanged);
        assert_eq!(gate.on_phase(Phase::Created), Transition::Suspended);
        assert_eq!(gate.state(), GateState::Suspended);
        assert_eq!(
            gate.on_phase(Phase::Started),
            Transition::Activated { first: false }
        );
        assert!(gate.is_open());
    }

    #[test]
    fn test_terminal_from_any_state() {
        for warmup in [None, Some(Phase::Resumed), Some(Phase::Created)] {
            let mut gate = Gate::new(Phase::Started);
            if let Some(p) = warmup {
                gate.on_phase(Phase::Resumed);
                gate.on_phase(p);
            }
            assert_eq!(gate.on_phase(Phase::Destroyed), Transition::Terminated);
            assert_eq!(gate.state(), GateState::Terminated);
        }
    }

    #[test]
    fn test_terminated_absorbs_everything() {
        let mut gate = Gate::new(Phase::Created);
        assert_eq!(gate.terminate(), Transition::Terminated);
        assert_eq!(gate.terminate(), Transition::Unchanged);
        assert_eq!(gate.on_phase(Phase::Resumed), Transition::Unchanged);
        assert_eq!(gate.state(), GateState::Terminated);
    }
}
