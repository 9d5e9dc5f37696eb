//! # Lifecycle phases reported by an owner.
//!
//! ```text
//!              Create      Start       Resume
//! Initialized ───────► Created ───────► Started ───────► Resumed
//!                       ▲   Stop        ▲   Pause          │
//!                       └───────────────┴──────────────────┘
//!
//! any phase ── Destroy ──► Destroyed (terminal)
//! ```
//!
//! Phases are ordered `Initialized < Created < Started < Resumed`.
//! `Destroyed` is terminal and never satisfies any minimum.

use std::fmt;

/// Coarse-grained stage of an owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Constructed, nothing reported yet.
    Initialized,
    /// Created (or stopped).
    Created,
    /// Started (or paused).
    Started,
    /// Resumed, fully in the foreground.
    Resumed,
    /// Destroyed; terminal.
    Destroyed,
}

impl Phase {
    fn rank(self) -> u8 {
        match self {
            Phase::Destroyed => 0,
            Phase::Initialized => 1,
            Phase::Created => 2,
            Phase::Started => 3,
            Phase::Resumed => 4,
        }
    }

    /// True for the terminal phase.
    #[inline]
    pub fn is_terminal(self) -> bool {
        self == Phase::Destroyed
    }

    /// True if this phase opens a gate whose minimum is `min`.
    ///
    /// # Example
    /// ```
    /// use scopebus::Phase;
    ///
    /// assert!(Phase::Resumed.satisfies(Phase::Started));
    /// assert!(!Phase::Started.satisfies(Phase::Resumed));
    /// assert!(!Phase::Destroyed.satisfies(Phase::Initialized));
    /// ```
    #[inline]
    pub fn satisfies(self, min: Phase) -> bool {
        !self.is_terminal() && self.rank() >= min.rank()
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::Initialized => "initialized",
            Phase::Created => "created",
            Phase::Started => "started",
            Phase::Resumed => "resumed",
            Phase::Destroyed => "destroyed",
        };
        f.write_str(s)
    }
}

/// Transition reported by the host lifecycle framework.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    Create,
    Start,
    Resume,
    Pause,
    Stop,
    Destroy,
}

impl LifecycleEvent {
    /// Phase the owner is in right after this transition.
    pub fn target(self) -> Phase {
        match self {
            LifecycleEvent::Create | LifecycleEvent::Stop => Phase::Created,
            LifecycleEvent::Start | LifecycleEvent::Pause => Phase::Started,
            LifecycleEvent::Resume => Phase::Resumed,
            LifecycleEvent::Destroy => Phase::Destroyed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordering() {
        assert!(Phase::Created.satisfies(Phase::Initialized));
        assert!(Phase::Started.satisfies(Phase::Started));
        assert!(!Phase::Created.satisfies(Phase::Started));
        assert!(!Phase::Destroyed.satisfies(Phase::Destroyed));
    }

    #[test]
    fn test_events_land_on_expected_phase() {
        assert_eq!(LifecycleEvent::Pause.target(), Phase::Started);
        assert_eq!(LifecycleEvent::Stop.target(), Phase::Created);
        assert_eq!(LifecycleEvent::Destroy.target(), Phase::Destroyed);
        assert!(LifecycleEvent::Destroy.target().is_terminal());
    }
}
