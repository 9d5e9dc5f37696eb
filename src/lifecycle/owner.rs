//! # Owner lifecycle source.
//!
//! [`Lifecycle`] is the seam to the host lifecycle framework: the host reports
//! transitions with [`Lifecycle::handle`], and the bus observes them through a
//! `tokio::sync::watch` channel. Each `Lifecycle` carries a unique
//! [`OwnerId`], so two owners are distinct scopes even if they hold equal data.
//!
//! Dropping a `Lifecycle` closes the channel; observers treat that as
//! `Destroyed`.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

use tokio::sync::watch;

use super::phase::{LifecycleEvent, Phase};

/// Global owner identity counter.
static OWNER_SEQ: AtomicU64 = AtomicU64::new(1);

/// Identity of a lifecycle owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OwnerId(u64);

impl OwnerId {
    /// Raw numeric id.
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "owner#{}", self.0)
    }
}

/// Phase source of one owner.
pub struct Lifecycle {
    id: OwnerId,
    tx: watch::Sender<Phase>,
}

impl Lifecycle {
    /// Creates a lifecycle in [`Phase::Initialized`] with a fresh identity.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(Phase::Initialized);
        Self {
            id: OwnerId(OWNER_SEQ.fetch_add(1, AtomicOrdering::Relaxed)),
            tx,
        }
    }

    /// Identity of this owner.
    pub fn id(&self) -> OwnerId {
        self.id
    }

    /// Current phase.
    pub fn current(&self) -> Phase {
        *self.tx.borrow()
    }

    /// Applies a transition reported by the host.
    ///
    /// Returns `false` if the phase did not change (already there, or already destroyed).
    pub fn handle(&self, event: LifecycleEvent) -> bool {
        self.set_phase(event.target())
    }

    /// Moves to `phase` directly. Transitions out of `Destroyed` are ignored.
    pub fn set_phase(&self, phase: Phase) -> bool {
        self.tx.send_if_modified(|current| {
            if current.is_terminal() || *current == phase {
                return false;
            }
            *current = phase;
            true
        })
    }

    /// Reports the terminal phase.
    pub fn destroy(&self) -> bool {
        self.set_phase(Phase::Destroyed)
    }

    /// Receiver observing subsequent phase changes; the current phase is marked seen.
    pub fn watch(&self) -> watch::Receiver<Phase> {
        self.tx.subscribe()
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lifecycle")
            .field("id", &self.id)
            .field("phase", &self.current())
            .finish()
    }
}

/// Anything that exposes a [`Lifecycle`]: a screen, a task scope, a session.
pub trait LifecycleOwner: Send + Sync {
    /// The owner's phase source.
    fn lifecycle(&self) -> &Lifecycle;
}

impl LifecycleOwner for Lifecycle {
    fn lifecycle(&self) -> &Lifecycle {
        self
    }
}

impl<T: LifecycleOwner + ?Sized> LifecycleOwner for Arc<T> {
    fn lifecycle(&self) -> &Lifecycle {
        (**self).lifecycle()
    }
}

impl<T: LifecycleOwner + ?Sized> LifecycleOwner for &T {
    fn lifecycle(&self) -> &Lifecycle {
        (**self).lifecycle()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_not_value() {
        let a = Lifecycle::new();
        let b = Lifecycle::new();
        assert_ne!(a.id(), b.id());
        assert_eq!(a.current(), b.current());
    }

    #[test]
    fn test_destroyed_is_final() {
        let lc = Lifecycle::new();
        assert!(lc.handle(LifecycleEvent::Create));
        assert!(!lc.handle(LifecycleEvent::Create));
        assert!(lc.destroy());
        assert!(!lc.handle(LifecycleEvent::Resume));
        assert_eq!(lc.current(), Phase::Destroyed);
    }

    #[tokio::test]
    async fn test_watch_observes_changes() {
        let lc = Lifecycle::new();
        let mut rx = lc.watch();
        lc.handle(LifecycleEvent::Start);
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), Phase::Started);

        drop(lc);
        assert!(rx.changed().await.is_err());
    }
}
