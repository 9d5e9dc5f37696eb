//! # Broker registry: one scoped broker per scope identity.
//!
//! The registry lazily creates a [`Broker`] the first time an owner scope is
//! resolved and tears it down when the owner reports its terminal phase.
//!
//! ## Architecture
//! ```text
//! resolve_owner(lifecycle)
//!   ├─► get(scope)            ─► live broker? return it     (fast path, shard read lock)
//!   └─► entry(scope)          ─► vacant / released → insert Broker::new(child of root)
//!                                 └─► spawn owner watcher
//!
//! owner watcher:
//!   phase terminal | channel closed ─► remove_if(ptr_eq) ─► broker.release()
//!   broker token cancelled         ─► exit (released elsewhere)
//! ```
//!
//! ## Rules
//! - Concurrent first resolution of one scope observes exactly one instance
//!   (`DashMap::entry` holds the shard lock across check and insert).
//! - A released broker is never handed out again; the next resolve creates a
//!   fresh, empty one.
//! - Removal compares by pointer, so a stale watcher cannot evict a newer broker.
//! - The global broker lives as long as the registry and is only released on shutdown.

use std::sync::{Arc, Weak};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use super::broker::Broker;
use super::scope::Scope;
use crate::diagnostics::{Diagnostic, DiagnosticBus, DiagnosticKind};
use crate::error::{BusError, current_runtime};
use crate::lifecycle::{Lifecycle, OwnerId, Phase};

/// Table of live scoped brokers.
pub(crate) struct BrokerRegistry {
    global: Arc<Broker>,
    owners: DashMap<OwnerId, Arc<Broker>>,
    root: CancellationToken,
    diagnostics: DiagnosticBus,
}

impl BrokerRegistry {
    /// Creates a registry whose brokers are all children of `root`.
    pub(crate) fn new(root: CancellationToken, diagnostics: DiagnosticBus) -> Arc<Self> {
        let global = Broker::new(Scope::Global, root.child_token(), diagnostics.clone());
        Arc::new(Self {
            global,
            owners: DashMap::new(),
            root,
            diagnostics,
        })
    }

    /// Broker of the process-wide scope.
    pub(crate) fn global(&self) -> &Arc<Broker> {
        &self.global
    }

    /// Returns the broker of `owner`, creating it on first access.
    ///
    /// Fails if the registry was shut down or the owner is already destroyed.
    pub(crate) fn resolve_owner(self: &Arc<Self>, owner: &Lifecycle) -> Result<Arc<Broker>, BusError> {
        if self.root.is_cancelled() {
            return Err(BusError::ShutDown);
        }
        if owner.current().is_terminal() {
            return Err(BusError::OwnerDestroyed { owner: owner.id() });
        }

        let id = owner.id();
        // Lock order: map shard, then broker state. Broker code never touches the map.
        if let Some(broker) = self.owners.get(&id) {
            if !broker.is_released() {
                return Ok(Arc::clone(broker.value()));
            }
        }

        let rt = current_runtime()?;
        let (broker, created) = match self.owners.entry(id) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_released() {
                    let fresh = self.make_broker(id);
                    occupied.insert(Arc::clone(&fresh));
                    (fresh, true)
                } else {
                    (Arc::clone(occupied.get()), false)
                }
            }
            Entry::Vacant(vacant) => {
                let fresh = self.make_broker(id);
                vacant.insert(Arc::clone(&fresh));
                (fresh, true)
            }
        };

        if created {
            tracing::debug!(scope = %broker.scope(), "scope created");
            self.diagnostics
                .publish(Diagnostic::new(DiagnosticKind::ScopeCreated).with_scope(broker.scope()));
            rt.spawn(watch_owner(
                Arc::downgrade(self),
                Arc::downgrade(&broker),
                broker.token().clone(),
                owner.watch(),
            ));
        }
        Ok(broker)
    }

    fn make_broker(&self, id: OwnerId) -> Arc<Broker> {
        Broker::new(Scope::Owner(id), self.root.child_token(), self.diagnostics.clone())
    }

    /// Returns the live broker of `scope` without creating one.
    pub(crate) fn lookup(&self, scope: Scope) -> Option<Arc<Broker>> {
        let broker = match scope {
            Scope::Global => Arc::clone(&self.global),
            Scope::Owner(id) => Arc::clone(self.owners.get(&id)?.value()),
        };
        (!broker.is_released()).then_some(broker)
    }

    /// Tears down the broker of an owner scope.
    ///
    /// Idempotent; returns the number of subscriptions cancelled by this call.
    pub(crate) fn release(&self, id: OwnerId, reason: &str) -> usize {
        match self.owners.remove(&id) {
            Some((_, broker)) => broker.release(reason),
            None => 0,
        }
    }

    /// Removes `broker` only if it is still the registered instance of its scope.
    fn release_instance(&self, id: OwnerId, broker: &Arc<Broker>, reason: &str) -> usize {
        self.owners.remove_if(&id, |_, current| Arc::ptr_eq(current, broker));
        broker.release(reason)
    }

    /// Cancels the root and releases every broker, global included.
    pub(crate) fn shutdown(&self) -> usize {
        self.root.cancel();
        let ids: Vec<OwnerId> = self.owners.iter().map(|e| *e.key()).collect();
        let mut cancelled = 0;
        for id in ids {
            cancelled += self.release(id, "bus shut down");
        }
        cancelled + self.global.release("bus shut down")
    }

    pub(crate) fn is_shut_down(&self) -> bool {
        self.root.is_cancelled()
    }

    /// Number of live owner-scoped brokers.
    pub(crate) fn owner_count(&self) -> usize {
        self.owners.len()
    }
}

/// Releases the broker once its owner reaches the terminal phase.
async fn watch_owner(
    registry: Weak<BrokerRegistry>,
    broker: Weak<Broker>,
    token: CancellationToken,
    mut phases: watch::Receiver<Phase>,
) {
    loop {
        if phases.borrow_and_update().is_terminal() {
            break;
        }
        tokio::select! {
            biased;
            _ = token.cancelled() => return,
            changed = phases.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }

    let (Some(registry), Some(broker)) = (registry.upgrade(), broker.upgrade()) else {
        return;
    };
    if let Scope::Owner(id) = broker.scope() {
        registry.release_instance(id, &broker, "owner destroyed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::LifecycleEvent;
    use std::time::Duration;

    fn registry() -> Arc<BrokerRegistry> {
        BrokerRegistry::new(CancellationToken::new(), DiagnosticBus::new(64))
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_first_resolution_creates_one_broker() {
        let reg = registry();
        let owner = Arc::new(Lifecycle::new());
        owner.handle(LifecycleEvent::Start);

        let mut joins = Vec::new();
        for _ in 0..16 {
            let reg = Arc::clone(&reg);
            let owner = Arc::clone(&owner);
            joins.push(tokio::spawn(async move { reg.resolve_owner(&owner).unwrap() }));
        }
        let mut brokers = Vec::new();
        for j in joins {
            brokers.push(j.await.unwrap());
        }

        assert!(brokers.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
        assert_eq!(reg.owner_count(), 1);
    }

    #[tokio::test]
    async fn test_owner_destroy_releases_broker() {
        let reg = registry();
        let owner = Lifecycle::new();
        let broker = reg.resolve_owner(&owner).unwrap();

        owner.destroy();
        settle().await;

        assert!(broker.is_released());
        assert_eq!(reg.owner_count(), 0);
        assert!(reg.lookup(Scope::of(&owner)).is_none());
        let err = reg.resolve_owner(&owner).unwrap_err();
        assert_eq!(err.as_label(), "bus_owner_destroyed");
    }

    #[tokio::test]
    async fn test_dropped_lifecycle_releases_broker() {
        let reg = registry();
        let owner = Lifecycle::new();
        let broker = reg.resolve_owner(&owner).unwrap();

        drop(owner);
        settle().await;
        assert!(broker.is_released());
        assert_eq!(reg.owner_count(), 0);
    }

    #[tokio::test]
    async fn test_explicit_release_yields_fresh_broker() {
        let reg = registry();
        let owner = Lifecycle::new();
        let first = reg.resolve_owner(&owner).unwrap();

        assert_eq!(reg.release(owner.id(), "test"), 0);
        assert_eq!(reg.release(owner.id(), "test"), 0);
        assert!(first.is_released());

        let second = reg.resolve_owner(&owner).unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert!(!second.is_released());

        owner.destroy();
        settle().await;
        assert!(second.is_released());
    }

    #[tokio::test]
    async fn test_scopes_are_isolated() {
        let reg = registry();
        let a = Lifecycle::new();
        let b = Lifecycle::new();
        let ba = reg.resolve_owner(&a).unwrap();
        let bb = reg.resolve_owner(&b).unwrap();

        a.destroy();
        settle().await;
        assert!(ba.is_released());
        assert!(!bb.is_released());
        assert!(!reg.global().is_released());
    }

    #[tokio::test]
    async fn test_shutdown_releases_everything() {
        let reg = registry();
        let owner = Lifecycle::new();
        let broker = reg.resolve_owner(&owner).unwrap();

        reg.shutdown();
        assert!(reg.is_shut_down());
        assert!(broker.is_released());
        assert!(reg.global().is_released());
        assert_eq!(reg.owner_count(), 0);
        assert_eq!(reg.resolve_owner(&owner).unwrap_err().as_label(), "bus_shut_down");
    }
}
