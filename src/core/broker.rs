//! # Scoped broker: subscriptions, gates and sticky cache of one scope.
//!
//! ```text
//! publish(envelope)
//!   lock ─► sticky? overwrite cache ─► for each sub[key] with open gate:
//!   │                                      context.dispatch(Delivery)   (non-blocking)
//!   unlock
//!                                   callbacks run later on their context workers
//!
//! apply_phase(sub, phase)
//!   lock ─► gate.on_phase(phase)
//!   │        ├─ Activated{first} + sticky_replay ─► dispatch cached envelope once
//!   │        ├─ Suspended                        ─► later posts skip this sub,
//!   │        │                                      queued ones are skipped on the worker
//!   │        └─ Terminated                       ─► remove entry, cancel token
//!   unlock
//! ```
//!
//! ## Rules
//! - All mutations of one scope's subscriber set and sticky cache happen under
//!   that broker's own lock; different scopes never contend.
//! - Callbacks never run under the lock. Holding it only covers non-blocking
//!   enqueues, which also fixes the relative order of deliveries per context.
//! - A released broker accepts nothing: registration fails, posts are no-ops.
//! - A poisoned lock means an invariant was broken; it panics.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio_util::sync::CancellationToken;

use super::scope::Scope;
use super::sticky::StickyCache;
use crate::context::Delivery;
use crate::diagnostics::{Diagnostic, DiagnosticBus, DiagnosticKind};
use crate::events::{Envelope, TypeKey};
use crate::lifecycle::{Gate, GateState, Phase, Transition};
use crate::subscription::{Subscription, SubscriptionId};

/// A subscription together with its gate.
struct Entry {
    sub: Arc<Subscription>,
    gate: Gate,
}

#[derive(Default)]
struct BrokerState {
    released: bool,
    subs: HashMap<TypeKey, Vec<Entry>>,
    sticky: StickyCache,
}

/// Broker of one scope. Exclusively owned by its registry entry.
pub(crate) struct Broker {
    scope: Scope,
    /// Parent of every subscription token in this scope.
    token: CancellationToken,
    diagnostics: DiagnosticBus,
    state: Mutex<BrokerState>,
}

impl std::fmt::Debug for Broker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Broker").field("scope", &self.scope).finish_non_exhaustive()
    }
}

impl Broker {
    pub(crate) fn new(scope: Scope, token: CancellationToken, diagnostics: DiagnosticBus) -> Arc<Self> {
        Arc::new(Self {
            scope,
            token,
            diagnostics,
            state: Mutex::new(BrokerState::default()),
        })
    }

    pub(crate) fn scope(&self) -> Scope {
        self.scope
    }

    pub(crate) fn token(&self) -> &CancellationToken {
        &self.token
    }

    fn lock(&self) -> MutexGuard<'_, BrokerState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(_) => panic!("broker state of {} poisoned", self.scope),
        }
    }

    fn closed(&self, st: &BrokerState) -> bool {
        st.released || self.token.is_cancelled()
    }

    pub(crate) fn is_released(&self) -> bool {
        let st = self.lock();
        self.closed(&st)
    }

    /// Adds a subscription and feeds it the owner's current phase.
    ///
    /// Returns `false` if the broker was already released.
    pub(crate) fn register(&self, sub: Arc<Subscription>, phase: Phase) -> bool {
        let mut st = self.lock();
        if self.closed(&st) {
            return false;
        }
        let key = sub.key.clone();
        let id = sub.id;
        st.subs.entry(key.clone()).or_default().push(Entry {
            gate: Gate::new(sub.min_phase),
            sub,
        });
        self.transition_locked(&mut st, &key, id, phase);
        true
    }

    /// Feeds a phase change to one subscription's gate.
    pub(crate) fn apply_phase(&self, key: &TypeKey, id: SubscriptionId, phase: Phase) -> GateState {
        let mut st = self.lock();
        self.transition_locked(&mut st, key, id, phase)
    }

    fn transition_locked(
        &self,
        st: &mut BrokerState,
        key: &TypeKey,
        id: SubscriptionId,
        phase: Phase,
    ) -> GateState {
        let BrokerState { subs, sticky, .. } = st;
        let Some(entries) = subs.get_mut(key) else {
            return GateState::Terminated;
        };
        let Some(pos) = entries.iter().position(|e| e.sub.id == id) else {
            return GateState::Terminated;
        };

        let entry = &mut entries[pos];
        match entry.gate.on_phase(phase) {
            Transition::Activated { first } => {
                entry.sub.set_open(true);
                tracing::trace!(scope = %self.scope, %key, sub = %id, %phase, first, "gate active");
                if first && entry.sub.sticky_replay {
                    if let Some(env) = sticky.get(key) {
                        entry
                            .sub
                            .context
                            .dispatch(Delivery::new(Arc::clone(&entry.sub), env.clone()));
                    }
                }
                GateState::Active
            }
            Transition::Suspended => {
                entry.sub.set_open(false);
                tracing::trace!(scope = %self.scope, %key, sub = %id, %phase, "gate suspended");
                GateState::Suspended
            }
            Transition::Terminated => {
                let entry = entries.swap_remove(pos);
                if entries.is_empty() {
                    subs.remove(key);
                }
                self.finish(&entry.sub);
                GateState::Terminated
            }
            Transition::Unchanged => entry.gate.state(),
        }
    }

    /// Terminates one subscription (cancellation path). Returns `false` if it was already gone.
    pub(crate) fn terminate(&self, key: &TypeKey, id: SubscriptionId) -> bool {
        let mut st = self.lock();
        let Some(entries) = st.subs.get_mut(key) else {
            return false;
        };
        let Some(pos) = entries.iter().position(|e| e.sub.id == id) else {
            return false;
        };
        let mut entry = entries.swap_remove(pos);
        if entries.is_empty() {
            st.subs.remove(key);
        }
        drop(st);

        entry.gate.terminate();
        self.finish(&entry.sub);
        true
    }

    fn finish(&self, sub: &Subscription) {
        sub.set_open(false);
        sub.token.cancel();
        self.diagnostics
            .publish(sub.diagnostic(DiagnosticKind::SubscriptionTerminated));
    }

    pub(crate) fn gate_state(&self, key: &TypeKey, id: SubscriptionId) -> Option<GateState> {
        let st = self.lock();
        st.subs
            .get(key)?
            .iter()
            .find(|e| e.sub.id == id)
            .map(|e| e.gate.state())
    }

    /// Fans an envelope out to every open subscription of its key.
    ///
    /// Returns the number of enqueued deliveries, or `None` if the broker is released.
    pub(crate) fn publish(&self, envelope: Envelope) -> Option<usize> {
        let mut st = self.lock();
        if self.closed(&st) {
            return None;
        }
        if envelope.sticky {
            st.sticky.put(envelope.clone());
        }

        let Some(entries) = st.subs.get(&envelope.key) else {
            return Some(0);
        };
        let mut delivered = 0;
        for entry in entries
            .iter()
            .filter(|e| e.gate.is_open() && !e.sub.token.is_cancelled())
        {
            entry
                .sub
                .context
                .dispatch(Delivery::new(Arc::clone(&entry.sub), envelope.clone()));
            delivered += 1;
        }
        Some(delivered)
    }

    pub(crate) fn sticky(&self, key: &TypeKey) -> Option<Envelope> {
        self.lock().sticky.get(key).cloned()
    }

    pub(crate) fn remove_sticky(&self, key: &TypeKey, seq: u64) -> bool {
        self.lock().sticky.remove_own(key, seq)
    }

    pub(crate) fn clear_sticky(&self, key: &TypeKey) -> bool {
        self.lock().sticky.clear(key)
    }

    pub(crate) fn subscription_count(&self, key: &TypeKey) -> usize {
        self.lock().subs.get(key).map_or(0, Vec::len)
    }

    /// Tears the scope down: terminates every subscription and drops the sticky cache.
    ///
    /// Idempotent; returns the number of subscriptions cancelled by this call.
    pub(crate) fn release(&self, reason: &str) -> usize {
        let (drained, sticky): (Vec<Entry>, usize) = {
            let mut st = self.lock();
            if st.released {
                return 0;
            }
            st.released = true;
            let sticky = st.sticky.len();
            st.sticky.clear_all();
            (st.subs.drain().flat_map(|(_, entries)| entries).collect(), sticky)
        };
        self.token.cancel();

        let count = drained.len();
        for mut entry in drained {
            entry.gate.terminate();
            self.finish(&entry.sub);
        }

        tracing::debug!(scope = %self.scope, cancelled = count, sticky, reason, "scope released");
        self.diagnostics.publish(
            Diagnostic::new(DiagnosticKind::ScopeReleased)
                .with_scope(self.scope)
                .with_reason(format!("{reason}; {count} subscriptions cancelled")),
        );
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ExecutionContext;
    use crate::events::Event;
    use crate::subscription::typed_callback;
    use std::sync::atomic::AtomicBool;
    use std::time::Duration;
    use tokio::sync::mpsc::{UnboundedReceiver, unbounded_channel};

    struct Note(&'static str);
    impl Event for Note {
        const KEY: &'static str = "test.note";
    }

    struct Fixture {
        broker: Arc<Broker>,
        ctx: ExecutionContext,
    }

    impl Fixture {
        fn new() -> Self {
            let diagnostics = DiagnosticBus::new(64);
            let root = CancellationToken::new();
            let ctx = ExecutionContext::spawn("main", diagnostics.clone(), root.clone()).unwrap();
            let broker = Broker::new(Scope::Global, root.child_token(), diagnostics);
            Self { broker, ctx }
        }

        fn sub(&self, min: Phase, sticky: bool) -> (Arc<Subscription>, UnboundedReceiver<&'static str>) {
            let (tx, rx) = unbounded_channel();
            let sub = Arc::new(Subscription {
                id: SubscriptionId::next(),
                scope: self.broker.scope(),
                key: TypeKey::of::<Note>(),
                min_phase: min,
                context: self.ctx.clone(),
                sticky_replay: sticky,
                callback: typed_callback::<Note, _>(move |n| {
                    let _ = tx.send(n.0);
                }),
                token: self.broker.token().child_token(),
                open: AtomicBool::new(false),
            });
            (sub, rx)
        }
    }

    fn note(text: &'static str, sticky: bool) -> Envelope {
        Envelope::new(TypeKey::of::<Note>(), Note(text), sticky)
    }

    async fn next(rx: &mut UnboundedReceiver<&'static str>) -> Option<&'static str> {
        tokio::time::timeout(Duration::from_millis(200), rx.recv())
            .await
            .ok()
            .flatten()
    }

    #[tokio::test]
    async fn test_non_sticky_post_without_subscribers_is_discarded() {
        let f = Fixture::new();
        assert_eq!(f.broker.publish(note("lost", false)), Some(0));
        assert!(f.broker.sticky(&TypeKey::of::<Note>()).is_none());
    }

    #[tokio::test]
    async fn test_sticky_replay_waits_for_min_phase() {
        let f = Fixture::new();
        f.broker.publish(note("cached", true));

        let (sub, mut rx) = f.sub(Phase::Resumed, true);
        let (key, id) = (sub.key.clone(), sub.id);
        assert!(f.broker.register(sub, Phase::Started));
        assert_eq!(f.broker.gate_state(&key, id), Some(GateState::Idle));
        assert_eq!(next(&mut rx).await, None);

        assert_eq!(f.broker.apply_phase(&key, id, Phase::Resumed), GateState::Active);
        assert_eq!(next(&mut rx).await, Some("cached"));
        assert_eq!(next(&mut rx).await, None);
    }

    #[tokio::test]
    async fn test_suspended_posts_are_dropped_and_replay_is_one_time() {
        let f = Fixture::new();
        let (sub, mut rx) = f.sub(Phase::Started, true);
        let (key, id) = (sub.key.clone(), sub.id);
        assert!(f.broker.register(sub, Phase::Started));

        assert_eq!(f.broker.publish(note("one", true)), Some(1));
        assert_eq!(next(&mut rx).await, Some("one"));

        assert_eq!(f.broker.apply_phase(&key, id, Phase::Created), GateState::Suspended);
        assert_eq!(f.broker.publish(note("while-paused", true)), Some(0));

        assert_eq!(f.broker.apply_phase(&key, id, Phase::Resumed), GateState::Active);
        assert_eq!(next(&mut rx).await, None);

        f.broker.publish(note("two", false));
        assert_eq!(next(&mut rx).await, Some("two"));
    }

    #[tokio::test]
    async fn test_queued_delivery_is_skipped_once_gate_suspends() {
        let f = Fixture::new();
        let (sub, mut rx) = f.sub(Phase::Started, false);
        let (key, id) = (sub.key.clone(), sub.id);
        assert!(f.broker.register(sub, Phase::Resumed));

        // Enqueued while Active; the worker has not run yet.
        assert_eq!(f.broker.publish(note("in-queue", false)), Some(1));
        assert_eq!(f.broker.apply_phase(&key, id, Phase::Created), GateState::Suspended);
        assert_eq!(next(&mut rx).await, None);

        assert_eq!(f.broker.apply_phase(&key, id, Phase::Started), GateState::Active);
        f.broker.publish(note("live", false));
        assert_eq!(next(&mut rx).await, Some("live"));
    }

    #[tokio::test]
    async fn test_terminal_phase_removes_subscription() {
        let f = Fixture::new();
        let (sub, _rx) = f.sub(Phase::Created, false);
        let token = sub.token.clone();
        let (key, id) = (sub.key.clone(), sub.id);
        f.broker.register(sub, Phase::Resumed);
        assert_eq!(f.broker.subscription_count(&key), 1);

        assert_eq!(f.broker.apply_phase(&key, id, Phase::Destroyed), GateState::Terminated);
        assert_eq!(f.broker.subscription_count(&key), 0);
        assert!(token.is_cancelled());
        assert!(!f.broker.terminate(&key, id));
    }

    #[tokio::test]
    async fn test_release_cancels_everything_and_is_idempotent() {
        let f = Fixture::new();
        let (a, _ra) = f.sub(Phase::Created, false);
        let (b, _rb) = f.sub(Phase::Created, false);
        let tokens = [a.token.clone(), b.token.clone()];
        f.broker.register(a, Phase::Resumed);
        f.broker.register(b, Phase::Initialized);
        f.broker.publish(note("kept", true));

        assert_eq!(f.broker.release("test"), 2);
        assert_eq!(f.broker.release("test"), 0);
        assert!(tokens.iter().all(CancellationToken::is_cancelled));
        assert!(f.broker.is_released());
        assert_eq!(f.broker.publish(note("late", false)), None);
        assert!(f.broker.sticky(&TypeKey::of::<Note>()).is_none());

        let (c, _rc) = f.sub(Phase::Created, false);
        assert!(!f.broker.register(c, Phase::Resumed));
    }

    #[tokio::test]
    async fn test_sticky_removal() {
        let f = Fixture::new();
        let key = TypeKey::of::<Note>();
        let first = note("a", true);
        let first_seq = first.seq;
        f.broker.publish(first);
        f.broker.publish(note("b", true));

        assert!(!f.broker.remove_sticky(&key, first_seq));
        assert!(f.broker.sticky(&key).is_some());
        assert!(f.broker.clear_sticky(&key));
        assert!(f.broker.sticky(&key).is_none());
    }
}
