//! # Subscription record.
//!
//! A [`Subscription`] is owned by its broker. Everything here is immutable
//! after creation except the `open` flag; the gate itself lives next to it
//! inside the broker state, under the per-scope lock, and mirrors its state
//! into `open` so context workers can check it without that lock.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering as AtomicOrdering};

use tokio_util::sync::CancellationToken;

use crate::context::ExecutionContext;
use crate::core::Scope;
use crate::diagnostics::{Diagnostic, DiagnosticKind};
use crate::events::{Envelope, Event, TypeKey};
use crate::lifecycle::Phase;

/// Global subscription id counter.
static SUBSCRIPTION_SEQ: AtomicU64 = AtomicU64::new(1);

/// Identity of a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    pub(crate) fn next() -> Self {
        Self(SUBSCRIPTION_SEQ.fetch_add(1, AtomicOrdering::Relaxed))
    }

    /// Raw numeric id.
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub#{}", self.0)
    }
}

/// Type-erased callback. Returns `false` when the payload is not of the expected type.
pub(crate) type Callback = Arc<dyn Fn(&Envelope) -> bool + Send + Sync>;

/// Wraps a typed callback so it can be stored next to callbacks of other types.
pub(crate) fn typed_callback<E, F>(f: F) -> Callback
where
    E: Event,
    F: Fn(&E) + Send + Sync + 'static,
{
    Arc::new(move |env: &Envelope| match env.downcast_ref::<E>() {
        Some(ev) => {
            f(ev);
            true
        }
        None => false,
    })
}

/// Subscription owned by a broker.
pub(crate) struct Subscription {
    pub(crate) id: SubscriptionId,
    pub(crate) scope: Scope,
    pub(crate) key: TypeKey,
    pub(crate) min_phase: Phase,
    pub(crate) context: ExecutionContext,
    pub(crate) sticky_replay: bool,
    pub(crate) callback: Callback,
    /// Cancelled on termination; deliveries check it right before running.
    pub(crate) token: CancellationToken,
    /// True while the gate is Active. Written by the broker under its lock.
    pub(crate) open: AtomicBool,
}

impl Subscription {
    pub(crate) fn is_open(&self) -> bool {
        self.open.load(AtomicOrdering::Acquire)
    }

    pub(crate) fn set_open(&self, open: bool) {
        self.open.store(open, AtomicOrdering::Release);
    }

    /// Diagnostic pre-filled with this subscription's scope, key and id.
    pub(crate) fn diagnostic(&self, kind: DiagnosticKind) -> Diagnostic {
        Diagnostic::new(kind)
            .with_scope(self.scope)
            .with_key(self.key.clone())
            .with_subscription(self.id)
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("scope", &self.scope)
            .field("key", &self.key)
            .field("min_phase", &self.min_phase)
            .field("context", &self.context.name())
            .field("sticky_replay", &self.sticky_replay)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Hello(&'static str);
    impl Event for Hello {
        const KEY: &'static str = "test.hello";
    }

    struct Num(#[allow(dead_code)] u8);
    impl Event for Num {
        const KEY: &'static str = "test.num";
    }

    #[test]
    fn test_typed_callback_rejects_foreign_payload() {
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let cb = typed_callback::<Hello, _>(move |h| sink.lock().unwrap().push(h.0));

        assert!(cb(&Envelope::new(TypeKey::of::<Hello>(), Hello("a"), false)));
        assert!(!cb(&Envelope::new(TypeKey::of::<Hello>(), Num(5), false)));
        assert_eq!(*seen.lock().unwrap(), vec!["a"]);
    }

    #[test]
    fn test_ids_are_unique() {
        assert_ne!(SubscriptionId::next(), SubscriptionId::next());
    }
}
