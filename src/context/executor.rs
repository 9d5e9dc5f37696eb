//! # Serial execution contexts for subscriber callbacks.
//!
//! ```text
//! broker.publish() ──► dispatch(Delivery) ──► [unbounded queue] ──► worker ──► callback(&E)
//!                                                                     │
//!                                                                     ├─ cancelled sub → skip
//!                                                                     ├─ gate closed   → skip
//!                                                                     ├─ wrong payload → TypeMismatch
//!                                                                     └─ panic         → CallbackPanicked
//! ```
//!
//! ## Rules
//! - **FIFO per context**: one worker drains the queue in enqueue order.
//! - **Non-blocking, lossless dispatch**: the queue is unbounded; a post never
//!   waits for a callback and never loses a delivery to a live worker.
//! - **Isolation**: a panicking callback is caught; the worker keeps draining.
//! - **Invalidation**: deliveries of a cancelled subscription, or of one whose
//!   gate has closed since they were queued, are skipped at run time.
//!
//! Callbacks run synchronously on the worker task. A slow callback delays only
//! the deliveries queued behind it on the same context.

use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::diagnostics::{DiagnosticBus, DiagnosticKind, panic_message};
use crate::error::{BusError, current_runtime};
use crate::events::Envelope;
use crate::subscription::Subscription;

/// One pending callback invocation.
pub(crate) struct Delivery {
    subscription: Arc<Subscription>,
    envelope: Envelope,
}

impl Delivery {
    pub(crate) fn new(subscription: Arc<Subscription>, envelope: Envelope) -> Self {
        Self {
            subscription,
            envelope,
        }
    }

    fn run(self, context: &Arc<str>, diagnostics: &DiagnosticBus) {
        let sub = &self.subscription;
        if sub.token.is_cancelled() || !sub.is_open() {
            return;
        }

        let callback = &sub.callback;
        let envelope = &self.envelope;
        match std::panic::catch_unwind(AssertUnwindSafe(|| (**callback)(envelope))) {
            Ok(true) => {}
            Ok(false) => diagnostics.publish(
                sub.diagnostic(DiagnosticKind::TypeMismatch)
                    .with_context(Arc::clone(context)),
            ),
            Err(panic_err) => diagnostics.publish(
                sub.diagnostic(DiagnosticKind::CallbackPanicked)
                    .with_context(Arc::clone(context))
                    .with_reason(panic_message(&*panic_err)),
            ),
        }
    }
}

struct Inner {
    name: Arc<str>,
    tx: mpsc::UnboundedSender<Delivery>,
    diagnostics: DiagnosticBus,
}

/// Named serial queue on which subscriber callbacks run.
///
/// Cheap to clone; clones share the same queue and worker.
#[derive(Clone)]
pub struct ExecutionContext {
    inner: Arc<Inner>,
}

impl ExecutionContext {
    /// Creates the queue and spawns its worker on the current tokio runtime.
    ///
    /// The worker exits when `token` is cancelled or every clone is dropped.
    pub(crate) fn spawn(
        name: impl Into<Arc<str>>,
        diagnostics: DiagnosticBus,
        token: CancellationToken,
    ) -> Result<Self, BusError> {
        let rt = current_runtime()?;
        let name: Arc<str> = name.into();
        let (tx, rx) = mpsc::unbounded_channel::<Delivery>();

        rt.spawn(drain(Arc::clone(&name), rx, diagnostics.clone(), token));
        Ok(Self {
            inner: Arc::new(Inner {
                name,
                tx,
                diagnostics,
            }),
        })
    }

    /// Context name (for diagnostics).
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// True once the worker has stopped.
    pub fn is_closed(&self) -> bool {
        self.inner.tx.is_closed()
    }

    /// True if both handles refer to the same queue.
    pub fn same_as(&self, other: &ExecutionContext) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Enqueues a delivery without blocking.
    ///
    /// Only fails once the worker has stopped; that is reported as `ContextClosed`.
    pub(crate) fn dispatch(&self, delivery: Delivery) {
        if let Err(mpsc::error::SendError(delivery)) = self.inner.tx.send(delivery) {
            self.inner.diagnostics.publish(
                delivery
                    .subscription
                    .diagnostic(DiagnosticKind::ContextClosed)
                    .with_context(Arc::clone(&self.inner.name)),
            );
        }
    }
}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("name", &self.inner.name)
            .field("closed", &self.is_closed())
            .finish()
    }
}

async fn drain(
    name: Arc<str>,
    mut rx: mpsc::UnboundedReceiver<Delivery>,
    diagnostics: DiagnosticBus,
    token: CancellationToken,
) {
    loop {
        let delivery = tokio::select! {
            biased;
            _ = token.cancelled() => break,
            next = rx.recv() => match next {
                Some(d) => d,
                None => break,
            },
        };
        delivery.run(&name, &diagnostics);
    }
    tracing::trace!(context = %name, "execution context stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Scope;
    use crate::events::{Event, TypeKey};
    use crate::lifecycle::Phase;
    use crate::subscription::{SubscriptionId, typed_callback};
    use std::sync::atomic::AtomicBool;
    use std::time::Duration;
    use tokio::sync::mpsc::UnboundedSender;

    struct Tick(u32);
    impl Event for Tick {
        const KEY: &'static str = "test.tick";
    }

    fn subscription(
        ctx: &ExecutionContext,
        tx: UnboundedSender<u32>,
    ) -> Arc<Subscription> {
        Arc::new(Subscription {
            id: SubscriptionId::next(),
            scope: Scope::Global,
            key: TypeKey::of::<Tick>(),
            min_phase: Phase::Initialized,
            context: ctx.clone(),
            sticky_replay: false,
            callback: typed_callback::<Tick, _>(move |t| {
                if t.0 == 0 {
                    panic!("tick zero");
                }
                let _ = tx.send(t.0);
            }),
            token: CancellationToken::new(),
            open: AtomicBool::new(true),
        })
    }

    fn tick(n: u32) -> Envelope {
        Envelope::new(TypeKey::of::<Tick>(), Tick(n), false)
    }

    #[tokio::test]
    async fn test_fifo_and_panic_isolation() {
        let diagnostics = DiagnosticBus::new(16);
        let mut faults = diagnostics.subscribe();
        let ctx = ExecutionContext::spawn("main", diagnostics, CancellationToken::new()).unwrap();
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let sub = subscription(&ctx, tx);

        for n in [1, 0, 2, 3] {
            ctx.dispatch(Delivery::new(Arc::clone(&sub), tick(n)));
        }

        assert_eq!(rx.recv().await, Some(1));
        assert_eq!(rx.recv().await, Some(2));
        assert_eq!(rx.recv().await, Some(3));

        let fault = faults.recv().await.unwrap();
        assert_eq!(fault.kind, DiagnosticKind::CallbackPanicked);
        assert_eq!(fault.subscription, Some(sub.id));
        assert_eq!(fault.context.as_deref(), Some("main"));
        assert_eq!(fault.reason.as_deref(), Some("tick zero"));
    }

    #[tokio::test]
    async fn test_cancelled_subscription_is_skipped() {
        let ctx = ExecutionContext::spawn("bg", DiagnosticBus::new(4), CancellationToken::new()).unwrap();
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let sub = subscription(&ctx, tx);

        sub.token.cancel();
        ctx.dispatch(Delivery::new(Arc::clone(&sub), tick(9)));

        let got = tokio::time::timeout(Duration::from_millis(50), rx.recv()).await;
        assert!(got.is_err());
    }

    #[tokio::test]
    async fn test_closed_gate_skips_queued_delivery() {
        let ctx = ExecutionContext::spawn("bg", DiagnosticBus::new(4), CancellationToken::new()).unwrap();
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let sub = subscription(&ctx, tx);

        ctx.dispatch(Delivery::new(Arc::clone(&sub), tick(4)));
        sub.set_open(false);
        ctx.dispatch(Delivery::new(Arc::clone(&sub), tick(5)));

        let got = tokio::time::timeout(Duration::from_millis(50), rx.recv()).await;
        assert!(got.is_err());
    }

    #[tokio::test]
    async fn test_burst_without_yield_is_delivered_in_order() {
        let ctx = ExecutionContext::spawn("burst", DiagnosticBus::new(4), CancellationToken::new()).unwrap();
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let sub = subscription(&ctx, tx);

        // current_thread runtime: the worker cannot drain until we yield.
        for n in 1..=5000 {
            ctx.dispatch(Delivery::new(Arc::clone(&sub), tick(n)));
        }
        for n in 1..=5000 {
            assert_eq!(rx.recv().await, Some(n));
        }
    }

    #[tokio::test]
    async fn test_stops_on_cancel() {
        let token = CancellationToken::new();
        let ctx = ExecutionContext::spawn("short", DiagnosticBus::new(4), token.clone()).unwrap();
        assert!(!ctx.is_closed());
        assert!(ctx.same_as(&ctx.clone()));

        token.cancel();
        tokio::time::timeout(Duration::from_secs(1), async {
            while !ctx.is_closed() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
    }
}
