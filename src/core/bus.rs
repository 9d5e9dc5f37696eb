//! # EventBus: the public facade.
//!
//! [`EventBus`] ties the registry, the delay scheduler and the execution
//! contexts together and exposes subscribe/post/sticky operations.
//!
//! ## Subscribe
//! ```text
//! subscribe_scoped(owner, opts, cb)
//!   ├─► registry.resolve_owner(owner)        (lazy, one broker per scope)
//!   ├─► Subscription { key, min_phase, context, sticky, cb, token = broker.child }
//!   ├─► broker.register(sub, owner.current)  (gate fed synchronously, may replay sticky)
//!   └─► spawn GateDriver(owner.watch())      (feeds later phase changes)
//!
//! subscribe_global(owner, ..)   same, on the global broker, gated by `owner`
//! subscribe_detached(scope, ..) global broker, background context, always open
//! ```
//!
//! ## Post
//! ```text
//! post_with(target, event, opts)
//!   ├─► delay == 0 ─► broker.publish(envelope)        (before returning)
//!   └─► delay  > 0 ─► scheduler.schedule(delay, {
//!                        broker alive? publish : DelayedPostDropped })
//! ```
//!
//! ## Rules
//! - A post to an owner that is already destroyed is discarded; no broker is created.
//! - Sticky lookups and removals never create a broker.
//! - Dropping the last `EventBus` clone shuts everything down.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use super::broker::Broker;
use super::builder::EventBusBuilder;
use super::config::BusConfig;
use super::driver::{GateDriver, PhaseSource};
use super::options::{PostOptions, PostReceipt, SubscribeOptions};
use super::registry::BrokerRegistry;
use super::scheduler::DelayScheduler;
use super::scope::Target;
use crate::context::ExecutionContext;
use crate::diagnostics::{Diagnostic, DiagnosticBus, DiagnosticKind};
use crate::error::{BusError, current_runtime};
use crate::events::{Envelope, Event, TypeKey};
use crate::lifecycle::{Lifecycle, LifecycleOwner, Phase};
use crate::subscription::{
    Callback, Subscription, SubscriptionHandle, SubscriptionId, TaskHandle, typed_callback,
};

struct Inner {
    cfg: BusConfig,
    root: CancellationToken,
    diagnostics: DiagnosticBus,
    registry: Arc<BrokerRegistry>,
    scheduler: DelayScheduler,
    main: ExecutionContext,
    background: ExecutionContext,
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.root.cancel();
    }
}

/// Scoped, lifecycle-aware publish/subscribe bus.
///
/// Cheap to clone; clones share the same registry and contexts. Each bus is an
/// isolated world: two buses never see each other's scopes or sticky events.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus").finish_non_exhaustive()
    }
}

/// Everything a new subscription needs except its broker.
struct Draft {
    key: TypeKey,
    min_phase: Phase,
    context: ExecutionContext,
    sticky_replay: bool,
    callback: Callback,
}

impl Draft {
    fn bind(&self, broker: &Broker) -> Arc<Subscription> {
        Arc::new(Subscription {
            id: SubscriptionId::next(),
            scope: broker.scope(),
            key: self.key.clone(),
            min_phase: self.min_phase,
            context: self.context.clone(),
            sticky_replay: self.sticky_replay,
            callback: Arc::clone(&self.callback),
            token: broker.token().child_token(),
            open: AtomicBool::new(false),
        })
    }
}

impl EventBus {
    /// Creates a bus with the given configuration and no diagnostic sinks.
    ///
    /// Must be called inside a tokio runtime.
    pub fn new(cfg: BusConfig) -> Result<Self, BusError> {
        EventBusBuilder::new(cfg).build()
    }

    /// Returns a builder for a bus with diagnostic sinks.
    pub fn builder(cfg: BusConfig) -> EventBusBuilder {
        EventBusBuilder::new(cfg)
    }

    pub(crate) fn from_parts(
        cfg: BusConfig,
        root: CancellationToken,
        diagnostics: DiagnosticBus,
        registry: Arc<BrokerRegistry>,
        scheduler: DelayScheduler,
        main: ExecutionContext,
        background: ExecutionContext,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                cfg,
                root,
                diagnostics,
                registry,
                scheduler,
                main,
                background,
            }),
        }
    }

    pub fn config(&self) -> &BusConfig {
        &self.inner.cfg
    }

    /// Default context of lifecycle-bound subscriptions.
    pub fn main_context(&self) -> &ExecutionContext {
        &self.inner.main
    }

    /// Default context of detached subscriptions.
    pub fn background_context(&self) -> &ExecutionContext {
        &self.inner.background
    }

    /// Creates an additional named context owned by this bus.
    pub fn context(&self, name: &str) -> Result<ExecutionContext, BusError> {
        self.ensure_running()?;
        ExecutionContext::spawn(
            name,
            self.inner.diagnostics.clone(),
            self.inner.root.child_token(),
        )
    }

    /// Receiver of diagnostics published after this call.
    pub fn diagnostics(&self) -> broadcast::Receiver<Diagnostic> {
        self.inner.diagnostics.subscribe()
    }

    fn ensure_running(&self) -> Result<(), BusError> {
        if self.inner.registry.is_shut_down() {
            return Err(BusError::ShutDown);
        }
        Ok(())
    }

    fn draft<E, F>(&self, opts: SubscribeOptions, callback: F) -> Draft
    where
        E: Event,
        F: Fn(&E) + Send + Sync + 'static,
    {
        Draft {
            key: opts.key.unwrap_or_else(TypeKey::of::<E>),
            min_phase: opts.min_phase.unwrap_or(self.inner.cfg.default_min_phase),
            context: opts.context.unwrap_or_else(|| self.inner.main.clone()),
            sticky_replay: opts.sticky,
            callback: typed_callback::<E, F>(callback),
        }
    }

    /// Registers on `broker` and starts a driver fed by `owner`.
    ///
    /// Returns `None` if the broker was released in the meantime.
    fn attach(
        &self,
        broker: &Arc<Broker>,
        owner: &Lifecycle,
        draft: &Draft,
    ) -> Result<Option<SubscriptionHandle>, BusError> {
        let rt = current_runtime()?;
        let sub = draft.bind(broker);
        let phases = owner.watch();
        let phase = *phases.borrow();

        if !broker.register(Arc::clone(&sub), phase) {
            return Ok(None);
        }
        tracing::trace!(scope = %sub.scope, key = %sub.key, sub = %sub.id, %phase, "subscribed");

        let handle = SubscriptionHandle::new(&sub, broker);
        let driver = GateDriver::new(Arc::clone(broker), &sub, PhaseSource::Owner(phases));
        rt.spawn(driver.run());
        Ok(Some(handle))
    }

    /// Subscribes in the global scope, gated by `owner`'s lifecycle.
    ///
    /// Delivery starts once `owner` reaches the minimum phase and the
    /// subscription ends when `owner` is destroyed.
    pub fn subscribe_global<E, F>(
        &self,
        owner: &dyn LifecycleOwner,
        opts: SubscribeOptions,
        callback: F,
    ) -> Result<SubscriptionHandle, BusError>
    where
        E: Event,
        F: Fn(&E) + Send + Sync + 'static,
    {
        self.ensure_running()?;
        let lifecycle = owner.lifecycle();
        if lifecycle.current().is_terminal() {
            return Err(BusError::OwnerDestroyed { owner: lifecycle.id() });
        }
        let draft = self.draft::<E, F>(opts, callback);
        self.attach(self.inner.registry.global(), lifecycle, &draft)?
            .ok_or(BusError::ShutDown)
    }

    /// Subscribes in `owner`'s own scope, gated by its lifecycle.
    ///
    /// Only posts targeted at this owner are delivered.
    pub fn subscribe_scoped<E, F>(
        &self,
        owner: &dyn LifecycleOwner,
        opts: SubscribeOptions,
        callback: F,
    ) -> Result<SubscriptionHandle, BusError>
    where
        E: Event,
        F: Fn(&E) + Send + Sync + 'static,
    {
        let lifecycle = owner.lifecycle();
        let draft = self.draft::<E, F>(opts, callback);
        loop {
            let broker = self.inner.registry.resolve_owner(lifecycle)?;
            if let Some(handle) = self.attach(&broker, lifecycle, &draft)? {
                return Ok(handle);
            }
            // released between resolve and register; the next resolve yields a fresh broker
        }
    }

    /// Subscribes in the global scope for as long as `scope` is not cancelled.
    ///
    /// No phase gating: the subscription is active right away. Callbacks run on
    /// the background context.
    pub fn subscribe_detached<E, F>(
        &self,
        scope: &CancellationToken,
        sticky: bool,
        callback: F,
    ) -> Result<TaskHandle, BusError>
    where
        E: Event,
        F: Fn(&E) + Send + Sync + 'static,
    {
        self.ensure_running()?;
        let rt = current_runtime()?;
        let opts = SubscribeOptions {
            min_phase: Some(Phase::Initialized),
            context: Some(self.inner.background.clone()),
            sticky,
            key: None,
        };
        let draft = self.draft::<E, F>(opts, callback);
        let broker = self.inner.registry.global();
        let sub = draft.bind(broker);

        if !broker.register(Arc::clone(&sub), Phase::Resumed) {
            return Err(BusError::ShutDown);
        }
        let handle = SubscriptionHandle::new(&sub, broker);
        let driver = GateDriver::new(Arc::clone(broker), &sub, PhaseSource::Detached(scope.clone()));
        Ok(TaskHandle::new(handle, rt.spawn(driver.run())))
    }

    /// Posts `event` to the global scope immediately, without sticky caching.
    pub fn post<E: Event>(&self, event: E) -> Result<PostReceipt, BusError> {
        self.post_with(Target::Global, event, PostOptions::default())
    }

    /// Posts `event` to `target`.
    ///
    /// With a zero delay the event is enqueued on every open subscriber's
    /// context before this returns. Otherwise it is scheduled and this returns
    /// at once; if the target scope is gone when the timer fires, the post is
    /// dropped and reported as `DelayedPostDropped`.
    pub fn post_with<E: Event>(
        &self,
        target: Target<'_>,
        event: E,
        opts: PostOptions,
    ) -> Result<PostReceipt, BusError> {
        self.ensure_running()?;
        let key = opts.key.unwrap_or_else(TypeKey::of::<E>);
        let envelope = Envelope::new(key.clone(), event, opts.sticky);
        let receipt = PostReceipt {
            scope: target.scope(),
            key: key.clone(),
            seq: envelope.seq,
        };

        let Some(broker) = self.resolve_target(target)? else {
            tracing::trace!(scope = %receipt.scope, %key, "post to destroyed scope discarded");
            if !opts.delay.is_zero() {
                self.inner.diagnostics.publish(
                    Diagnostic::new(DiagnosticKind::DelayedPostDropped)
                        .with_scope(receipt.scope)
                        .with_key(key)
                        .with_reason("scope destroyed before scheduling"),
                );
            }
            return Ok(receipt);
        };

        if opts.delay.is_zero() {
            broker.publish(envelope);
            return Ok(receipt);
        }

        let weak = Arc::downgrade(&broker);
        let diagnostics = self.inner.diagnostics.clone();
        let scope = receipt.scope;
        self.inner.scheduler.schedule(&key, opts.delay, move || {
            let key = envelope.key.clone();
            if weak.upgrade().and_then(|b| b.publish(envelope)).is_none() {
                tracing::trace!(%scope, %key, "delayed post dropped");
                diagnostics.publish(
                    Diagnostic::new(DiagnosticKind::DelayedPostDropped)
                        .with_scope(scope)
                        .with_key(key)
                        .with_reason("scope destroyed before delivery"),
                );
            }
        })?;
        Ok(receipt)
    }

    /// Resolves the broker a post goes to; `None` if the owner is already destroyed.
    fn resolve_target(&self, target: Target<'_>) -> Result<Option<Arc<Broker>>, BusError> {
        match target {
            Target::Global => Ok(Some(Arc::clone(self.inner.registry.global()))),
            Target::Owner(owner) => match self.inner.registry.resolve_owner(owner.lifecycle()) {
                Ok(broker) => Ok(Some(broker)),
                Err(BusError::OwnerDestroyed { .. }) => Ok(None),
                Err(e) => Err(e),
            },
        }
    }

    /// Latest sticky `E` cached in `target`'s scope.
    pub fn sticky<E: Event>(&self, target: Target<'_>) -> Option<Arc<E>> {
        self.sticky_key(target, &TypeKey::of::<E>())?.downcast_arc::<E>()
    }

    /// Latest sticky envelope cached under `key` in `target`'s scope.
    pub fn sticky_key(&self, target: Target<'_>, key: &TypeKey) -> Option<Envelope> {
        self.inner.registry.lookup(target.scope())?.sticky(key)
    }

    /// Removes the sticky entry created by the post behind `receipt`.
    ///
    /// Does nothing if a newer sticky post has replaced it since.
    pub fn remove_sticky(&self, receipt: &PostReceipt) -> bool {
        self.inner
            .registry
            .lookup(receipt.scope)
            .is_some_and(|b| b.remove_sticky(&receipt.key, receipt.seq))
    }

    /// Removes the sticky `E` of `target`'s scope, whoever posted it.
    pub fn clear_sticky<E: Event>(&self, target: Target<'_>) -> bool {
        self.clear_sticky_key(target, &TypeKey::of::<E>())
    }

    /// Removes the sticky entry under `key` of `target`'s scope, whoever posted it.
    pub fn clear_sticky_key(&self, target: Target<'_>, key: &TypeKey) -> bool {
        self.inner
            .registry
            .lookup(target.scope())
            .is_some_and(|b| b.clear_sticky(key))
    }

    /// Tears down `owner`'s scope now, without waiting for it to be destroyed.
    ///
    /// Returns the number of subscriptions cancelled. The next post or
    /// subscribe for this owner starts from a fresh, empty scope.
    pub fn release(&self, owner: &dyn LifecycleOwner) -> usize {
        self.inner
            .registry
            .release(owner.lifecycle().id(), "released by caller")
    }

    /// Stops the bus: releases every scope, drops pending delayed posts and
    /// stops all contexts. Returns the number of subscriptions cancelled.
    pub fn shutdown(&self) -> usize {
        let cancelled = self.inner.registry.shutdown();
        self.inner.root.cancel();
        tracing::debug!(cancelled, "event bus shut down");
        cancelled
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.registry.is_shut_down()
    }

    /// Number of live owner scopes (the global scope is not counted).
    pub fn broker_count(&self) -> usize {
        self.inner.registry.owner_count()
    }

    /// Number of live subscriptions to `E` in `target`'s scope.
    pub fn subscriber_count<E: Event>(&self, target: Target<'_>) -> usize {
        self.inner
            .registry
            .lookup(target.scope())
            .map_or(0, |b| b.subscription_count(&TypeKey::of::<E>()))
    }
}
