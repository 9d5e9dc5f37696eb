//! # Handles returned to subscribers.
//!
//! A [`SubscriptionHandle`] only signals intent. It holds the subscription's
//! cancellation token and a weak reference to the broker for read-only
//! queries; it never keeps the subscription alive and never edits broker
//! state. Dropping a handle does **not** cancel the subscription; the owner's
//! lifecycle still governs it.

use std::fmt;
use std::sync::{Arc, Weak};

use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;

use super::record::{Subscription, SubscriptionId};
use crate::core::{Broker, Scope};
use crate::events::TypeKey;
use crate::lifecycle::GateState;

/// Cancellation handle of a lifecycle-bound subscription.
#[derive(Clone)]
pub struct SubscriptionHandle {
    id: SubscriptionId,
    scope: Scope,
    key: TypeKey,
    token: CancellationToken,
    broker: Weak<Broker>,
}

impl SubscriptionHandle {
    pub(crate) fn new(sub: &Subscription, broker: &Arc<Broker>) -> Self {
        Self {
            id: sub.id,
            scope: sub.scope,
            key: sub.key.clone(),
            token: sub.token.clone(),
            broker: Arc::downgrade(broker),
        }
    }

    /// Subscription id.
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Scope the subscription lives in.
    pub fn scope(&self) -> Scope {
        self.scope
    }

    /// Key the subscription listens to.
    pub fn key(&self) -> &TypeKey {
        &self.key
    }

    /// Requests termination. Deliveries not yet started are skipped; one already
    /// running on the context may still finish.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// True once cancellation was requested or the subscription terminated.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Current gate state; `Terminated` once the broker no longer holds the subscription.
    pub fn gate_state(&self) -> GateState {
        self.broker
            .upgrade()
            .and_then(|b| b.gate_state(&self.key, self.id))
            .unwrap_or(GateState::Terminated)
    }

    /// Resolves when the subscription has been cancelled or terminated.
    pub async fn cancelled(&self) {
        self.token.cancelled().await;
    }
}

impl fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionHandle")
            .field("id", &self.id)
            .field("scope", &self.scope)
            .field("key", &self.key)
            .field("cancelled", &self.token.is_cancelled())
            .finish()
    }
}

/// Handle of a detached subscription: its driver task plus cancellation.
pub struct TaskHandle {
    subscription: SubscriptionHandle,
    join: JoinHandle<()>,
}

impl TaskHandle {
    pub(crate) fn new(subscription: SubscriptionHandle, join: JoinHandle<()>) -> Self {
        Self { subscription, join }
    }

    /// The underlying subscription handle.
    pub fn subscription(&self) -> &SubscriptionHandle {
        &self.subscription
    }

    /// Requests termination.
    pub fn cancel(&self) {
        self.subscription.cancel();
    }

    /// True once the driver task has exited.
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Waits for the driver task to exit.
    pub async fn join(self) -> Result<(), JoinError> {
        self.join.await
    }
}

impl fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandle")
            .field("subscription", &self.subscription)
            .field("finished", &self.join.is_finished())
            .finish()
    }
}
