//! # GateDriver: feeds one subscription's gate until it terminates.
//!
//! The broker owns the gate; the driver is the task that reacts to the
//! outside world and tells the broker what happened.
//!
//! ```text
//! Owner-bound:
//! loop {
//!   select! (biased) {
//!     token.cancelled()   ─► break                       (handle.cancel / scope release)
//!     phases.changed()    ─► broker.apply_phase(phase)
//!                              └─ Terminated ─► break    (owner destroyed)
//!                            closed channel  ─► Destroyed
//!   }
//! }
//!
//! Detached:
//!   select! { token.cancelled(), scope.cancelled() }
//!
//! exit: broker.terminate(sub) (no-op if already removed); token.cancel()
//! ```
//!
//! ## Rules
//! - The initial phase is applied synchronously at registration; the driver
//!   only handles changes after that.
//! - Cancellation is checked first, so a cancel racing a phase change wins.

use std::sync::Arc;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use super::broker::Broker;
use crate::events::TypeKey;
use crate::lifecycle::{GateState, Phase};
use crate::subscription::{Subscription, SubscriptionId};

/// What ends (and, for owners, gates) a subscription.
pub(crate) enum PhaseSource {
    /// Phase changes of a lifecycle owner.
    Owner(watch::Receiver<Phase>),
    /// An independent concurrency scope; always open until it is cancelled.
    Detached(CancellationToken),
}

/// Drives one subscription's gate.
pub(crate) struct GateDriver {
    broker: Arc<Broker>,
    key: TypeKey,
    id: SubscriptionId,
    token: CancellationToken,
    source: PhaseSource,
}

impl GateDriver {
    pub(crate) fn new(broker: Arc<Broker>, sub: &Subscription, source: PhaseSource) -> Self {
        Self {
            broker,
            key: sub.key.clone(),
            id: sub.id,
            token: sub.token.clone(),
            source,
        }
    }

    /// Runs until the subscription terminates.
    pub(crate) async fn run(self) {
        let Self {
            broker,
            key,
            id,
            token,
            source,
        } = self;

        match source {
            PhaseSource::Owner(mut phases) => loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    changed = phases.changed() => {
                        let phase = match changed {
                            Ok(()) => *phases.borrow_and_update(),
                            Err(_) => Phase::Destroyed,
                        };
                        if broker.apply_phase(&key, id, phase) == GateState::Terminated {
                            break;
                        }
                    }
                }
            },
            PhaseSource::Detached(scope) => {
                tokio::select! {
                    _ = token.cancelled() => {}
                    _ = scope.cancelled() => {}
                }
            }
        }

        broker.terminate(&key, id);
        token.cancel();
    }
}
