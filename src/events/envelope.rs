//! # Envelope: a posted event with its routing metadata.
//!
//! The payload is type-erased (`Arc<dyn Any>`) so one broker can hold events
//! of every type; subscribers downcast back to their expected type at delivery.
//! An envelope is immutable once built and cheap to clone.

use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::SystemTime;

use super::event::{Event, TypeKey};

/// Global sequence counter for posts.
static POST_SEQ: AtomicU64 = AtomicU64::new(1);

/// A posted event.
#[derive(Clone)]
pub struct Envelope {
    /// Globally unique, monotonically increasing post sequence number.
    pub seq: u64,
    /// Wall-clock time of the post call.
    pub at: SystemTime,
    /// Routing key.
    pub key: TypeKey,
    /// Whether this post also updates the sticky cache.
    pub sticky: bool,
    payload: Arc<dyn Any + Send + Sync>,
}

impl Envelope {
    /// Wraps a payload under the given key.
    pub fn new<E: Event>(key: TypeKey, payload: E, sticky: bool) -> Self {
        Self {
            seq: POST_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            key,
            sticky,
            payload: Arc::new(payload),
        }
    }

    /// Borrows the payload as `E`, or `None` if the payload has another type.
    pub fn downcast_ref<E: Event>(&self) -> Option<&E> {
        self.payload.downcast_ref::<E>()
    }

    /// Shares the payload as `Arc<E>`, or `None` if the payload has another type.
    pub fn downcast_arc<E: Event>(&self) -> Option<Arc<E>> {
        Arc::clone(&self.payload).downcast::<E>().ok()
    }
}

impl fmt::Debug for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Envelope")
            .field("seq", &self.seq)
            .field("key", &self.key)
            .field("sticky", &self.sticky)
            .finish_non_exhaustive()
    }
}
