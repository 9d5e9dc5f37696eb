//! # Event types and their routing keys.
//!
//! Every event type declares a stable [`Event::KEY`]. Keys are compared by
//! string value, so renaming or moving a Rust type never changes routing.
//! Callers may override the key per post/subscribe to namespace or multiplex
//! events of the same type.
//!
//! ## Example
//! ```rust
//! use scopebus::{Event, TypeKey};
//!
//! struct LoggedIn { user: String }
//!
//! impl Event for LoggedIn {
//!     const KEY: &'static str = "app.logged_in";
//! }
//!
//! assert_eq!(TypeKey::of::<LoggedIn>().as_str(), "app.logged_in");
//! assert_eq!(TypeKey::of::<LoggedIn>(), TypeKey::new("app.logged_in"));
//! ```

use std::fmt;
use std::sync::Arc;

/// A payload that can travel through the bus.
pub trait Event: Send + Sync + 'static {
    /// Stable routing key for this event type.
    const KEY: &'static str;
}

/// Routing key of an event.
///
/// Delivery only matches subscriptions with an equal key inside the same scope.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeKey(Arc<str>);

impl TypeKey {
    /// Creates a key from any string.
    pub fn new(key: impl Into<Arc<str>>) -> Self {
        Self(key.into())
    }

    /// Default key of an event type.
    pub fn of<E: Event>() -> Self {
        Self(Arc::from(E::KEY))
    }

    /// Key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeKey({:?})", &*self.0)
    }
}

impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&'static str> for TypeKey {
    fn from(s: &'static str) -> Self {
        Self::new(s)
    }
}

impl From<String> for TypeKey {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}
