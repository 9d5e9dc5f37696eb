//! Subscriptions: broker-owned records and the handles given to callers.

mod handle;
mod record;

pub use handle::{SubscriptionHandle, TaskHandle};
pub use record::SubscriptionId;
pub(crate) use record::{Callback, Subscription, typed_callback};
