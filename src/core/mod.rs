//! Bus core: scopes, brokers and their orchestration.
//!
//! The public API from this module is [`EventBus`] plus the small value types
//! it takes and returns.
//!
//! Internal modules:
//! - [`broker`]: subscriber set, gates and sticky cache of one scope;
//! - [`registry`]: lazily creates brokers and releases them when owners die;
//! - [`driver`]: feeds owner phase changes into one subscription's gate;
//! - [`scheduler`]: fire-and-forget timers for delayed posts;
//! - [`sticky`]: latest sticky post per key.

mod broker;
mod builder;
mod bus;
mod config;
mod driver;
mod options;
mod registry;
mod scheduler;
mod scope;
mod sticky;

pub(crate) use broker::Broker;
pub use builder::EventBusBuilder;
pub use bus::EventBus;
pub use config::BusConfig;
pub use options::{PostOptions, PostReceipt, SubscribeOptions};
pub use scope::{Scope, Target};
