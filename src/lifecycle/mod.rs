//! Owner lifecycles and the per-subscription delivery gate.
//!
//! The host framework drives a [`Lifecycle`] through [`Phase`]s; every
//! subscription bound to that owner runs its own gate (see `gate.rs`) that
//! opens, suspends and terminates delivery as the phase moves.

mod gate;
mod owner;
mod phase;

pub use gate::GateState;
pub(crate) use gate::{Gate, Transition};
pub use owner::{Lifecycle, LifecycleOwner, OwnerId};
pub use phase::{LifecycleEvent, Phase};
