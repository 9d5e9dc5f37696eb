//! Execution contexts: where subscriber callbacks run.

mod executor;

pub use executor::ExecutionContext;
pub(crate) use executor::Delivery;
