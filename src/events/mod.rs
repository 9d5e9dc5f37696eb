//! Event data model: routing keys and posted envelopes.
//!
//! ## Contents
//! - [`Event`], [`TypeKey`] event types and their stable routing keys
//! - [`Envelope`] a posted payload with sequence, timestamp and sticky flag

mod envelope;
mod event;

pub use envelope::Envelope;
pub use event::{Event, TypeKey};
