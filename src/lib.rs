//! # scopebus
//!
//! **scopebus** is an in-process publish/subscribe bus whose subscriptions are
//! bound to the lifecycle of an owner.
//!
//! Components exchange typed events without holding references to one
//! another. Every subscription declares an owner (a screen, a session, a
//! task scope); delivery starts when the owner reaches a minimum phase, pauses
//! when it drops below it, and ends for good when the owner is destroyed.
//! Sticky posts are cached per scope and replayed once to late subscribers.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!   producers                                     consumers
//!   post / post_with                              subscribe_global / _scoped / _detached
//!        │                                                 │
//!        ▼                                                 ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  EventBus                                                         │
//! │  - BrokerRegistry (global broker + one broker per owner scope)    │
//! │  - DelayScheduler (fire-and-forget timers, checks scope on fire)  │
//! │  - ExecutionContexts ("main", "background", user-created)         │
//! │  - DiagnosticBus (faults and scope bookkeeping)                   │
//! └──────┬──────────────────────────┬─────────────────────────────────┘
//!        ▼                          ▼
//!   ┌──────────────┐          ┌──────────────┐
//!   │ Broker       │          │ Broker       │   per-scope lock:
//!   │ (global)     │          │ (owner#7)    │   subscriber sets + sticky cache
//!   └┬─────────────┘          └┬─────────────┘
//!    │ publish: gate open?     │
//!    ▼                         ▼
//!  [context queue] ──► worker ──► callback(&E)   (FIFO per context, panics caught)
//!
//!   Lifecycle(owner#7) ──watch──► GateDriver (one per subscription) ──► broker.apply_phase()
//!                      ──watch──► registry owner watcher ──► Destroyed ──► broker.release()
//! ```
//!
//! ### Gate
//! ```text
//! Idle ──(phase ≥ min, first time: sticky replay)──► Active ◄──► Suspended
//!   └───────────────── owner destroyed / handle.cancel() ─────────────┴──► Terminated
//! ```
//!
//! ## Features
//! | Area              | Description                                                  | Key types / traits                          |
//! |-------------------|--------------------------------------------------------------|---------------------------------------------|
//! | **Events**        | Typed events with stable routing keys.                       | [`Event`], [`TypeKey`], [`Envelope`]        |
//! | **Lifecycles**    | Host-driven owner phases and per-subscription gates.         | [`Lifecycle`], [`LifecycleOwner`], [`Phase`]|
//! | **Bus**           | Subscribe, post (immediate, delayed, sticky), sticky control.| [`EventBus`], [`Target`], [`PostOptions`]   |
//! | **Contexts**      | Serial queues on which callbacks run.                        | [`ExecutionContext`]                        |
//! | **Diagnostics**   | Callback faults and scope events, pluggable sinks.           | [`Diagnostic`], [`DiagnosticSink`]          |
//! | **Errors**        | Typed errors for configuration and scheduling problems.      | [`BusError`]                                |
//! | **Configuration** | Diagnostic capacity and default gate minimum.                | [`BusConfig`]                               |
//!
//! ## Optional features
//! - `logging`: exports [`LogWriter`], a diagnostic sink writing through `tracing`.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use scopebus::{BusConfig, Event, EventBus, Lifecycle, LifecycleEvent, PostOptions, SubscribeOptions, Target};
//!
//! struct Greeting(&'static str);
//! impl Event for Greeting {
//!     const KEY: &'static str = "demo.greeting";
//! }
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let bus = EventBus::new(BusConfig::default())?;
//!
//!     // The host reports lifecycle transitions of its screen.
//!     let screen = Lifecycle::new();
//!     screen.handle(LifecycleEvent::Create);
//!     screen.handle(LifecycleEvent::Start);
//!
//!     // Cached before anyone listens.
//!     bus.post_with(Target::Global, Greeting("hello"), PostOptions::sticky())?;
//!
//!     let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
//!     bus.subscribe_global(&screen, SubscribeOptions::default().sticky(), move |g: &Greeting| {
//!         let _ = tx.send(g.0);
//!     })?;
//!
//!     assert_eq!(rx.recv().await, Some("hello"));
//!
//!     // Destroying the owner ends the subscription.
//!     screen.destroy();
//!     tokio::time::sleep(Duration::from_millis(10)).await;
//!     bus.post(Greeting("nobody listens"))?;
//!     Ok(())
//! }
//! ```
mod context;
mod core;
mod diagnostics;
mod error;
mod events;
mod lifecycle;
mod subscription;

// ---- Public re-exports ----

pub use context::ExecutionContext;
pub use crate::core::{
    BusConfig, EventBus, EventBusBuilder, PostOptions, PostReceipt, Scope, SubscribeOptions, Target,
};
pub use diagnostics::{Diagnostic, DiagnosticBus, DiagnosticKind, DiagnosticSink, SinkSet};
pub use error::BusError;
pub use events::{Envelope, Event, TypeKey};
pub use lifecycle::{GateState, Lifecycle, LifecycleEvent, LifecycleOwner, OwnerId, Phase};
pub use subscription::{SubscriptionHandle, SubscriptionId, TaskHandle};

/// Cancellation token type accepted by [`EventBus::subscribe_detached`].
pub use tokio_util::sync::CancellationToken;

// Optional: expose a built-in tracing sink.
// Enable with: `--features logging`
#[cfg(feature = "logging")]
pub use diagnostics::LogWriter;
