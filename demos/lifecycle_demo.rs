//! # Example: lifecycle_demo
//!
//! A "screen" subscribes to clock ticks in its own scope and to a global
//! status event. The host walks the screen through its lifecycle while a
//! producer keeps posting.
//!
//! Demonstrates how to:
//! - Bind subscriptions to a [`Lifecycle`] with a minimum phase.
//! - Watch delivery pause on `Pause`/`Stop` and resume on `Resume`.
//! - Post with a delay and see it dropped once the scope is destroyed.
//! - Observe callback panics as diagnostics instead of crashes.
//!
//! ## Flow
//! ```text
//! screen: Create ─► Start ─► Resume ─► Pause ─► Resume ─► Destroy
//!                              │         │         │         │
//! ticks:                   delivered  dropped  delivered  scope released,
//!                                                         delayed post dropped
//! ```
//!
//! ## Run
//! ```bash
//! RUST_LOG=scopebus=debug cargo run --example lifecycle_demo --features logging
//! ```

use std::sync::Arc;
use std::time::Duration;

use scopebus::{
    BusConfig, DiagnosticKind, Event, EventBus, Lifecycle, LifecycleEvent, Phase, PostOptions,
    SubscribeOptions, Target,
};

struct Tick(u32);
impl Event for Tick {
    const KEY: &'static str = "demo.tick";
}

struct Status(&'static str);
impl Event for Status {
    const KEY: &'static str = "demo.status";
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive("scopebus=debug".parse()?),
        )
        .init();

    // 1. Build the bus (with the tracing sink if available)
    #[cfg(feature = "logging")]
    let sinks: Vec<Arc<dyn scopebus::DiagnosticSink>> = vec![Arc::new(scopebus::LogWriter::new())];
    #[cfg(not(feature = "logging"))]
    let sinks: Vec<Arc<dyn scopebus::DiagnosticSink>> = Vec::new();

    let bus = EventBus::builder(BusConfig::default()).with_sinks(sinks).build()?;
    let mut diagnostics = bus.diagnostics();

    // 2. The host creates a screen
    let screen = Arc::new(Lifecycle::new());
    screen.handle(LifecycleEvent::Create);

    // 3. Ticks only while the screen is in the foreground
    let ticks = bus.subscribe_scoped(
        &screen,
        SubscribeOptions::default().min_phase(Phase::Resumed),
        |t: &Tick| println!("[screen] tick {}", t.0),
    )?;

    // 4. Status from anywhere, as long as the screen is at least started
    bus.subscribe_global(&screen, SubscribeOptions::default(), |s: &Status| {
        if s.0 == "corrupt" {
            panic!("cannot render status");
        }
        println!("[screen] status: {}", s.0);
    })?;

    let target = Target::owner(&*screen);
    let mut n = 0;
    let mut tick = |bus: &EventBus| -> anyhow::Result<()> {
        n += 1;
        bus.post_with(target, Tick(n), PostOptions::default())?;
        Ok(())
    };

    for event in [LifecycleEvent::Start, LifecycleEvent::Resume] {
        screen.handle(event);
        println!("[host] {event:?} -> {}, gate {:?}", screen.current(), ticks.gate_state());
        tokio::time::sleep(Duration::from_millis(20)).await;
        tick(&bus)?;
    }
    bus.post(Status("online"))?;
    tokio::time::sleep(Duration::from_millis(20)).await;

    screen.handle(LifecycleEvent::Pause);
    tokio::time::sleep(Duration::from_millis(20)).await;
    println!("[host] Pause -> {}, gate {:?}", screen.current(), ticks.gate_state());
    tick(&bus)?; // dropped, never replayed

    screen.handle(LifecycleEvent::Resume);
    tokio::time::sleep(Duration::from_millis(20)).await;
    println!("[host] Resume -> {}, gate {:?}", screen.current(), ticks.gate_state());
    tick(&bus)?;
    bus.post(Status("corrupt"))?;
    bus.post(Status("still online"))?;
    tokio::time::sleep(Duration::from_millis(20)).await;

    // 5. A delayed tick that will never arrive
    bus.post_with(
        target,
        Tick(999),
        PostOptions::default().delayed(Duration::from_millis(200)),
    )?;
    screen.destroy();
    ticks.cancelled().await;
    println!("[host] destroyed; live scopes: {}", bus.broker_count());

    tokio::time::sleep(Duration::from_millis(300)).await;
    while let Ok(d) = diagnostics.try_recv() {
        match d.kind {
            DiagnosticKind::CallbackPanicked | DiagnosticKind::DelayedPostDropped => {
                println!("[diag] {:?}: {}", d.kind, d.reason.as_deref().unwrap_or(""));
            }
            _ => {}
        }
    }

    bus.shutdown();
    Ok(())
}
