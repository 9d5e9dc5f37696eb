//! # Example: sticky_replay
//!
//! A session publishes the logged-in user as a sticky event before any screen
//! exists. Screens opened later still see it, exactly once, when they first
//! come to the foreground. A background worker subscribes detached from any
//! screen and stops with its own cancellation scope.
//!
//! ## Flow
//! ```text
//! post(User, sticky) ──► global sticky cache
//!                               │
//! screen A: subscribe(sticky) ──┴─► Start ─► replay "alice"
//! post(User "bob", sticky)     ─► A receives "bob", cache overwritten
//! screen B: subscribe(sticky)  ─► Start ─► replay "bob" (latest only)
//! remove_sticky(receipt of "alice") ─► no-op, "bob" is newer
//! ```
//!
//! ## Run
//! ```bash
//! cargo run --example sticky_replay
//! ```

use std::time::Duration;

use scopebus::{
    BusConfig, CancellationToken, Event, EventBus, Lifecycle, LifecycleEvent, PostOptions,
    SubscribeOptions, Target,
};

#[derive(Debug)]
struct User(&'static str);
impl Event for User {
    const KEY: &'static str = "demo.user";
}

fn open_screen(bus: &EventBus, name: &'static str) -> anyhow::Result<Lifecycle> {
    let screen = Lifecycle::new();
    bus.subscribe_global(&screen, SubscribeOptions::default().sticky(), move |u: &User| {
        println!("[{name}] user is {}", u.0)
    })?;
    screen.handle(LifecycleEvent::Create);
    screen.handle(LifecycleEvent::Start);
    Ok(screen)
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let bus = EventBus::new(BusConfig::default())?;

    // 1. Sticky post with nobody listening
    let alice = bus.post_with(Target::Global, User("alice"), PostOptions::sticky())?;
    println!("[session] cached: {:?}", bus.sticky::<User>(Target::Global));

    // 2. Background worker, not tied to any screen
    let worker_scope = CancellationToken::new();
    let worker = bus.subscribe_detached(&worker_scope, true, |u: &User| {
        println!("[worker] syncing profile of {}", u.0)
    })?;

    // 3. First screen gets the cached user on first activation
    let screen_a = open_screen(&bus, "screen-a")?;
    tokio::time::sleep(Duration::from_millis(20)).await;

    // 4. A newer sticky post overwrites the cache and reaches live subscribers
    bus.post_with(Target::Global, User("bob"), PostOptions::sticky())?;
    tokio::time::sleep(Duration::from_millis(20)).await;

    // 5. A later screen only sees the latest value
    let screen_b = open_screen(&bus, "screen-b")?;
    tokio::time::sleep(Duration::from_millis(20)).await;

    // 6. Pausing and resuming does not replay again
    screen_a.handle(LifecycleEvent::Stop);
    screen_a.handle(LifecycleEvent::Start);
    tokio::time::sleep(Duration::from_millis(20)).await;

    // 7. Sticky removal only drops the caller's own entry
    println!("[session] remove alice's entry: {}", bus.remove_sticky(&alice));
    println!("[session] clear user: {}", bus.clear_sticky::<User>(Target::Global));

    worker_scope.cancel();
    worker.join().await?;
    screen_a.destroy();
    screen_b.destroy();
    bus.shutdown();
    Ok(())
}
