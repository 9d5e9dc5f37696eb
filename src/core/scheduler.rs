//! # Delay scheduler for deferred posts.
//!
//! `schedule(delay, action)` arms a timer on a spawned task and returns at
//! once. Posts are fire-and-forget; there is no per-post cancel. The action
//! itself checks whether its scope is still alive, and the bus-wide token
//! stops every pending timer on shutdown.
//!
//! ```text
//! post(delay > 0) ──► schedule() ──► spawn { select!(sleep(delay) → action(), shutdown → drop) }
//!        │
//!        └──► returns immediately
//! ```

use std::time::Duration;

use tokio::time;
use tokio_util::sync::CancellationToken;

use crate::error::BusError;
use crate::events::TypeKey;

/// Fire-and-forget timers bound to the bus lifetime.
pub(crate) struct DelayScheduler {
    token: CancellationToken,
}

impl DelayScheduler {
    pub(crate) fn new(token: CancellationToken) -> Self {
        Self { token }
    }

    /// Runs `action` once `delay` has elapsed, unless the bus shuts down first.
    ///
    /// Fails synchronously if the bus is shut down or no runtime can host the timer.
    pub(crate) fn schedule<F>(&self, key: &TypeKey, delay: Duration, action: F) -> Result<(), BusError>
    where
        F: FnOnce() + Send + 'static,
    {
        if self.token.is_cancelled() {
            return Err(BusError::ShutDown);
        }
        let rt = tokio::runtime::Handle::try_current().map_err(|e| BusError::Scheduling {
            key: key.clone(),
            delay,
            reason: e.to_string(),
        })?;

        let token = self.token.clone();
        rt.spawn(async move {
            tokio::select! {
                biased;
                _ = token.cancelled() => {}
                _ = time::sleep(delay) => action(),
            }
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[tokio::test(start_paused = true)]
    async fn test_fires_after_delay() {
        let scheduler = DelayScheduler::new(CancellationToken::new());
        let fired = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&fired);

        scheduler
            .schedule(&TypeKey::new("t"), Duration::from_millis(1000), move || {
                flag.store(true, Ordering::SeqCst)
            })
            .unwrap();
        assert!(!fired.load(Ordering::SeqCst));

        time::sleep(Duration::from_millis(999)).await;
        assert!(!fired.load(Ordering::SeqCst));

        time::sleep(Duration::from_millis(2)).await;
        assert!(fired.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_drops_pending_timers() {
        let token = CancellationToken::new();
        let scheduler = DelayScheduler::new(token.clone());
        let fired = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&fired);

        scheduler
            .schedule(&TypeKey::new("t"), Duration::from_millis(10), move || {
                flag.store(true, Ordering::SeqCst)
            })
            .unwrap();
        token.cancel();
        time::sleep(Duration::from_millis(50)).await;
        assert!(!fired.load(Ordering::SeqCst));

        let err = scheduler
            .schedule(&TypeKey::new("t"), Duration::from_millis(10), || {})
            .unwrap_err();
        assert_eq!(err.as_label(), "bus_shut_down");
    }

    #[test]
    fn test_fails_without_runtime() {
        let scheduler = DelayScheduler::new(CancellationToken::new());
        let err = scheduler
            .schedule(&TypeKey::new("t"), Duration::from_millis(10), || {})
            .unwrap_err();
        assert_eq!(err.as_label(), "bus_scheduling_failed");
    }
}
