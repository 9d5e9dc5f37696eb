//! # Per-call options for subscribe and post.
//!
//! Both option types are plain builders with `Default` values, so the common
//! case is `SubscribeOptions::default()` / `PostOptions::default()`.

use std::time::Duration;

use super::scope::Scope;
use crate::context::ExecutionContext;
use crate::events::TypeKey;
use crate::lifecycle::Phase;

/// Options of a lifecycle-bound subscription.
///
/// - `min_phase`: gate minimum; `None` uses [`BusConfig::default_min_phase`](crate::BusConfig)
/// - `context`: where the callback runs; `None` uses the bus main context
/// - `sticky`: replay the cached sticky event once, on first activation
/// - `key`: listen under an explicit key instead of `E::KEY`
#[derive(Clone, Debug, Default)]
pub struct SubscribeOptions {
    pub min_phase: Option<Phase>,
    pub context: Option<ExecutionContext>,
    pub sticky: bool,
    pub key: Option<TypeKey>,
}

impl SubscribeOptions {
    pub fn min_phase(mut self, phase: Phase) -> Self {
        self.min_phase = Some(phase);
        self
    }

    pub fn on(mut self, context: ExecutionContext) -> Self {
        self.context = Some(context);
        self
    }

    /// Requests sticky replay.
    pub fn sticky(mut self) -> Self {
        self.sticky = true;
        self
    }

    pub fn with_key(mut self, key: impl Into<TypeKey>) -> Self {
        self.key = Some(key.into());
        self
    }
}

/// Options of a post.
///
/// A zero `delay` fans out before `post_with` returns; anything else is
/// scheduled and dropped if the scope is gone when the timer fires.
#[derive(Clone, Debug, Default)]
pub struct PostOptions {
    pub delay: Duration,
    pub sticky: bool,
    pub key: Option<TypeKey>,
}

impl PostOptions {
    /// Options for an immediate sticky post.
    pub fn sticky() -> Self {
        Self {
            sticky: true,
            ..Self::default()
        }
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_key(mut self, key: impl Into<TypeKey>) -> Self {
        self.key = Some(key.into());
        self
    }
}

/// Identifies one post; used to remove the sticky entry it created.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PostReceipt {
    pub scope: Scope,
    pub key: TypeKey,
    pub seq: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builders() {
        let opts = SubscribeOptions::default()
            .min_phase(Phase::Resumed)
            .sticky()
            .with_key("custom");
        assert_eq!(opts.min_phase, Some(Phase::Resumed));
        assert!(opts.sticky);
        assert_eq!(opts.key.unwrap().as_str(), "custom");

        let post = PostOptions::sticky().delayed(Duration::from_millis(5));
        assert!(post.sticky);
        assert_eq!(post.delay, Duration::from_millis(5));
        assert!(PostOptions::default().key.is_none());
    }
}
