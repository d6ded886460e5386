//! Retry policies for failed backfill fetches.
//!
//! The protocol does not re-deliver a missed range on its own, so whether to
//! retry a failed history/membership fetch is a policy decision. The default
//! retries once after a short delay; [`NoRetries`] gives up immediately and
//! leaves the gap unrepaired.

use std::num::NonZeroU32;
use std::ops::ControlFlow;
use std::time::Duration;

use crate::errors::NetworkError;

/// Controls how the pipeline reacts when a backfill fetch fails.
pub trait RetryPolicy: Send + Sync + 'static {
    fn should_retry(&self, ctx: &RetryContext) -> ControlFlow<(), Duration>;
}

/// Context passed to [`RetryPolicy::should_retry`] on each failure.
pub struct RetryContext {
    pub fail_count:   NonZeroU32,
    pub slept_so_far: Duration,
    pub error:        NetworkError,
}

/// Never retry — the source behavior: the gap stays unresolved.
pub struct NoRetries;

impl RetryPolicy for NoRetries {
    fn should_retry(&self, _: &RetryContext) -> ControlFlow<(), Duration> {
        ControlFlow::Break(())
    }
}

/// Retry a single time after `delay`.
pub struct RetryOnce {
    pub delay: Duration,
}

impl Default for RetryOnce {
    fn default() -> Self {
        Self { delay: Duration::from_secs(2) }
    }
}

impl RetryPolicy for RetryOnce {
    fn should_retry(&self, ctx: &RetryContext) -> ControlFlow<(), Duration> {
        if ctx.fail_count.get() == 1 {
            tracing::info!("backfill fetch failed ({}) — retrying in {:?}", ctx.error, self.delay);
            ControlFlow::Continue(self.delay)
        } else {
            ControlFlow::Break(())
        }
    }
}
