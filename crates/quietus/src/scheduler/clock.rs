//! Monotonic clock abstraction.
//!
//! All due-times are [`tokio::time::Instant`]s, which never move with
//! wall-clock adjustments. Production code uses [`TokioClock`]; tests inject
//! a manual clock so schedules run deterministically and instantly.

use async_trait::async_trait;
use tokio::time::Instant;

/// Source of "now" and of sleeping until a deadline.
#[async_trait]
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;

    /// Resolve once `deadline` has been reached. Must be cancel-safe.
    async fn sleep_until(&self, deadline: Instant);
}

/// The tokio timer.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioClock;

#[async_trait]
impl Clock for TokioClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    async fn sleep_until(&self, deadline: Instant) {
        tokio::time::sleep_until(deadline).await;
    }
}

#[cfg(test)]
pub(crate) use manual::ManualClock;
