//! Waiting between retry rounds.
//!
//! The bulk, scan and reindex algorithms are written once, as async code.
//! What differs between the cooperative and the blocking entry points is how
//! a backoff wait is spent, which is the job of a [`Scheduler`].

use async_trait::async_trait;
use std::time::Duration;

/// Spends a backoff delay.
#[async_trait]
pub trait Scheduler: Send + Sync {
    /// Wait for `duration`.
    async fn sleep(&self, duration: Duration);
}

/// Yields to the tokio scheduler while waiting.
#[derive(Debug, Clone, Copy, Default)]
pub struct CooperativeScheduler;

#[async_trait]
impl Scheduler for CooperativeScheduler {
    async fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            tokio::time::sleep(duration).await;
        }
    }
}

/// Parks the calling thread while waiting.
///
/// Used by [`BlockingHelpers`](crate::blocking::BlockingHelpers), where the
/// futures are driven on a private current-thread runtime and nothing else
/// could run in the meantime anyway.
#[derive(Debug, Clone, Copy, Default)]
pub struct BlockingScheduler;

#[async_trait]
impl Scheduler for BlockingScheduler {
    async fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            std::thread::sleep(duration);
        }
    }
}

/// Exponential backoff between bulk retry rounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    /// Delay before the first retry.
    pub initial: Duration,
    /// Upper bound for any single delay.
    pub max: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(2),
            max: Duration::from_secs(600),
        }
    }
}

impl Backoff {
    /// Backoff with the given bounds.
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self { initial, max }
    }

    /// Delay before retry round `retry` (1-based): `initial * 2^(retry - 1)`,
    /// capped at `max`. Round 0 is the first attempt and has no delay.
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        if retry == 0 {
            return Duration::ZERO;
        }
        let factor = 1u32.checked_shl(retry - 1).unwrap_or(u32::MAX);
        self.initial.saturating_mul(factor).min(self.max)
    }
}
