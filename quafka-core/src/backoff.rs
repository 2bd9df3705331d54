//! Exponential backoff as a pure function, plus the timer seam that waits it out.
//!
//! Retry and reconnect loops compute their delays with [`Backoff`] and suspend
//! through a [`Sleeper`], so tests can substitute a recording timer instead of
//! waiting in real time.

use async_trait::async_trait;
use std::time::Duration;

/// Doubling delay schedule capped at a maximum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
}

impl Backoff {
    /// Create a schedule starting at `initial` and never exceeding `max`.
    #[must_use]
    pub const fn new(initial: Duration, max: Duration) -> Self {
        Self { initial, max }
    }

    /// First delay.
    #[must_use]
    pub const fn initial(&self) -> Duration {
        self.initial
    }

    /// Delay cap.
    #[must_use]
    pub const fn max(&self) -> Duration {
        self.max
    }

    /// `min(initial * 2^(attempt - 1), max)` for `attempt >= 1`, zero otherwise.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        1u32.checked_shl(attempt - 1)
            .and_then(|factor| self.initial.checked_mul(factor))
            .map_or(self.max, |delay| delay.min(self.max))
    }

    /// Delay following `current`: doubled, capped at `max`.
    #[must_use]
    pub fn next_delay(&self, current: Duration) -> Duration {
        current.checked_mul(2).map_or(self.max, |d| d.min(self.max))
    }
}

/// Suspension point used between attempts.
#[async_trait]
pub trait Sleeper: Send + Sync {
    /// Wait for `duration`.
    async fn sleep(&self, duration: Duration);
}

/// [`Sleeper`] backed by the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
