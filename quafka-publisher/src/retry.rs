//! Bounded retry with exponential backoff.

use quafka_core::{
    backoff::{Backoff, Sleeper, TokioSleeper},
    config::ConnectionConfig,
    Result,
};
use std::{fmt, future::Future, sync::Arc};
use tracing::{error, warn};

/// Runs an operation up to `max_retries + 1` times.
///
/// Every failure is retried, whatever its kind. Between attempts the executor
/// waits `initial`, then doubles the wait up to `max`. When attempts run out
/// the last failure is returned unchanged.
#[derive(Clone)]
pub struct RetryExecutor {
    max_retries: u32,
    backoff: Backoff,
    sleeper: Arc<dyn Sleeper>,
}

impl fmt::Debug for RetryExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryExecutor")
            .field("max_retries", &self.max_retries)
            .field("backoff", &self.backoff)
            .finish_non_exhaustive()
    }
}

impl RetryExecutor {
    /// Executor waiting on the tokio timer.
    #[must_use]
    pub fn new(max_retries: u32, backoff: Backoff) -> Self {
        Self::with_sleeper(max_retries, backoff, Arc::new(TokioSleeper))
    }

    /// Executor waiting through `sleeper`.
    #[must_use]
    pub fn with_sleeper(max_retries: u32, backoff: Backoff, sleeper: Arc<dyn Sleeper>) -> Self {
        Self { max_retries, backoff, sleeper }
    }

    /// Executor using the retry settings of a connection.
    #[must_use]
    pub fn from_config(config: &ConnectionConfig, sleeper: Arc<dyn Sleeper>) -> Self {
        Self::with_sleeper(
            config.max_retries,
            Backoff::new(config.initial_retry_delay, config.max_retry_delay),
            sleeper,
        )
    }

    /// Retries after the first attempt.
    #[must_use]
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Delay schedule.
    #[must_use]
    pub fn backoff(&self) -> Backoff {
        self.backoff
    }

    /// Run `operation` until it succeeds or attempts run out.
    ///
    /// # Errors
    /// Returns the final attempt's error verbatim.
    pub async fn execute<F, Fut, T>(&self, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut delay = self.backoff.initial();
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            match operation().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt > self.max_retries => {
                    error!("Operation failed after {} attempts: {}", attempt, e);
                    return Err(e);
                },
                Err(e) => {
                    warn!(
                        "Attempt {}/{} failed: {}; retrying in {:?}",
                        attempt,
                        self.max_retries + 1,
                        e,
                        delay
                    );
                    self.sleeper.sleep(delay).await;
                    delay = self.backoff.next_delay(delay);
                },
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::time::Duration;

    /// Sleeper that records requested delays and returns at once.
    #[derive(Debug, Default)]
    pub(crate) struct RecordingSleeper {
        pub(crate) delays: Mutex<Vec<Duration>>,
    }

    #[async_trait]
    impl Sleeper for RecordingSleeper {
        async fn sleep(&self, duration: Duration) {
            self.delays.lock().push(duration);
            tokio::task::yield_now().await;
        }
    }
}
