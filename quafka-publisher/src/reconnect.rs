//! Reconnection policy.

use crate::connection::ConnectionController;
use quafka_core::{
    backoff::{Backoff, Sleeper},
    config::ReconnectConfig,
    Error, Result,
};
use std::time::Duration;
use tracing::{info, warn};

/// Exponential reconnection policy.
///
/// [`attempt_reconnect`](Self::attempt_reconnect) makes a single attempt;
/// [`reconnect`](Self::reconnect) drives the attempts, waiting
/// [`backoff_time`](Self::backoff_time) before each.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectStrategy {
    max_attempts: u32,
    backoff: Backoff,
}

impl Default for ReconnectStrategy {
    fn default() -> Self {
        Self::from_config(&ReconnectConfig::default())
    }
}

impl ReconnectStrategy {
    /// Policy allowing `max_attempts` attempts on the given schedule.
    #[must_use]
    pub const fn new(max_attempts: u32, initial: Duration, max: Duration) -> Self {
        Self { max_attempts, backoff: Backoff::new(initial, max) }
    }

    /// Policy from configuration.
    #[must_use]
    pub const fn from_config(config: &ReconnectConfig) -> Self {
        Self::new(config.max_attempts, config.initial_backoff, config.max_backoff)
    }

    /// One connect attempt. Returns whether the connection is now connected.
    ///
    /// # Errors
    /// `UNKNOWN_ERROR` wrapping the connect failure.
    pub async fn attempt_reconnect(&self, connection: &ConnectionController) -> Result<bool> {
        connection.connect().await.map_err(|e| {
            Error::unknown(format!("reconnect of {} failed: {}", connection.id(), e.message()))
                .with_source(e)
        })?;
        Ok(connection.is_connected())
    }

    /// Wait before attempt `attempt` (1-based): `min(initial * 2^(attempt-1), max)`.
    #[must_use]
    pub fn backoff_time(&self, attempt: u32) -> Duration {
        self.backoff.delay_for(attempt)
    }

    /// Attempts allowed.
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Try up to [`max_attempts`](Self::max_attempts) times.
    ///
    /// # Errors
    /// `RECONNECT_FAILED` once every attempt has failed.
    pub async fn reconnect(
        &self,
        connection: &ConnectionController,
        sleeper: &dyn Sleeper,
    ) -> Result<()> {
        if connection.is_connected() {
            return Ok(());
        }

        let mut last_error = None;
        for attempt in 1..=self.max_attempts {
            sleeper.sleep(self.backoff_time(attempt)).await;
            match self.attempt_reconnect(connection).await {
                Ok(true) => {
                    info!("Connection {} re-established on attempt {}", connection.id(), attempt);
                    return Ok(());
                },
                Ok(false) => {
                    warn!(
                        "Reconnect attempt {}/{} left {} {}",
                        attempt,
                        self.max_attempts,
                        connection.id(),
                        connection.state()
                    );
                },
                Err(e) => {
                    warn!("Reconnect attempt {}/{} failed: {}", attempt, self.max_attempts, e);
                    last_error = Some(e);
                },
            }
        }

        let error = Error::reconnect(format!(
            "gave up on {} after {} attempts",
            connection.id(),
            self.max_attempts
        ));
        Err(match last_error {
            Some(cause) => error.with_source(cause),
            None => error,
        })
    }
}
