//! Periodic liveness checks over pooled connections.

use crate::{connection::ConnectionController, pool::ConnectionPool};
use quafka_core::{config::HealthCheckConfig, Error, Result};
use std::{sync::Arc, time::Duration};
use tokio::{sync::watch, task::JoinHandle};
use tracing::{debug, info, warn};

/// Outcome of one sweep over a pool's idle connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HealthReport {
    /// Idle connections examined
    pub checked: usize,
    /// Connections that passed
    pub healthy: usize,
    /// Connections disconnected and removed
    pub evicted: usize,
}

/// Decides whether connections are usable and prunes pools of the rest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthChecker {
    check_interval: Duration,
    timeout: Duration,
}

impl Default for HealthChecker {
    fn default() -> Self {
        Self::from_config(&HealthCheckConfig::default())
    }
}

impl HealthChecker {
    /// Checker sweeping every `check_interval`, giving each sweep `timeout`.
    #[must_use]
    pub const fn new(check_interval: Duration, timeout: Duration) -> Self {
        Self { check_interval, timeout }
    }

    /// Checker from configuration.
    #[must_use]
    pub const fn from_config(config: &HealthCheckConfig) -> Self {
        Self::new(config.check_interval, config.timeout)
    }

    /// A connection is healthy while it is connected.
    pub fn is_healthy(&self, connection: &ConnectionController) -> bool {
        connection.is_connected()
    }

    /// Period between sweeps.
    pub const fn check_interval(&self) -> Duration {
        self.check_interval
    }

    /// Bound on a single sweep.
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Check every idle connection in `pool` once, evicting unhealthy ones.
    ///
    /// # Errors
    /// `HEALTH_CHECK_FAILED` if the sweep exceeds the timeout.
    pub async fn sweep(&self, pool: &ConnectionPool) -> Result<HealthReport> {
        let (checked, evicted) =
            tokio::time::timeout(self.timeout, pool.evict_idle_where(|c| !self.is_healthy(c)))
                .await
                .map_err(|e| {
                    Error::health_check(format!(
                        "sweep of pool {} exceeded {:?}",
                        pool.id(),
                        self.timeout
                    ))
                    .with_source(e)
                })?;

        let report = HealthReport { checked, healthy: checked - evicted, evicted };
        if evicted > 0 {
            info!("Evicted {} unhealthy connections from pool {}", evicted, pool.id());
        }
        Ok(report)
    }

    /// Sweep `pool` every `check_interval` until the handle is stopped or dropped.
    #[must_use]
    pub fn spawn(&self, pool: Arc<ConnectionPool>) -> HealthCheckHandle {
        let checker = *self;
        let (stop_tx, mut stop_rx) = watch::channel(false);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(checker.check_interval);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if pool.is_closed() {
                            debug!("Pool {} closed, ending health checks", pool.id());
                            break;
                        }
                        match checker.sweep(&pool).await {
                            Ok(report) => debug!("Health sweep of pool {}: {:?}", pool.id(), report),
                            Err(e) => warn!("Health sweep failed: {}", e),
                        }
                    }
                    _ = stop_rx.changed() => break,
                }
            }
        });

        HealthCheckHandle { stop_tx, task }
    }
}

/// Running health-check task.
#[derive(Debug)]
pub struct HealthCheckHandle {
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl HealthCheckHandle {
    /// Stop the task and wait for it to finish.
    pub async fn stop(self) {
        let _ = self.stop_tx.send(true);
        let _ = self.task.await;
    }

    /// Whether the task has ended.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{factory::ConnectionFactory, transport::mock::MockTransport};
    use quafka_core::config::{ConnectionConfig, PoolConfig};

    fn pool() -> Arc<ConnectionPool> {
        let factory = ConnectionFactory::new(Arc::new(MockTransport::echo()));
        Arc::new(ConnectionPool::new(
            ConnectionConfig::new("127.0.0.1", 9),
            PoolConfig::default().with_max_pool_size(4),
            factory,
        ))
    }

    #[test]
    fn test_defaults() {
        let checker = HealthChecker::default();
        assert_eq!(checker.check_interval(), Duration::from_secs(30));
        assert_eq!(checker.timeout(), Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_sweep_evicts_disconnected() {
        let pool = pool();
        let a = pool.borrow().await.unwrap();
        let b = pool.borrow().await.unwrap();
        let checker = HealthChecker::default();
        assert!(checker.is_healthy(&a));

        // Idle connections that die without being borrowed again.
        let dead = Arc::clone(&a);
        pool.release(a).await;
        pool.release(b).await;
        dead.disconnect().await.unwrap();
        assert!(!checker.is_healthy(&dead));

        let report = checker.sweep(&pool).await.unwrap();
        assert_eq!(report, HealthReport { checked: 2, healthy: 1, evicted: 1 });
        assert_eq!((pool.idle(), pool.total_connections()), (1, 1));
    }

    #[tokio::test]
    async fn test_spawned_checks_run_and_stop() {
        let pool = pool();
        let conn = pool.borrow().await.unwrap();
        let dead = Arc::clone(&conn);
        pool.release(conn).await;
        dead.disconnect().await.unwrap();

        let checker = HealthChecker::new(Duration::from_millis(20), Duration::from_secs(1));
        let handle = checker.spawn(Arc::clone(&pool));
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(pool.idle(), 0);

        assert!(!handle.is_finished());
        handle.stop().await;
    }
}
