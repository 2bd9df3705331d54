//! Core publisher implementation.

use crate::{
    balancer::LoadBalancer,
    config::PublisherConfig,
    connection::ConnectionController,
    factory::ConnectionFactory,
    health::{HealthCheckHandle, HealthChecker},
    pool::ConnectionPool,
    reconnect::ReconnectStrategy,
};
use parking_lot::Mutex;
use quafka_core::{
    backoff::Sleeper,
    protocol::{Command, Request, Response},
    Error, Offset, PartitionId, PartitionOffset, Result,
};
use std::{fmt, sync::Arc};
use tracing::{debug, info, warn};

/// Message publisher client.
///
/// Keeps one [`ConnectionPool`] per endpoint and picks a pool per request
/// with the configured [`LoadBalancer`]. A request is retried on its
/// connection; if the connection is left down, it is reconnected and the
/// request tried once more.
pub struct Publisher {
    config: PublisherConfig,
    pools: Vec<Arc<ConnectionPool>>,
    balancer: LoadBalancer<ConnectionPool>,
    reconnect: ReconnectStrategy,
    health: HealthChecker,
    health_tasks: Mutex<Vec<HealthCheckHandle>>,
    sleeper: Arc<dyn Sleeper>,
}

impl fmt::Debug for Publisher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Publisher")
            .field("pools", &self.pools.len())
            .field("balancer", &self.balancer)
            .field("reconnect", &self.reconnect)
            .finish_non_exhaustive()
    }
}

/// Per-endpoint pool usage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolStats {
    /// `host:port` of the endpoint
    pub address: String,
    /// Connections lent out
    pub active: usize,
    /// Connections waiting
    pub idle: usize,
    /// Connections created so far
    pub created: u64,
}

impl Publisher {
    /// Publisher connecting over TCP.
    ///
    /// # Errors
    /// Returns a configuration error if the configuration is invalid.
    pub fn new(config: PublisherConfig) -> Result<Self> {
        Self::with_factory(config, ConnectionFactory::default())
    }

    /// Publisher creating its connections through `factory`.
    ///
    /// # Errors
    /// Returns a configuration error if the configuration is invalid.
    pub fn with_factory(config: PublisherConfig, factory: ConnectionFactory) -> Result<Self> {
        config.validate()?;

        let pools = config
            .endpoints
            .iter()
            .map(|endpoint| {
                Arc::new(ConnectionPool::new(endpoint.clone(), config.pool.clone(), factory.clone()))
            })
            .collect();

        Ok(Self {
            balancer: LoadBalancer::from_config(&config.load_balancer),
            reconnect: ReconnectStrategy::from_config(&config.reconnect),
            health: HealthChecker::from_config(&config.health),
            health_tasks: Mutex::new(Vec::new()),
            sleeper: Arc::clone(factory.sleeper()),
            pools,
            config,
        })
    }

    /// Start periodic health checks on every pool. Idempotent.
    pub fn start_health_checks(&self) {
        let mut tasks = self.health_tasks.lock();
        if !tasks.is_empty() {
            return;
        }
        tasks.extend(self.pools.iter().map(|pool| self.health.spawn(Arc::clone(pool))));
        info!(
            "Health checks started for {} pools every {:?}",
            self.pools.len(),
            self.health.check_interval()
        );
    }

    /// Publish `content` to the broker's default topic.
    ///
    /// # Errors
    /// `SERVER_ERROR` if the broker rejects the request, `PROTOCOL_ERROR` for an
    /// unexpected answer, or the transport failure.
    pub async fn publish_text(&self, content: &str) -> Result<PartitionOffset> {
        let line = Request::Text(content.to_string()).encode();
        match Response::parse(Command::Text, &self.send_raw(&line).await?)? {
            Response::Published(position) => Ok(position),
            other => Err(unexpected(&other)),
        }
    }

    /// Take the next message from `topic`/`partition`, if any.
    ///
    /// # Errors
    /// As [`publish_text`](Self::publish_text).
    pub async fn poll(
        &self,
        topic: &str,
        partition: PartitionId,
    ) -> Result<Option<(String, Offset)>> {
        let line = Request::Poll { topic: topic.to_string(), partition }.encode();
        match Response::parse(Command::Poll, &self.send_raw(&line).await?)? {
            Response::Message { payload, offset } => Ok(Some((payload, offset))),
            Response::Empty => Ok(None),
            other => Err(unexpected(&other)),
        }
    }

    /// Acknowledge consumption for `group`.
    ///
    /// # Errors
    /// As [`publish_text`](Self::publish_text).
    pub async fn commit(&self, group: &str) -> Result<()> {
        let line = Request::Commit(group.to_string()).encode();
        match Response::parse(Command::Commit, &self.send_raw(&line).await?)? {
            Response::Committed(_) => Ok(()),
            other => Err(unexpected(&other)),
        }
    }

    /// Send a raw request line and return the raw response line.
    ///
    /// # Errors
    /// `PROTOCOL_ERROR` for a line holding a line break, checked before any
    /// connection is borrowed; otherwise pool, load-balancing, transport or
    /// reconnect failures.
    pub async fn send_raw(&self, line: &str) -> Result<String> {
        Request::check_line(line)?;
        let pool = self.balancer.select(&self.pools)?;
        let result = self.send_via(&pool, line).await;
        self.balancer.decrement_load(pool.id());
        result
    }

    /// Stop health checks and close every pool.
    pub async fn close(&self) {
        let tasks: Vec<_> = self.health_tasks.lock().drain(..).collect();
        for task in tasks {
            task.stop().await;
        }
        for pool in &self.pools {
            pool.close().await;
        }
        info!("Publisher closed");
    }

    /// Per-endpoint pool usage.
    pub fn stats(&self) -> Vec<PoolStats> {
        self.pools
            .iter()
            .map(|pool| PoolStats {
                address: pool.endpoint().address(),
                active: pool.active(),
                idle: pool.idle(),
                created: pool.created_connections(),
            })
            .collect()
    }

    /// Pools, one per endpoint.
    pub fn pools(&self) -> &[Arc<ConnectionPool>] {
        &self.pools
    }

    /// Configuration.
    pub fn config(&self) -> &PublisherConfig {
        &self.config
    }

    async fn send_via(&self, pool: &ConnectionPool, line: &str) -> Result<String> {
        let connection = pool.borrow().await?;
        let result = self.send_on(&connection, line).await;
        pool.release(connection).await;
        result
    }

    async fn send_on(&self, connection: &ConnectionController, line: &str) -> Result<String> {
        match connection.send_with_retry(line).await {
            Ok(response) => Ok(response),
            Err(e) => {
                warn!("Request on {} failed ({}); reconnecting", connection.id(), e);
                self.reconnect.reconnect(connection, self.sleeper.as_ref()).await?;
                debug!("Retrying request on {} after reconnect", connection.id());
                connection.send(line).await
            },
        }
    }
}

fn unexpected(response: &Response) -> Error {
    Error::protocol(format!("unexpected response: {response}"))
}
