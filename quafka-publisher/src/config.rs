//! Publisher configuration types.

use quafka_core::{
    config::{
        ConnectionConfig, HealthCheckConfig, LoadBalancerConfig, PoolConfig, ReconnectConfig,
    },
    Error, QuafkaConfig, Result,
};
use serde::{Deserialize, Serialize};

/// Configuration for the publisher client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PublisherConfig {
    /// Broker endpoints; one pool is kept per endpoint
    pub endpoints: Vec<ConnectionConfig>,

    /// Pool sizing applied to every endpoint
    pub pool: PoolConfig,

    /// Reconnection after retries are exhausted
    pub reconnect: ReconnectConfig,

    /// Idle connection health checks
    pub health: HealthCheckConfig,

    /// Endpoint selection
    pub load_balancer: LoadBalancerConfig,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            endpoints: vec![ConnectionConfig::default()],
            pool: PoolConfig::default(),
            reconnect: ReconnectConfig::default(),
            health: HealthCheckConfig::default(),
            load_balancer: LoadBalancerConfig::default(),
        }
    }
}

impl From<&QuafkaConfig> for PublisherConfig {
    fn from(config: &QuafkaConfig) -> Self {
        Self {
            endpoints: vec![config.connection.clone()],
            pool: config.pool.clone(),
            reconnect: config.reconnect.clone(),
            health: config.health.clone(),
            load_balancer: config.load_balancer.clone(),
        }
    }
}

impl PublisherConfig {
    /// Configuration for a single endpoint with default tuning.
    pub fn single(endpoint: ConnectionConfig) -> Self {
        Self { endpoints: vec![endpoint], ..Self::default() }
    }

    /// Add an endpoint.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: ConnectionConfig) -> Self {
        self.endpoints.push(endpoint);
        self
    }

    /// Replace the pool settings.
    #[must_use]
    pub fn with_pool(mut self, pool: PoolConfig) -> Self {
        self.pool = pool;
        self
    }

    /// Replace the load-balancer settings.
    #[must_use]
    pub fn with_load_balancer(mut self, load_balancer: LoadBalancerConfig) -> Self {
        self.load_balancer = load_balancer;
        self
    }

    /// Replace the reconnection settings.
    #[must_use]
    pub fn with_reconnect(mut self, reconnect: ReconnectConfig) -> Self {
        self.reconnect = reconnect;
        self
    }

    /// Check the settings the publisher depends on.
    ///
    /// # Errors
    /// Returns a configuration error for an empty endpoint list or pool size.
    pub fn validate(&self) -> Result<()> {
        if self.endpoints.is_empty() {
            return Err(Error::configuration("at least one endpoint is required"));
        }
        if self.pool.max_pool_size == 0 {
            return Err(Error::configuration("pool.max_pool_size must be greater than 0"));
        }
        Ok(())
    }
}
