//! Configuration schema definitions for Quafka.
//!
//! Every structure is a plain value object with defaults, `with_*` builders, serde
//! support (durations as integer milliseconds) and `validator` field rules.
//! Cross-field rules live in [`ConfigValidator`](super::ConfigValidator).

use crate::types::{ConnectionId, PartitionId};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use validator::Validate;

/// Root configuration aggregating every subsystem.
///
/// Loaded in layers: defaults → TOML file → `QUAFKA_*` environment overrides.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct QuafkaConfig {
    /// Broker listener settings
    #[validate(nested)]
    pub server: ServerConfig,

    /// Topic creation defaults
    #[validate(nested)]
    pub topics: TopicConfig,

    /// Client connection settings
    #[validate(nested)]
    pub connection: ConnectionConfig,

    /// Connection pool sizing
    #[validate(nested)]
    pub pool: PoolConfig,

    /// Reconnect backoff
    #[validate(nested)]
    pub reconnect: ReconnectConfig,

    /// Health probing
    #[validate(nested)]
    pub health: HealthCheckConfig,

    /// Load-balancer tuning
    #[validate(nested)]
    pub load_balancer: LoadBalancerConfig,

    /// Consumer poll loop
    #[validate(nested)]
    pub consumer: ConsumerConfig,

    /// Log output
    #[validate(nested)]
    pub logging: LoggingConfig,
}

/// Load-balancing strategy tag.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadBalancingStrategy {
    /// Cycle through candidates in order
    #[default]
    RoundRobin,
    /// Uniform random choice
    Random,
    /// Fewest outstanding uses
    LeastLoaded,
    /// Lowest measured liveness latency
    Nearest,
}

/// Settings for one client connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Identity of the connection
    pub connection_id: ConnectionId,

    /// Broker host name or address
    #[validate(length(min = 1))]
    pub host: String,

    /// Broker port
    #[validate(range(min = 1))]
    pub port: u16,

    /// Connect and response timeout
    #[serde(with = "duration_ms")]
    pub timeout: Duration,

    /// Retries after the first failed attempt
    #[validate(range(max = 100))]
    pub max_retries: u32,

    /// Delay before the first retry
    #[serde(with = "duration_ms")]
    pub initial_retry_delay: Duration,

    /// Upper bound of the retry delay
    #[serde(with = "duration_ms")]
    pub max_retry_delay: Duration,

    /// Strategy used when this connection takes part in balancing
    pub strategy: LoadBalancingStrategy,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            connection_id: ConnectionId::new(),
            host: "localhost".to_string(),
            port: 8080,
            timeout: Duration::from_millis(5000),
            max_retries: 3,
            initial_retry_delay: Duration::from_millis(1000),
            max_retry_delay: Duration::from_millis(10_000),
            strategy: LoadBalancingStrategy::RoundRobin,
        }
    }
}

impl ConnectionConfig {
    /// Configuration for `host:port` with default timeouts and a fresh identity.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self { host: host.into(), port, ..Self::default() }
    }

    /// Set the connection identity.
    #[must_use]
    pub fn with_connection_id(mut self, id: ConnectionId) -> Self {
        self.connection_id = id;
        self
    }

    /// Set the connect and response timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the number of retries after the first attempt.
    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the retry backoff bounds.
    #[must_use]
    pub fn with_retry_delays(mut self, initial: Duration, max: Duration) -> Self {
        self.initial_retry_delay = initial;
        self.max_retry_delay = max;
        self
    }

    /// Set the balancing strategy tag.
    #[must_use]
    pub fn with_strategy(mut self, strategy: LoadBalancingStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// `host:port` string.
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Broker listener settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ServerConfig {
    /// Interface to bind
    #[validate(length(min = 1))]
    pub host: String,

    /// Port to bind; 0 picks an ephemeral port
    pub port: u16,

    /// Listen backlog
    #[validate(range(min = 1, max = 65_535))]
    pub backlog: u32,

    /// Maximum concurrently tracked sessions
    #[validate(range(min = 1, max = 1_000_000))]
    pub max_connections: usize,

    /// Sessions served concurrently
    #[validate(range(min = 1, max = 10_000))]
    pub worker_threads: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            backlog: 50,
            max_connections: 100,
            worker_threads: 10,
        }
    }
}

impl ServerConfig {
    /// Set the bind port.
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the bind interface.
    #[must_use]
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Set the number of concurrently served sessions.
    #[must_use]
    pub fn with_worker_threads(mut self, workers: usize) -> Self {
        self.worker_threads = workers;
        self
    }

    /// Set the session limit.
    #[must_use]
    pub fn with_max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// `host:port` string.
    #[must_use]
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Topic creation defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct TopicConfig {
    /// Partitions created for a new topic
    #[validate(range(min = 1, max = 1024))]
    pub default_partitions: u32,

    /// Topic that `TEXT` requests publish into
    #[validate(length(min = 1, max = 255))]
    pub default_topic: String,
}

impl Default for TopicConfig {
    fn default() -> Self {
        Self {
            default_partitions: 3,
            default_topic: crate::protocol::constants::DEFAULT_TOPIC.to_string(),
        }
    }
}

/// Connection pool sizing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct PoolConfig {
    /// Maximum live connections
    #[validate(range(min = 1, max = 10_000))]
    pub max_pool_size: usize,

    /// How long `borrow` waits for an idle connection at capacity
    #[serde(with = "duration_ms")]
    pub borrow_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self { max_pool_size: 10, borrow_timeout: Duration::from_millis(5000) }
    }
}

impl PoolConfig {
    /// Set the pool capacity.
    #[must_use]
    pub fn with_max_pool_size(mut self, size: usize) -> Self {
        self.max_pool_size = size;
        self
    }

    /// Set the borrow timeout.
    #[must_use]
    pub fn with_borrow_timeout(mut self, timeout: Duration) -> Self {
        self.borrow_timeout = timeout;
        self
    }
}

/// Reconnect backoff.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ReconnectConfig {
    /// Attempts before giving up
    #[validate(range(min = 1, max = 1000))]
    pub max_attempts: u32,

    /// Wait before the first attempt
    #[serde(with = "duration_ms")]
    pub initial_backoff: Duration,

    /// Upper bound of the wait
    #[serde(with = "duration_ms")]
    pub max_backoff: Duration,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(1000),
            max_backoff: Duration::from_millis(30_000),
        }
    }
}

/// Health probing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct HealthCheckConfig {
    /// Period between sweeps
    #[serde(with = "duration_ms")]
    pub check_interval: Duration,

    /// Bound on a single sweep
    #[serde(with = "duration_ms")]
    pub timeout: Duration,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self { check_interval: Duration::from_secs(30), timeout: Duration::from_secs(5) }
    }
}

/// Load-balancer tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct LoadBalancerConfig {
    /// Selection strategy
    pub strategy: LoadBalancingStrategy,

    /// RTT re-measurement period for [`LoadBalancingStrategy::Nearest`]
    #[serde(with = "duration_ms")]
    pub probe_interval: Duration,
}

impl Default for LoadBalancerConfig {
    fn default() -> Self {
        Self { strategy: LoadBalancingStrategy::RoundRobin, probe_interval: Duration::from_secs(5) }
    }
}

/// Consumer poll loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ConsumerConfig {
    /// Consumer group acknowledged by `COMMIT`
    #[validate(length(min = 1))]
    pub group_id: String,

    /// Topic to poll
    #[validate(length(min = 1, max = 255))]
    pub topic: String,

    /// Partitions polled in rotation
    #[validate(length(min = 1))]
    pub partitions: Vec<PartitionId>,

    /// Send `COMMIT` after each successful poll
    pub auto_commit: bool,

    /// Bound on a single poll round trip
    #[serde(with = "duration_ms")]
    pub poll_timeout: Duration,

    /// Wait between iterations
    #[serde(with = "duration_ms")]
    pub poll_interval: Duration,

    /// Wait after a failed iteration
    #[serde(with = "duration_ms")]
    pub error_backoff: Duration,

    /// Capacity of the delivery channel
    #[validate(range(min = 1))]
    pub buffer_size: usize,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            group_id: "quafka-group".to_string(),
            topic: crate::protocol::constants::DEFAULT_TOPIC.to_string(),
            partitions: vec![PartitionId(0)],
            auto_commit: true,
            poll_timeout: Duration::from_millis(5000),
            poll_interval: Duration::from_millis(1000),
            error_backoff: Duration::from_millis(1000),
            buffer_size: 1024,
        }
    }
}

impl ConsumerConfig {
    /// Configuration for `group_id` polling `topic`.
    pub fn new(group_id: impl Into<String>, topic: impl Into<String>) -> Self {
        Self { group_id: group_id.into(), topic: topic.into(), ..Self::default() }
    }

    /// Set the partitions polled in rotation.
    #[must_use]
    pub fn with_partitions(mut self, partitions: impl IntoIterator<Item = u32>) -> Self {
        self.partitions = partitions.into_iter().map(PartitionId).collect();
        self
    }

    /// Enable or disable `COMMIT` after each poll.
    #[must_use]
    pub fn with_auto_commit(mut self, auto_commit: bool) -> Self {
        self.auto_commit = auto_commit;
        self
    }

    /// Set the wait between iterations.
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the wait after a failed iteration.
    #[must_use]
    pub fn with_error_backoff(mut self, backoff: Duration) -> Self {
        self.error_backoff = backoff;
        self
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Text,
    /// One JSON object per event
    Json,
}

/// Log output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset
    #[validate(length(min = 1))]
    pub level: String,

    /// Output format
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), format: LogFormat::Text }
    }
}

/// Serialize `Duration` as integer milliseconds.
pub(crate) mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let ms = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(ms))
    }
}
