//! Broker configuration types.

use quafka_core::{
    config::{LoggingConfig, QuafkaConfig, ServerConfig, TopicConfig},
    Result, Topic,
};
use serde::{Deserialize, Serialize};

/// Configuration for a broker instance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BrokerConfig {
    /// Listener settings
    pub server: ServerConfig,

    /// Topic creation defaults
    pub topics: TopicConfig,

    /// Log output
    pub logging: LoggingConfig,
}

impl BrokerConfig {
    /// Broker listening on `port` of the default host.
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.server.port = port;
        self
    }

    /// Set the number of partitions given to new topics.
    #[must_use]
    pub fn with_partitions(mut self, partitions: u32) -> Self {
        self.topics.default_partitions = partitions;
        self
    }

    /// Topic that `TEXT` requests publish into.
    ///
    /// # Errors
    /// Returns a protocol error if the configured name is not a valid topic.
    pub fn default_topic(&self) -> Result<Topic> {
        Topic::new(self.topics.default_topic.clone())
    }
}

impl From<&QuafkaConfig> for BrokerConfig {
    fn from(config: &QuafkaConfig) -> Self {
        Self {
            server: config.server.clone(),
            topics: config.topics.clone(),
            logging: config.logging.clone(),
        }
    }
}
