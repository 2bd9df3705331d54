//! Core broker: a topic store exposed through the line-protocol server.

use crate::{
    config::BrokerConfig,
    network::{TcpServer, TcpServerBuilder},
    routing::RequestRouter,
    topic::{TopicStore, TopicStoreSink},
};
use quafka_core::Result;
use std::{net::SocketAddr, sync::Arc};
use tracing::info;

/// Broker instance owning a [`TopicStore`] and the server that exposes it.
#[derive(Debug)]
pub struct Broker {
    config: BrokerConfig,
    store: Arc<TopicStore>,
    router: RequestRouter,
    server: TcpServer,
}

/// Broker runtime statistics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerStats {
    /// Whether the server is accepting
    pub running: bool,
    /// Sessions currently open
    pub active_sessions: usize,
    /// Sessions accepted since start
    pub total_sessions: u64,
    /// Topics currently known
    pub topics: usize,
}

impl Broker {
    /// Broker with a fresh store.
    ///
    /// # Errors
    /// Fails if the configuration is invalid.
    pub fn new(config: BrokerConfig) -> Result<Self> {
        let store = Arc::new(TopicStore::with_partitions(config.topics.default_partitions));
        Self::with_store(config, store)
    }

    /// Broker exposing an existing store.
    ///
    /// # Errors
    /// Fails if the configuration is invalid.
    pub fn with_store(config: BrokerConfig, store: Arc<TopicStore>) -> Result<Self> {
        let router = RequestRouter::new(Arc::clone(&store), config.default_topic()?);
        let server = TcpServerBuilder::new().config(config.server.clone()).build(router.clone())?;
        Ok(Self { config, store, router, server })
    }

    /// Start serving. Returns the bound address.
    ///
    /// # Errors
    /// Fails if already running or the address cannot be bound.
    pub async fn start(&mut self) -> Result<SocketAddr> {
        let addr = self.server.start().await?;
        info!(
            "Broker started on {} ({} partitions per topic, default topic '{}')",
            addr,
            self.store.partitions_per_topic(),
            self.router.default_topic()
        );
        Ok(addr)
    }

    /// Stop serving and close every session.
    ///
    /// # Errors
    /// Fails if the broker is not running.
    pub async fn stop(&mut self) -> Result<()> {
        self.server.stop().await?;
        info!("Broker stopped");
        Ok(())
    }

    /// Shared topic store.
    pub fn store(&self) -> &Arc<TopicStore> {
        &self.store
    }

    /// Handler routing client-side text publishes into this broker's default topic.
    pub fn text_sink(&self) -> TopicStoreSink {
        TopicStoreSink::new(Arc::clone(&self.store), self.router.default_topic().clone())
    }

    /// Bound address while running.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.server.local_addr()
    }

    /// Broker configuration.
    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    /// Current statistics.
    pub fn stats(&self) -> BrokerStats {
        BrokerStats {
            running: self.server.is_running(),
            active_sessions: self.server.sessions().active_count(),
            total_sessions: self.server.sessions().total_accepted(),
            topics: self.store.topics().len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quafka_core::TextMessageHandler;

    fn test_config() -> BrokerConfig {
        let mut config = BrokerConfig::default().with_port(0);
        config.server.host = "127.0.0.1".to_string();
        config
    }

    #[tokio::test]
    async fn test_broker_lifecycle() {
        let mut broker = Broker::new(test_config()).unwrap();
        assert!(!broker.stats().running);

        let addr = broker.start().await.unwrap();
        assert_eq!(broker.local_addr(), Some(addr));
        assert!(broker.stats().running);

        broker.stop().await.unwrap();
        assert!(!broker.stats().running);
    }

    #[test]
    fn test_partition_count_from_config() {
        let broker = Broker::new(test_config().with_partitions(5)).unwrap();
        broker.text_sink().on_text_message("x");
        assert_eq!(broker.store().partition_count("default-topic"), 5);
        assert_eq!(broker.stats().topics, 1);
    }
}
