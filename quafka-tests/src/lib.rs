//! # Quafka Tests
//!
//! Fixtures for end-to-end tests against a live broker on a loopback port.
//!
//! ```rust,no_run
//! use quafka_tests::TestBroker;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let broker = TestBroker::start(1).await?;
//! let publisher = broker.publisher()?;
//! let placed = publisher.publish_text("hello").await?;
//! assert_eq!(placed.offset.value(), 0);
//! broker.stop().await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

use anyhow::{Context, Result};
use quafka_broker::{Broker, BrokerConfig};
use quafka_core::{
    config::{ConnectionConfig, LoggingConfig},
    telemetry,
};
use quafka_publisher::{Publisher, PublisherConfig};
use std::{net::SocketAddr, time::Duration};
use tracing::info;

/// Response timeout used by fixture connections.
pub const TEST_TIMEOUT: Duration = Duration::from_secs(2);

/// Install test logging once. `RUST_LOG` controls verbosity.
pub fn init_tracing() {
    let config = LoggingConfig { level: "warn".to_string(), ..LoggingConfig::default() };
    let _ = telemetry::init_logging(&config);
}

/// A running broker bound to `127.0.0.1` on an ephemeral port.
#[derive(Debug)]
pub struct TestBroker {
    broker: Broker,
    addr: SocketAddr,
}

impl TestBroker {
    /// Start a broker whose topics have `partitions` partitions.
    ///
    /// # Errors
    /// Fails if the broker cannot bind.
    pub async fn start(partitions: u32) -> Result<Self> {
        init_tracing();

        let mut config = BrokerConfig::default().with_port(0).with_partitions(partitions);
        config.server.host = "127.0.0.1".to_string();

        let mut broker = Broker::new(config).context("building test broker")?;
        let addr = broker.start().await.context("starting test broker")?;
        info!("Test broker listening on {}", addr);
        Ok(Self { broker, addr })
    }

    /// Bound address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Connection settings pointing at this broker, with short retry delays.
    pub fn endpoint(&self) -> ConnectionConfig {
        ConnectionConfig::new(self.addr.ip().to_string(), self.addr.port())
            .with_timeout(TEST_TIMEOUT)
            .with_retry_delays(Duration::from_millis(10), Duration::from_millis(50))
    }

    /// Publisher with a single endpoint at this broker.
    ///
    /// # Errors
    /// Fails if the publisher configuration is rejected.
    pub fn publisher(&self) -> Result<Publisher> {
        Ok(Publisher::new(PublisherConfig::single(self.endpoint()))?)
    }

    /// The underlying broker.
    pub fn broker(&self) -> &Broker {
        &self.broker
    }

    /// Stop the broker.
    ///
    /// # Errors
    /// Fails if the broker was already stopped.
    pub async fn stop(mut self) -> Result<()> {
        self.broker.stop().await?;
        Ok(())
    }
}
