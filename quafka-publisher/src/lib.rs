//! # Quafka Publisher
//!
//! Client side of the Quafka broker: resilient connections speaking the line
//! protocol.
//!
//! This crate provides:
//! - [`ConnectionController`]: a connection state machine with retried execution
//! - [`RetryExecutor`] and [`ReconnectStrategy`]: bounded exponential backoff
//! - [`ConnectionPool`]: bounded borrowing with a wait timeout
//! - [`LoadBalancer`]: round-robin, random, least-loaded and nearest selection
//! - [`HealthChecker`]: periodic eviction of dead idle connections
//! - [`Publisher`]: all of the above behind `publish_text`, `poll` and `commit`
//!
//! ## Examples
//!
//! ```rust,no_run
//! use quafka_publisher::{Publisher, PublisherConfig};
//! use quafka_core::config::ConnectionConfig;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = PublisherConfig::single(ConnectionConfig::new("127.0.0.1", 8080));
//! let publisher = Publisher::new(config)?;
//!
//! let position = publisher.publish_text("hello world").await?;
//! println!("stored at {position}");
//! publisher.close().await;
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod balancer;
pub mod config;
pub mod connection;
pub mod factory;
pub mod health;
pub mod metrics;
pub mod monitor;
pub mod pool;
pub mod publisher;
pub mod reconnect;
pub mod retry;
pub mod transport;

pub use balancer::{Candidate, LoadBalancer};
pub use config::PublisherConfig;
pub use connection::{ConnectionController, ConnectionState};
pub use factory::ConnectionFactory;
pub use health::{HealthCheckHandle, HealthChecker, HealthReport};
pub use metrics::{ConnectionMetrics, MetricsSnapshot};
pub use monitor::{ConnectionMonitor, TracingMonitor};
pub use pool::ConnectionPool;
pub use publisher::{PoolStats, Publisher};
pub use quafka_core::{Error, Result};
pub use reconnect::ReconnectStrategy;
pub use retry::RetryExecutor;
pub use transport::{LineChannel, TcpTransport, Transport};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::{
        ConnectionController, ConnectionFactory, ConnectionPool, ConnectionState, LoadBalancer,
        Publisher, PublisherConfig,
    };
    pub use quafka_core::prelude::*;
}
