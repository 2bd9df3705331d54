//! # Quafka Broker
//!
//! In-memory partitioned message broker.
//!
//! This crate provides:
//! - [`topic`]: partitions with monotonic offsets and the topic store
//! - [`routing`]: request handling for the line protocol
//! - [`network`]: the TCP server, accept loop and session tracking
//! - [`broker`]: the assembled broker
//!
//! ## Examples
//!
//! ```rust,no_run
//! use quafka_broker::{Broker, BrokerConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut broker = Broker::new(BrokerConfig::default())?;
//! let addr = broker.start().await?;
//! println!("broker listening on {addr}");
//! broker.stop().await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod broker;
pub mod config;
pub mod network;
pub mod routing;
pub mod topic;

pub use broker::{Broker, BrokerStats};
pub use config::BrokerConfig;
pub use quafka_core::{Error, Result};
pub use routing::RequestRouter;
pub use topic::{Partition, TopicStore, TopicStoreSink};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::{Broker, BrokerConfig, RequestRouter, TopicStore};
    pub use quafka_core::prelude::*;
}
