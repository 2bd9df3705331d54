//! # Quafka Consumer
//!
//! Polling consumer for Quafka topics.
//!
//! A [`Consumer`] borrows one connection, polls its partitions in rotation on a
//! dedicated task and hands messages out as a [`MessageStream`]. With
//! `auto_commit` set, every successful poll is followed by a `COMMIT` for the
//! consumer group.
//!
//! ## Examples
//!
//! ```rust,no_run
//! use futures::StreamExt;
//! use quafka_consumer::Consumer;
//! use quafka_core::config::{ConnectionConfig, ConsumerConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ConsumerConfig::new("billing", "default-topic").with_partitions([0, 1, 2]);
//! let consumer = Consumer::connect(config, ConnectionConfig::new("127.0.0.1", 8080))?;
//!
//! let mut messages = consumer.start().await?;
//! while let Some(message) = messages.next().await {
//!     println!("{}@{}: {}", message.partition, message.offset, message.payload);
//! }
//! consumer.stop().await;
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod consumer;
pub mod offset;

pub use consumer::{ConsumedMessage, Consumer, MessageStream};
pub use offset::OffsetTracker;
pub use quafka_core::{Error, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::{ConsumedMessage, Consumer, MessageStream};
    pub use quafka_core::config::ConsumerConfig;
    pub use quafka_core::prelude::*;
}
