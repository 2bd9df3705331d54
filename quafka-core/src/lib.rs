//! # Quafka Core
//!
//! Shared foundation of the Quafka message broker prototype: an in-memory,
//! partitioned publish/poll store reached through pooled, retried and
//! load-balanced client connections.
//!
//! This crate carries what every other Quafka crate agrees on:
//!
//! - [`error`]: the error taxonomy and result alias
//! - [`types`]: partition ids, offsets and poll results
//! - [`message`]: validated topic names
//! - [`protocol`]: the line-delimited request/response protocol
//! - [`config`]: typed configuration, loading and validation
//! - [`backoff`]: exponential backoff and the timer seam
//! - [`handler`]: the text-publish callback used by client connections
//! - [`telemetry`]: logging setup
//!
//! ## Quick Start
//!
//! ```rust
//! use quafka_core::protocol::{Request, Response};
//! use quafka_core::{Offset, PartitionId, PartitionOffset};
//!
//! let request = Request::parse("TEXT:hello").unwrap();
//! assert_eq!(request, Request::Text("hello".to_string()));
//!
//! let response = Response::Published(PartitionOffset::new(PartitionId(1), Offset(0)));
//! assert_eq!(response.encode(), "OK: Mesaj topic'e eklendi (partition: 1, offset: 0)");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod backoff;
pub mod config;
pub mod error;
pub mod handler;
pub mod message;
pub mod prelude;
pub mod protocol;
pub mod telemetry;
pub mod types;

pub use crate::{
    config::QuafkaConfig,
    error::{Error, ErrorKind, Result},
    handler::{SharedTextHandler, TextMessageHandler},
    message::Topic,
    types::{ConnectionId, MessageWithOffset, Offset, PartitionId, PartitionOffset, PollPosition},
};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
