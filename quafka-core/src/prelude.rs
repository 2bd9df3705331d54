//! # Prelude
//!
//! Commonly used types and traits from Quafka Core.

pub use crate::{
    backoff::{Backoff, Sleeper, TokioSleeper},
    config::{
        ConnectionConfig, ConsumerConfig, HealthCheckConfig, LoadBalancingStrategy, PoolConfig,
        QuafkaConfig, ReconnectConfig, ServerConfig,
    },
    error::{Error, ErrorKind, Result},
    handler::{SharedTextHandler, TextMessageHandler},
    message::Topic,
    protocol::{Command, Request, Response},
    types::{ConnectionId, MessageWithOffset, Offset, PartitionId, PartitionOffset, PollPosition},
};

pub use bytes::Bytes;
