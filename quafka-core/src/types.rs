//! Common types used throughout the Quafka system.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Partition identifier within a topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct PartitionId(pub u32);

impl PartitionId {
    /// Create a new partition ID.
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Get the raw partition ID value.
    #[must_use]
    pub const fn value(self) -> u32 {
        self.0
    }

    /// Position of this partition in its topic's partition list.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for PartitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for PartitionId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

/// Message offset within a partition.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct Offset(pub u64);

impl Offset {
    /// Create a new offset.
    #[must_use]
    pub const fn new(offset: u64) -> Self {
        Self(offset)
    }

    /// Get the next offset.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }

    /// Get the raw offset value.
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Offset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Offset {
    fn from(offset: u64) -> Self {
        Self(offset)
    }
}

/// Which offset a poll should read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PollPosition {
    /// Dequeue the oldest pending message. Encoded as `-1` on the wire.
    Next,
    /// Peek the head of the partition if `offset` is behind the last assigned one.
    At(Offset),
}

impl PollPosition {
    /// Interpret the signed representation where `-1` means [`PollPosition::Next`].
    #[must_use]
    pub fn from_raw(raw: i64) -> Option<Self> {
        match raw {
            -1 => Some(Self::Next),
            n if n >= 0 => Some(Self::At(Offset(n as u64))),
            _ => None,
        }
    }
}

/// Placement of a published message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PartitionOffset {
    /// Partition that received the message
    pub partition: PartitionId,
    /// Offset assigned within that partition
    pub offset: Offset,
}

impl PartitionOffset {
    /// Create a new placement.
    #[must_use]
    pub const fn new(partition: PartitionId, offset: Offset) -> Self {
        Self { partition, offset }
    }
}

impl fmt::Display for PartitionOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.partition, self.offset)
    }
}

/// Result of polling a partition.
///
/// `payload` is `None` when the peek path found the partition empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageWithOffset {
    /// Message content, if any
    pub payload: Option<Bytes>,
    /// Offset reported by the partition
    pub offset: Offset,
}

impl MessageWithOffset {
    /// Create a poll result.
    #[must_use]
    pub fn new(payload: Option<Bytes>, offset: Offset) -> Self {
        Self { payload, offset }
    }

    /// Payload as UTF-8 text, replacing invalid sequences.
    #[must_use]
    pub fn payload_text(&self) -> Option<String> {
        self.payload.as_ref().map(|p| String::from_utf8_lossy(p).into_owned())
    }
}

/// Identity of a client connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    /// Generate a new random identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse an identifier from its textual form.
    pub fn parse(s: &str) -> crate::Result<Self> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| crate::Error::configuration(format!("invalid connection id {s}: {e}")))
    }

    /// Get the underlying UUID.
    #[must_use]
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
