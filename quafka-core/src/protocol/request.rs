//! Request lines and their parser.

use crate::{protocol::constants::SEPARATOR, types::PartitionId};
use std::fmt;

/// Request command tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    /// Publish to the default topic
    Text,
    /// Destructive poll of one partition
    Poll,
    /// Consumer-group commit acknowledgement
    Commit,
}

impl Command {
    /// Wire name of the command.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Text => "TEXT",
            Self::Poll => "POLL",
            Self::Commit => "COMMIT",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed request line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// `TEXT:<content>`
    Text(String),
    /// `POLL:<topic>:<partition>`
    Poll {
        /// Topic name as sent; unknown or invalid names simply find nothing
        topic: String,
        /// Partition to dequeue from
        partition: PartitionId,
    },
    /// `COMMIT:<group>`
    Commit(String),
}

/// Why a request line was rejected.
///
/// `Display` renders the reason exactly as it appears after `HATA: `.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolViolation {
    /// Blank line
    Empty,
    /// No `:` separator
    MissingSeparator,
    /// `POLL` payload is not `topic:partition`
    InvalidPoll,
    /// Partition is not a non-negative integer
    InvalidPartition(String),
    /// Command is not one of `TEXT`, `POLL`, `COMMIT`
    UnknownCommand(String),
}

impl fmt::Display for ProtocolViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "Boş mesaj"),
            Self::MissingSeparator => write!(f, "Geçersiz mesaj formatı"),
            Self::InvalidPoll => write!(f, "Geçersiz POLL formatı (topic:partition)"),
            Self::InvalidPartition(raw) => write!(f, "Geçersiz partition: {raw}"),
            Self::UnknownCommand(cmd) => write!(f, "Bilinmeyen komut: {cmd}"),
        }
    }
}

impl std::error::Error for ProtocolViolation {}

impl Request {
    /// Parse a single request line (without its terminator).
    ///
    /// # Errors
    /// Returns the [`ProtocolViolation`] that the server reports back as `HATA: ...`.
    pub fn parse(line: &str) -> Result<Self, ProtocolViolation> {
        if line.trim().is_empty() {
            return Err(ProtocolViolation::Empty);
        }

        let (command, payload) =
            line.split_once(SEPARATOR).ok_or(ProtocolViolation::MissingSeparator)?;

        match command {
            "TEXT" => Ok(Self::Text(payload.to_string())),
            "POLL" => Self::parse_poll(payload),
            "COMMIT" => Ok(Self::Commit(payload.to_string())),
            other => Err(ProtocolViolation::UnknownCommand(other.to_string())),
        }
    }

    fn parse_poll(payload: &str) -> Result<Self, ProtocolViolation> {
        // Trailing empty segments are ignored, so `orders:1:` still reads as `orders:1`.
        let mut parts: Vec<&str> = payload.split(SEPARATOR).collect();
        while parts.last().is_some_and(|p| p.is_empty()) {
            parts.pop();
        }

        let [topic, partition] = parts.as_slice() else {
            return Err(ProtocolViolation::InvalidPoll);
        };

        let partition = partition
            .parse::<u32>()
            .map_err(|_| ProtocolViolation::InvalidPartition((*partition).to_string()))?;

        Ok(Self::Poll { topic: (*topic).to_string(), partition: PartitionId(partition) })
    }

    /// Command tag of this request.
    #[must_use]
    pub fn command(&self) -> Command {
        match self {
            Self::Text(_) => Command::Text,
            Self::Poll { .. } => Command::Poll,
            Self::Commit(_) => Command::Commit,
        }
    }

    /// Render the request line, without terminator.
    #[must_use]
    pub fn encode(&self) -> String {
        match self {
            Self::Text(content) => format!("TEXT:{content}"),
            Self::Poll { topic, partition } => format!("POLL:{topic}:{partition}"),
            Self::Commit(group) => format!("COMMIT:{group}"),
        }
    }

    /// Check that `line` goes on the wire as exactly one request.
    ///
    /// # Errors
    /// `PROTOCOL_ERROR` if `line` contains `\n` or `\r`.
    pub fn check_line(line: &str) -> crate::Result<()> {
        match line.find(['\n', '\r']) {
            Some(at) => Err(crate::Error::protocol(format!(
                "request line contains a line break at byte {at}"
            ))),
            None => Ok(()),
        }
    }

    /// Content of a `TEXT:` line, if `line` is one.
    ///
    /// Used on the client side to recognise text publishes without a full parse.
    #[must_use]
    pub fn text_content(line: &str) -> Option<&str> {
        line.strip_prefix("TEXT:")
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}
