//! Response lines: rendering on the broker side, parsing on the client side.

use crate::{
    protocol::{
        constants::{ERROR_PREFIX, OK_PREFIX},
        Command, ProtocolViolation,
    },
    types::{Offset, PartitionId, PartitionOffset},
    Error, Result,
};
use std::fmt;

const NOT_FOUND: &str = "Mesaj bulunamadı";
const COMMIT_SUFFIX: &str = " için commit başarılı";
const PUBLISHED_PREFIX: &str = "Mesaj topic'e eklendi (partition: ";
const OFFSET_MARKER: &str = " (offset: ";

/// A broker response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// `TEXT` accepted
    Published(PartitionOffset),
    /// `POLL` dequeued a message
    Message {
        /// Payload rendered as text
        payload: String,
        /// Offset reported by the partition
        offset: Offset,
    },
    /// `POLL` found nothing
    Empty,
    /// `COMMIT` acknowledged
    Committed(String),
    /// Request rejected
    Error(String),
}

impl Response {
    /// Error response for a rejected request line.
    #[must_use]
    pub fn violation(violation: &ProtocolViolation) -> Self {
        Self::Error(violation.to_string())
    }

    /// Render the response line, without terminator.
    #[must_use]
    pub fn encode(&self) -> String {
        match self {
            Self::Published(po) => format!(
                "{OK_PREFIX}{PUBLISHED_PREFIX}{}, offset: {})",
                po.partition, po.offset
            ),
            Self::Message { payload, offset } => {
                format!("{OK_PREFIX}{payload}{OFFSET_MARKER}{offset})")
            },
            Self::Empty => format!("{OK_PREFIX}{NOT_FOUND}"),
            Self::Committed(group) => format!("{OK_PREFIX}{group}{COMMIT_SUFFIX}"),
            Self::Error(reason) => format!("{ERROR_PREFIX}{reason}"),
        }
    }

    /// Whether this is an error response.
    #[must_use]
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }

    /// Parse a response line, knowing which command it answers.
    ///
    /// # Errors
    /// `SERVER_ERROR` for a `HATA:` line, `PROTOCOL_ERROR` for anything that does
    /// not match the expected shape.
    pub fn parse(command: Command, line: &str) -> Result<Self> {
        let line = line.trim_end_matches(['\r', '\n']);

        if let Some(reason) = line.strip_prefix(ERROR_PREFIX) {
            return Err(Error::server(reason.to_string()));
        }

        let body = line
            .strip_prefix(OK_PREFIX)
            .ok_or_else(|| Error::protocol(format!("unexpected response: {line}")))?;

        match command {
            Command::Text => parse_published(body).map(Self::Published),
            Command::Poll if body == NOT_FOUND => Ok(Self::Empty),
            Command::Poll => parse_message(body),
            Command::Commit => body
                .strip_suffix(COMMIT_SUFFIX)
                .map(|group| Self::Committed(group.to_string()))
                .ok_or_else(|| Error::protocol(format!("unexpected commit response: {line}"))),
        }
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

fn parse_published(body: &str) -> Result<PartitionOffset> {
    let malformed = || Error::protocol(format!("unexpected publish response: {body}"));

    let inner = body
        .strip_prefix(PUBLISHED_PREFIX)
        .and_then(|rest| rest.strip_suffix(')'))
        .ok_or_else(malformed)?;
    let (partition, offset) = inner.split_once(", offset: ").ok_or_else(malformed)?;

    let partition = partition.trim().parse::<u32>().map_err(|_| malformed())?;
    let offset = offset.trim().parse::<u64>().map_err(|_| malformed())?;
    Ok(PartitionOffset::new(PartitionId(partition), Offset(offset)))
}

fn parse_message(body: &str) -> Result<Response> {
    let malformed = || Error::protocol(format!("unexpected poll response: {body}"));

    let without_paren = body.strip_suffix(')').ok_or_else(malformed)?;
    let (payload, offset) = without_paren.rsplit_once(OFFSET_MARKER).ok_or_else(malformed)?;
    let offset = offset.trim().parse::<u64>().map_err(|_| malformed())?;

    Ok(Response::Message { payload: payload.to_string(), offset: Offset(offset) })
}
