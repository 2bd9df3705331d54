//! Topic names and payload classification.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum topic name length in bytes.
pub const MAX_TOPIC_LEN: usize = 255;

/// Validated topic name.
///
/// Names are limited to alphanumerics, `-`, `_` and `.`, so they never collide
/// with the `:` separator of the line protocol.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Topic(String);

impl Topic {
    /// Create a new topic.
    ///
    /// # Errors
    /// Returns a protocol error if the name is empty, too long or contains
    /// invalid characters.
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(Error::protocol("topic name cannot be empty"));
        }

        if name.len() > MAX_TOPIC_LEN {
            return Err(Error::protocol(format!(
                "topic name cannot exceed {MAX_TOPIC_LEN} characters"
            )));
        }

        if !name.chars().all(|c| c.is_alphanumeric() || c == '-' || c == '_' || c == '.') {
            return Err(Error::protocol(format!("topic name contains invalid characters: {name}")));
        }

        Ok(Self(name))
    }

    /// Get the topic name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Convert to owned string.
    #[must_use]
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for Topic {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Topic {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<Topic> for String {
    fn from(topic: Topic) -> Self {
        topic.0
    }
}

/// Content classification of a consumed payload, by prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PayloadKind {
    /// `TEXT:` prefixed or unprefixed
    Text,
    /// `JSON:` prefixed
    Json,
    /// `BINARY:` prefixed
    Binary,
}

impl PayloadKind {
    /// Classify a payload and strip its prefix.
    #[must_use]
    pub fn classify(payload: &str) -> (Self, &str) {
        if let Some(rest) = payload.strip_prefix("JSON:") {
            (Self::Json, rest)
        } else if let Some(rest) = payload.strip_prefix("BINARY:") {
            (Self::Binary, rest)
        } else if let Some(rest) = payload.strip_prefix("TEXT:") {
            (Self::Text, rest)
        } else {
            (Self::Text, payload)
        }
    }
}

impl fmt::Display for PayloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Json => write!(f, "json"),
            Self::Binary => write!(f, "binary"),
        }
    }
}
