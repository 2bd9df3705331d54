//! Error types shared by every Quafka crate.
//!
//! Every failure that crosses a component boundary carries an [`ErrorKind`], a
//! human-readable message and, where one exists, the originating cause.

use std::{fmt, io, sync::Arc};
use thiserror::Error;

/// Classification of a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Connect, borrow or response wait exceeded its deadline
    ConnectionTimeout,
    /// Credentials were rejected
    AuthenticationFailed,
    /// Authenticated peer lacks permission
    AuthorizationFailed,
    /// Transport-level I/O failure
    NetworkError,
    /// Server answered with an error line
    ServerError,
    /// Malformed request or response
    ProtocolError,
    /// Anything else
    UnknownError,
    /// Pool has no free capacity
    PoolFull,
    /// Pool has no connection to hand out
    PoolEmpty,
    /// Liveness probe failed or timed out
    HealthCheckFailed,
    /// Reconnect attempts exhausted
    ReconnectFailed,
    /// No candidate could be selected
    LoadBalancingError,
    /// Invalid configuration value
    Configuration,
}

impl ErrorKind {
    /// Stable upper-case code for this kind.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::ConnectionTimeout => "CONNECTION_TIMEOUT",
            Self::AuthenticationFailed => "AUTHENTICATION_FAILED",
            Self::AuthorizationFailed => "AUTHORIZATION_FAILED",
            Self::NetworkError => "NETWORK_ERROR",
            Self::ServerError => "SERVER_ERROR",
            Self::ProtocolError => "PROTOCOL_ERROR",
            Self::UnknownError => "UNKNOWN_ERROR",
            Self::PoolFull => "POOL_FULL",
            Self::PoolEmpty => "POOL_EMPTY",
            Self::HealthCheckFailed => "HEALTH_CHECK_FAILED",
            Self::ReconnectFailed => "RECONNECT_FAILED",
            Self::LoadBalancingError => "LOAD_BALANCING_ERROR",
            Self::Configuration => "CONFIGURATION_ERROR",
        }
    }

    /// Whether an operation failing with this kind is worth retrying.
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(
            self,
            Self::ConnectionTimeout | Self::NetworkError | Self::ServerError | Self::UnknownError
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

type Cause = Arc<dyn std::error::Error + Send + Sync + 'static>;

/// Main error type for Quafka operations.
#[derive(Error, Debug, Clone)]
#[error("{kind}: {message}")]
pub struct Error {
    kind: ErrorKind,
    message: String,
    #[source]
    source: Option<Cause>,
}

/// Result type alias for Quafka operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create an error of the given kind.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into(), source: None }
    }

    /// Attach the originating cause.
    #[must_use]
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(Arc::new(source));
        self
    }

    /// The failure classification.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// The human-readable message, without the kind prefix.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Whether retrying the failed operation could succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }

    /// `CONNECTION_TIMEOUT`
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ConnectionTimeout, message)
    }

    /// `NETWORK_ERROR`
    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NetworkError, message)
    }

    /// `SERVER_ERROR`
    pub fn server(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ServerError, message)
    }

    /// `PROTOCOL_ERROR`
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ProtocolError, message)
    }

    /// `UNKNOWN_ERROR`
    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::UnknownError, message)
    }

    /// `POOL_FULL`
    pub fn pool_full(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::PoolFull, message)
    }

    /// `POOL_EMPTY`
    pub fn pool_empty(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::PoolEmpty, message)
    }

    /// `HEALTH_CHECK_FAILED`
    pub fn health_check(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::HealthCheckFailed, message)
    }

    /// `RECONNECT_FAILED`
    pub fn reconnect(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ReconnectFailed, message)
    }

    /// `LOAD_BALANCING_ERROR`
    pub fn load_balancing(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::LoadBalancingError, message)
    }

    /// Invalid configuration.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Configuration, message)
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        let kind = match err.kind() {
            io::ErrorKind::TimedOut => ErrorKind::ConnectionTimeout,
            _ => ErrorKind::NetworkError,
        };
        Self::new(kind, err.to_string()).with_source(err)
    }
}

impl From<tokio::time::error::Elapsed> for Error {
    fn from(err: tokio::time::error::Elapsed) -> Self {
        Self::timeout("operation timed out").with_source(err)
    }
}

impl From<validator::ValidationErrors> for Error {
    fn from(err: validator::ValidationErrors) -> Self {
        Self::configuration(format!("validation failed: {err}"))
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Self::configuration(format!("failed to parse configuration: {err}")).with_source(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_display_includes_code_and_message() {
        let err = Error::pool_full("no capacity");
        assert_eq!(err.to_string(), "POOL_FULL: no capacity");
        assert_eq!(err.kind(), ErrorKind::PoolFull);
        assert_eq!(err.message(), "no capacity");
    }

    #[test]
    fn test_io_error_mapping_keeps_cause() {
        let err: Error = io::Error::new(io::ErrorKind::TimedOut, "slow").into();
        assert_eq!(err.kind(), ErrorKind::ConnectionTimeout);
        assert!(err.source().is_some());

        let err: Error = io::Error::new(io::ErrorKind::ConnectionRefused, "refused").into();
        assert_eq!(err.kind(), ErrorKind::NetworkError);
    }

    #[test]
    fn test_retryable_kinds() {
        assert!(Error::network("x").is_retryable());
        assert!(!Error::protocol("x").is_retryable());
        assert!(!Error::pool_empty("x").is_retryable());
    }

    #[test]
    fn test_clone_shares_source() {
        let err = Error::network("boom").with_source(io::Error::new(io::ErrorKind::Other, "inner"));
        let cloned = err.clone();
        assert_eq!(cloned.source().map(ToString::to_string), Some("inner".to_string()));
    }
}
