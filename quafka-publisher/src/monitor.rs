//! Observer hooks for connection lifecycle events.

use crate::connection::ConnectionState;
use quafka_core::{ConnectionId, Error};
use std::{fmt, time::Duration};
use tracing::{debug, info, warn};

/// Receives connection lifecycle notifications.
///
/// Implementations must be cheap; they run inline on the connection's task.
pub trait ConnectionMonitor: Send + Sync + fmt::Debug {
    /// A state transition completed.
    fn on_state_change(&self, id: ConnectionId, from: ConnectionState, to: ConnectionState);

    /// An operation or transition failed.
    fn on_error(&self, id: ConnectionId, error: &Error);

    /// One operation attempt finished in `latency`.
    fn on_performance(&self, id: ConnectionId, latency: Duration) {
        let _ = (id, latency);
    }
}

/// [`ConnectionMonitor`] that writes to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingMonitor;

impl ConnectionMonitor for TracingMonitor {
    fn on_state_change(&self, id: ConnectionId, from: ConnectionState, to: ConnectionState) {
        info!(connection_id = %id, %from, %to, "Connection state changed");
    }

    fn on_error(&self, id: ConnectionId, error: &Error) {
        warn!(connection_id = %id, code = error.kind().code(), "Connection error: {}", error);
    }

    fn on_performance(&self, id: ConnectionId, latency: Duration) {
        debug!(connection_id = %id, latency_us = latency.as_micros() as u64, "Operation completed");
    }
}

#[cfg(test)]
pub(crate) mod recording {
    use super::*;
    use parking_lot::Mutex;

    /// Monitor that keeps every transition for assertions.
    #[derive(Debug, Default)]
    pub(crate) struct RecordingMonitor {
        pub(crate) transitions: Mutex<Vec<(ConnectionState, ConnectionState)>>,
        pub(crate) errors: Mutex<Vec<String>>,
    }

    impl ConnectionMonitor for RecordingMonitor {
        fn on_state_change(&self, _id: ConnectionId, from: ConnectionState, to: ConnectionState) {
            self.transitions.lock().push((from, to));
        }

        fn on_error(&self, _id: ConnectionId, error: &Error) {
            self.errors.lock().push(error.kind().code().to_string());
        }
    }
}
