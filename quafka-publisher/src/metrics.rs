//! Per-connection counters.

use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

/// Lock-free counters updated by a connection as it works.
#[derive(Debug, Default)]
pub struct ConnectionMetrics {
    connections: AtomicU64,
    disconnections: AtomicU64,
    errors: AtomicU64,
    operations: AtomicU64,
    total_latency_us: AtomicU64,
    max_latency_us: AtomicU64,
}

/// Point-in-time copy of [`ConnectionMetrics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetricsSnapshot {
    /// Successful connects
    pub connections: u64,
    /// Completed disconnects
    pub disconnections: u64,
    /// Failures of any kind
    pub errors: u64,
    /// Timed operation attempts
    pub operations: u64,
    /// Mean attempt latency
    pub average_latency: Duration,
    /// Slowest attempt latency
    pub max_latency: Duration,
}

impl ConnectionMetrics {
    /// Zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Count a successful connect.
    pub fn record_connection(&self) {
        self.connections.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a completed disconnect.
    pub fn record_disconnection(&self) {
        self.disconnections.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a failure.
    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Count one timed attempt.
    pub fn record_operation(&self, latency: Duration) {
        let micros = u64::try_from(latency.as_micros()).unwrap_or(u64::MAX);
        self.operations.fetch_add(1, Ordering::Relaxed);
        self.total_latency_us.fetch_add(micros, Ordering::Relaxed);
        self.max_latency_us.fetch_max(micros, Ordering::Relaxed);
    }

    /// Read all counters.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        let operations = self.operations.load(Ordering::Relaxed);
        let total = self.total_latency_us.load(Ordering::Relaxed);
        MetricsSnapshot {
            connections: self.connections.load(Ordering::Relaxed),
            disconnections: self.disconnections.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            operations,
            average_latency: Duration::from_micros(total.checked_div(operations).unwrap_or(0)),
            max_latency: Duration::from_micros(self.max_latency_us.load(Ordering::Relaxed)),
        }
    }
}
