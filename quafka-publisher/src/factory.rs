//! Builds connections sharing one transport, monitor and timer.

use crate::{
    connection::ConnectionController,
    monitor::{ConnectionMonitor, TracingMonitor},
    transport::{TcpTransport, Transport},
};
use quafka_core::{
    backoff::{Sleeper, TokioSleeper},
    config::ConnectionConfig,
    SharedTextHandler,
};
use std::{fmt, sync::Arc};

/// Creates [`ConnectionController`]s.
#[derive(Clone)]
pub struct ConnectionFactory {
    transport: Arc<dyn Transport>,
    monitor: Arc<dyn ConnectionMonitor>,
    sleeper: Arc<dyn Sleeper>,
    text_handler: Option<SharedTextHandler>,
}

impl fmt::Debug for ConnectionFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionFactory")
            .field("transport", &self.transport)
            .field("monitor", &self.monitor)
            .field("text_handler", &self.text_handler.is_some())
            .finish_non_exhaustive()
    }
}

impl Default for ConnectionFactory {
    fn default() -> Self {
        Self::new(Arc::new(TcpTransport))
    }
}

impl ConnectionFactory {
    /// Factory over `transport` with tracing and the tokio timer.
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            monitor: Arc::new(TracingMonitor),
            sleeper: Arc::new(TokioSleeper),
            text_handler: None,
        }
    }

    /// Set the monitor for created connections.
    #[must_use]
    pub fn with_monitor(mut self, monitor: Arc<dyn ConnectionMonitor>) -> Self {
        self.monitor = monitor;
        self
    }

    /// Set the retry timer for created connections.
    #[must_use]
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Install a text handler on created connections.
    #[must_use]
    pub fn with_text_handler(mut self, handler: SharedTextHandler) -> Self {
        self.text_handler = Some(handler);
        self
    }

    /// Shared timer.
    pub fn sleeper(&self) -> &Arc<dyn Sleeper> {
        &self.sleeper
    }

    /// New unconnected connection carrying `config`'s identity.
    #[must_use]
    pub fn create(&self, config: ConnectionConfig) -> Arc<ConnectionController> {
        let mut connection =
            ConnectionController::with_transport(config, Arc::clone(&self.transport))
                .with_monitor(Arc::clone(&self.monitor))
                .with_sleeper(Arc::clone(&self.sleeper));
        if let Some(handler) = &self.text_handler {
            connection = connection.with_text_handler(Arc::clone(handler));
        }
        Arc::new(connection)
    }
}
