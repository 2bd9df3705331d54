//! Client connection state machine.
//!
//! A [`ConnectionController`] owns one transport channel and moves through
//! [`ConnectionState`] with compare-and-swap transitions:
//!
//! ```text
//! Initialized | Disconnected | Error --connect--> Connecting --ok--> Connected
//!                                                 Connecting --fail--> Disconnected
//! Connected --disconnect--> Disconnecting --> Disconnected
//! Connected --send failure--> Error
//! ```
//!
//! Requests are serialized on the channel; a connection is meant to be used by
//! one borrower at a time.

use crate::{
    metrics::ConnectionMetrics,
    monitor::{ConnectionMonitor, TracingMonitor},
    retry::RetryExecutor,
    transport::{LineChannel, TcpTransport, Transport},
};
use quafka_core::{
    backoff::{Sleeper, TokioSleeper},
    config::ConnectionConfig,
    protocol::Request,
    ConnectionId, Error, Result, SharedTextHandler,
};
use std::{
    fmt,
    future::Future,
    sync::{
        atomic::{AtomicU8, Ordering},
        Arc,
    },
    time::Instant,
};
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Lifecycle state of a client connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ConnectionState {
    /// Created, never connected
    Initialized = 0,
    /// Opening the transport
    Connecting = 1,
    /// Ready for requests
    Connected = 2,
    /// Closing the transport
    Disconnecting = 3,
    /// Closed cleanly or after a failed connect
    Disconnected = 4,
    /// Transport broke while in use
    Error = 5,
}

impl ConnectionState {
    const fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Initialized,
            1 => Self::Connecting,
            2 => Self::Connected,
            3 => Self::Disconnecting,
            4 => Self::Disconnected,
            _ => Self::Error,
        }
    }

    /// Whether `connect` may start from this state.
    #[must_use]
    pub const fn can_connect(self) -> bool {
        matches!(self, Self::Initialized | Self::Disconnected | Self::Error)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Initialized => write!(f, "initialized"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
            Self::Disconnecting => write!(f, "disconnecting"),
            Self::Disconnected => write!(f, "disconnected"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// One logical client connection to a broker endpoint.
pub struct ConnectionController {
    config: ConnectionConfig,
    state: AtomicU8,
    channel: Mutex<Option<Box<dyn LineChannel>>>,
    transport: Arc<dyn Transport>,
    retry: RetryExecutor,
    metrics: Arc<ConnectionMetrics>,
    monitor: Arc<dyn ConnectionMonitor>,
    text_handler: Option<SharedTextHandler>,
}

impl fmt::Debug for ConnectionController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionController")
            .field("id", &self.id())
            .field("address", &self.config.address())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl ConnectionController {
    /// TCP connection for `config`, logging through `tracing`.
    #[must_use]
    pub fn new(config: ConnectionConfig) -> Self {
        Self::with_transport(config, Arc::new(TcpTransport))
    }

    /// Connection opening its channel through `transport`.
    #[must_use]
    pub fn with_transport(config: ConnectionConfig, transport: Arc<dyn Transport>) -> Self {
        let retry = RetryExecutor::from_config(&config, Arc::new(TokioSleeper));
        Self {
            config,
            state: AtomicU8::new(ConnectionState::Initialized as u8),
            channel: Mutex::new(None),
            transport,
            retry,
            metrics: Arc::new(ConnectionMetrics::new()),
            monitor: Arc::new(TracingMonitor),
            text_handler: None,
        }
    }

    /// Replace the lifecycle observer.
    #[must_use]
    pub fn with_monitor(mut self, monitor: Arc<dyn ConnectionMonitor>) -> Self {
        self.monitor = monitor;
        self
    }

    /// Invoke `handler` with the content of every answered `TEXT:` request.
    #[must_use]
    pub fn with_text_handler(mut self, handler: SharedTextHandler) -> Self {
        self.text_handler = Some(handler);
        self
    }

    /// Wait between retries through `sleeper`.
    #[must_use]
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.retry = RetryExecutor::from_config(&self.config, sleeper);
        self
    }

    /// Connection identity, taken from the configuration.
    pub fn id(&self) -> ConnectionId {
        self.config.connection_id
    }

    /// Endpoint configuration.
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Current state.
    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Whether requests can be sent.
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Counters for this connection.
    pub fn metrics(&self) -> &Arc<ConnectionMetrics> {
        &self.metrics
    }

    /// Open the transport.
    ///
    /// Only starts from `Initialized`, `Disconnected` or `Error`; from any
    /// other state this returns `Ok(())` without doing anything.
    ///
    /// # Errors
    /// Returns the transport's failure after moving back to `Disconnected`.
    pub async fn connect(&self) -> Result<()> {
        let from = self.state();
        if !from.can_connect() || !self.transition(from, ConnectionState::Connecting) {
            debug!("Connection {} not connecting from state {}", self.id(), self.state());
            return Ok(());
        }

        match self.transport.open(&self.config).await {
            Ok(channel) => {
                *self.channel.lock().await = Some(channel);
                self.transition(ConnectionState::Connecting, ConnectionState::Connected);
                self.metrics.record_connection();
                debug!("Connection {} established to {}", self.id(), self.config.address());
                Ok(())
            },
            Err(e) => {
                self.transition(ConnectionState::Connecting, ConnectionState::Disconnected);
                self.report(&e);
                Err(e)
            },
        }
    }

    /// Close the transport. A no-op unless `Connected`.
    ///
    /// # Errors
    /// Never fails; a failed close still ends in `Disconnected`.
    pub async fn disconnect(&self) -> Result<()> {
        if !self.transition(ConnectionState::Connected, ConnectionState::Disconnecting) {
            return Ok(());
        }

        let channel = self.channel.lock().await.take();
        if let Some(mut channel) = channel {
            if let Err(e) = channel.shutdown().await {
                warn!("Connection {} close failed: {}", self.id(), e);
            }
        }

        self.transition(ConnectionState::Disconnecting, ConnectionState::Disconnected);
        self.metrics.record_disconnection();
        Ok(())
    }

    /// Send one request line and return the response line.
    ///
    /// After a `TEXT:` request is answered, its content is passed to the text
    /// handler if one is installed.
    ///
    /// # Errors
    /// `PROTOCOL_ERROR` if `line` holds a line break, leaving the connection
    /// untouched. `NETWORK_ERROR` when not connected; otherwise the transport's
    /// failure, after which the connection is in `Error` and its channel dropped.
    pub async fn send(&self, line: &str) -> Result<String> {
        Request::check_line(line)?;
        if !self.is_connected() {
            return Err(self.not_connected());
        }

        let mut guard = self.channel.lock().await;
        let Some(channel) = guard.as_mut() else {
            return Err(self.not_connected());
        };

        let started = Instant::now();
        let outcome = channel.round_trip(line).await;
        match outcome {
            Ok(response) => {
                drop(guard);
                let latency = started.elapsed();
                self.metrics.record_operation(latency);
                self.monitor.on_performance(self.id(), latency);

                if let (Some(handler), Some(content)) =
                    (&self.text_handler, Request::text_content(line))
                {
                    handler.on_text_message(content);
                }
                Ok(response)
            },
            Err(e) => {
                guard.take();
                drop(guard);
                self.transition(ConnectionState::Connected, ConnectionState::Error);
                self.report(&e);
                Err(e)
            },
        }
    }

    /// Send on a spawned task; the request starts immediately.
    pub fn send_async(
        self: &Arc<Self>,
        line: impl Into<String>,
    ) -> impl Future<Output = Result<String>> + Send + 'static {
        let this = Arc::clone(self);
        let line = line.into();
        let handle = tokio::spawn(async move { this.send(&line).await });
        async move {
            handle
                .await
                .map_err(|e| Error::unknown(format!("send task failed: {e}")).with_source(e))?
        }
    }

    /// Run `operation` under the retry policy.
    ///
    /// Each attempt is timed into the metrics. When attempts run out the
    /// connection is torn down to `Disconnected` so the next user reconnects.
    ///
    /// # Errors
    /// `NETWORK_ERROR` when not connected; otherwise the final attempt's error.
    pub async fn execute<F, Fut, T>(&self, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if !self.is_connected() {
            return Err(self.not_connected());
        }

        let metrics = &self.metrics;
        let result = self
            .retry
            .execute(|| {
                let attempt = operation();
                async move {
                    let started = Instant::now();
                    let outcome = attempt.await;
                    metrics.record_operation(started.elapsed());
                    outcome
                }
            })
            .await;

        match result {
            Ok(value) => Ok(value),
            Err(e) => {
                self.report(&e);
                self.tear_down().await;
                Err(e)
            },
        }
    }

    /// [`execute`](Self::execute) on a spawned task.
    ///
    /// Fails without spawning when not connected.
    pub fn execute_async<F, Fut, T>(
        self: &Arc<Self>,
        operation: F,
    ) -> impl Future<Output = Result<T>> + Send + 'static
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        let handle = if self.is_connected() {
            let this = Arc::clone(self);
            Ok(tokio::spawn(async move { this.execute(operation).await }))
        } else {
            Err(self.not_connected())
        };
        async move {
            handle?
                .await
                .map_err(|e| Error::unknown(format!("execute task failed: {e}")).with_source(e))?
        }
    }

    /// Send `line`, reconnecting before each retry if the previous attempt broke the transport.
    ///
    /// # Errors
    /// As [`execute`](Self::execute).
    pub async fn send_with_retry(&self, line: &str) -> Result<String> {
        self.execute(|| async move {
            if !self.is_connected() {
                self.connect().await?;
            }
            self.send(line).await
        })
        .await
    }

    fn transition(&self, from: ConnectionState, to: ConnectionState) -> bool {
        let swapped = self
            .state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if swapped {
            self.monitor.on_state_change(self.id(), from, to);
        }
        swapped
    }

    async fn tear_down(&self) {
        let channel = self.channel.lock().await.take();
        if let Some(mut channel) = channel {
            if let Err(e) = channel.shutdown().await {
                warn!("Connection {} close during tear-down failed: {}", self.id(), e);
            }
        }
        let from = ConnectionState::from_u8(
            self.state.swap(ConnectionState::Disconnected as u8, Ordering::AcqRel),
        );
        if from != ConnectionState::Disconnected {
            self.monitor.on_state_change(self.id(), from, ConnectionState::Disconnected);
            self.metrics.record_disconnection();
        }
    }

    fn report(&self, error: &Error) {
        self.metrics.record_error();
        self.monitor.on_error(self.id(), error);
    }

    fn not_connected(&self) -> Error {
        Error::network(format!("connection {} is {}", self.id(), self.state()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        monitor::recording::RecordingMonitor,
        retry::testing::RecordingSleeper,
        transport::mock::MockTransport,
    };
    use quafka_core::{ErrorKind, Offset, PartitionId, PartitionOffset};
    use std::{
        sync::atomic::{AtomicUsize, Ordering},
        time::Duration,
    };

    fn config(max_retries: u32) -> ConnectionConfig {
        ConnectionConfig::new("127.0.0.1", 9)
            .with_max_retries(max_retries)
            .with_retry_delays(Duration::from_millis(100), Duration::from_millis(1000))
    }

    fn controller(transport: &MockTransport, max_retries: u32) -> ConnectionController {
        ConnectionController::with_transport(config(max_retries), Arc::new(transport.clone()))
            .with_sleeper(Arc::new(RecordingSleeper::default()))
    }

    #[tokio::test]
    async fn test_lifecycle_transitions() {
        let transport = MockTransport::echo();
        let monitor = Arc::new(RecordingMonitor::default());
        let conn = controller(&transport, 0).with_monitor(monitor.clone());
        assert_eq!(conn.state(), ConnectionState::Initialized);

        conn.connect().await.unwrap();
        assert!(conn.is_connected());
        conn.connect().await.unwrap();
        assert_eq!(transport.opens.load(Ordering::SeqCst), 1);

        conn.disconnect().await.unwrap();
        assert_eq!(conn.state(), ConnectionState::Disconnected);
        conn.disconnect().await.unwrap();

        use ConnectionState::*;
        assert_eq!(
            *monitor.transitions.lock(),
            vec![
                (Initialized, Connecting),
                (Connecting, Connected),
                (Connected, Disconnecting),
                (Disconnecting, Disconnected),
            ]
        );
        let snapshot = conn.metrics().snapshot();
        assert_eq!((snapshot.connections, snapshot.disconnections), (1, 1));
    }

    #[tokio::test]
    async fn test_failed_connect_returns_to_disconnected() {
        let transport = MockTransport::echo();
        transport.fail_next_opens(1);
        let monitor = Arc::new(RecordingMonitor::default());
        let conn = controller(&transport, 0).with_monitor(monitor.clone());

        let err = conn.connect().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NetworkError);
        assert_eq!(conn.state(), ConnectionState::Disconnected);
        assert_eq!(*monitor.errors.lock(), vec!["NETWORK_ERROR".to_string()]);

        conn.connect().await.unwrap();
        assert!(conn.is_connected());
    }

    #[tokio::test]
    async fn test_send_requires_connection() {
        let conn = controller(&MockTransport::echo(), 0);
        let err = conn.send("TEXT:x").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NetworkError);
    }

    #[tokio::test]
    async fn test_send_invokes_text_handler() {
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let handler: SharedTextHandler = Arc::new(move |content: &str| {
            sink.lock().push(content.to_string());
            Some(PartitionOffset::new(PartitionId(0), Offset(0)))
        });
        let transport = MockTransport::echo();
        let conn = controller(&transport, 0).with_text_handler(handler);
        conn.connect().await.unwrap();

        assert_eq!(conn.send("TEXT:hello").await.unwrap(), "OK: TEXT:hello");
        assert_eq!(conn.send("POLL:t:0").await.unwrap(), "OK: POLL:t:0");
        assert_eq!(*seen.lock(), vec!["hello".to_string()]);
        assert_eq!(transport.requests.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_send_rejects_line_breaks_without_writing() {
        let transport = MockTransport::echo();
        let conn = controller(&transport, 0);
        conn.connect().await.unwrap();

        let err = conn.send("TEXT:a\nb").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ProtocolError);
        assert_eq!(transport.requests.load(Ordering::SeqCst), 0);
        assert!(conn.is_connected());

        assert_eq!(conn.send("COMMIT:g").await.unwrap(), "OK: COMMIT:g");
    }

    #[tokio::test]
    async fn test_tear_down_survives_failed_close() {
        let transport = MockTransport::echo();
        transport.fail_shutdowns();
        let conn = controller(&transport, 0);
        conn.connect().await.unwrap();

        let result = conn.execute(|| async { Err::<(), _>(Error::server("down")) }).await;
        assert!(result.is_err());
        assert_eq!(conn.state(), ConnectionState::Disconnected);
        assert_eq!(conn.metrics().snapshot().disconnections, 1);
    }

    #[tokio::test]
    async fn test_send_failure_moves_to_error() {
        let transport = MockTransport::new(|_| Err(Error::network("reset")));
        let conn = controller(&transport, 0);
        conn.connect().await.unwrap();

        assert!(conn.send("TEXT:x").await.is_err());
        assert_eq!(conn.state(), ConnectionState::Error);

        conn.connect().await.unwrap();
        assert!(conn.is_connected());
    }

    #[tokio::test]
    async fn test_execute_attempts_and_leaves_disconnected() {
        let conn = controller(&MockTransport::echo(), 2);
        conn.connect().await.unwrap();
        let attempts = &AtomicUsize::new(0);

        let err = conn
            .execute(|| async move {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(Error::server("down"))
            })
            .await
            .unwrap_err();

        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        assert_eq!(err.kind(), ErrorKind::ServerError);
        assert_eq!(conn.state(), ConnectionState::Disconnected);
        assert_eq!(conn.metrics().snapshot().operations, 3);
    }

    #[tokio::test]
    async fn test_send_with_retry_reconnects() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let transport = MockTransport::new(move |line| {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(Error::network("reset"))
            } else {
                Ok(format!("OK: {line}"))
            }
        });
        let conn = controller(&transport, 2);
        conn.connect().await.unwrap();

        assert_eq!(conn.send_with_retry("COMMIT:g").await.unwrap(), "OK: COMMIT:g");
        assert_eq!(transport.opens.load(Ordering::SeqCst), 2);
        assert!(conn.is_connected());
    }

    #[tokio::test]
    async fn test_async_variants() {
        let conn = Arc::new(controller(&MockTransport::echo(), 0));
        let err = conn.execute_async(|| async { Ok(1) }).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NetworkError);

        conn.connect().await.unwrap();
        assert_eq!(conn.send_async("TEXT:a").await.unwrap(), "OK: TEXT:a");
        assert_eq!(conn.execute_async(|| async { Ok(7) }).await.unwrap(), 7);
    }
}
