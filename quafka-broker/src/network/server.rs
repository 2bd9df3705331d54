//! TCP server lifecycle: bind, serve in the background, report, shut down.

use crate::{
    network::{listener::TcpListener, session::SessionRegistry},
    routing::RequestRouter,
};
use quafka_core::{config::ServerConfig, Error, Result};
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::{sync::broadcast, task::JoinHandle};
use tracing::{info, warn};

/// Line-protocol TCP server.
#[derive(Debug)]
pub struct TcpServer {
    config: ServerConfig,
    router: RequestRouter,
    registry: Arc<SessionRegistry>,
    shutdown_tx: Option<broadcast::Sender<()>>,
    server_task: Option<JoinHandle<Result<()>>>,
    metrics_task: Option<JoinHandle<()>>,
    local_addr: Option<SocketAddr>,
    metrics_interval: Duration,
}

impl TcpServer {
    /// Create a stopped server.
    ///
    /// # Errors
    /// Returns a configuration error if the limits are zero.
    pub fn new(config: ServerConfig, router: RequestRouter) -> Result<Self> {
        validate(&config)?;
        let registry = Arc::new(SessionRegistry::new(config.max_connections));
        Ok(Self {
            config,
            router,
            registry,
            shutdown_tx: None,
            server_task: None,
            metrics_task: None,
            local_addr: None,
            metrics_interval: Duration::from_secs(10),
        })
    }

    /// Bind and start accepting in the background. Returns the bound address.
    ///
    /// # Errors
    /// Fails if already running or if binding fails.
    pub async fn start(&mut self) -> Result<SocketAddr> {
        if self.is_running() {
            return Err(Error::server("server is already running"));
        }

        let listener =
            TcpListener::bind(&self.config, self.router.clone(), Arc::clone(&self.registry))
                .await?;
        let local_addr = listener.local_addr();

        let (shutdown_tx, _) = broadcast::channel(1);
        self.server_task = Some(tokio::spawn(listener.run(shutdown_tx.subscribe())));

        let registry = Arc::clone(&self.registry);
        let metrics_shutdown = shutdown_tx.subscribe();
        let period = self.metrics_interval;
        self.metrics_task = Some(tokio::spawn(async move {
            metrics_collection_task(registry, period, metrics_shutdown).await;
        }));

        self.shutdown_tx = Some(shutdown_tx);
        self.local_addr = Some(local_addr);
        info!(
            "TCP server started on {} (max connections: {})",
            local_addr, self.config.max_connections
        );
        Ok(local_addr)
    }

    /// Stop accepting, close sessions and wait for the accept task.
    ///
    /// # Errors
    /// Fails if the server is not running.
    pub async fn stop(&mut self) -> Result<()> {
        let Some(shutdown_tx) = self.shutdown_tx.take() else {
            return Err(Error::server("server is not running"));
        };
        let _ = shutdown_tx.send(());

        if let Some(task) = self.server_task.take() {
            match task.await {
                Ok(Ok(())) => {},
                Ok(Err(e)) => warn!("Listener finished with error: {}", e),
                Err(e) => warn!("Listener task failed: {}", e),
            }
        }
        if let Some(task) = self.metrics_task.take() {
            task.abort();
        }

        self.local_addr = None;
        info!("TCP server stopped");
        Ok(())
    }

    /// Whether the accept task is alive.
    pub fn is_running(&self) -> bool {
        self.server_task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Bound address while running.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Session registry.
    pub fn sessions(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

fn validate(config: &ServerConfig) -> Result<()> {
    if config.max_connections == 0 {
        return Err(Error::configuration("max_connections must be greater than 0"));
    }
    if config.worker_threads == 0 {
        return Err(Error::configuration("worker_threads must be greater than 0"));
    }
    if config.backlog == 0 {
        return Err(Error::configuration("backlog must be greater than 0"));
    }
    Ok(())
}

async fn metrics_collection_task(
    registry: Arc<SessionRegistry>,
    period: Duration,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    let mut interval = tokio::time::interval(period);
    interval.tick().await;

    loop {
        tokio::select! {
            _ = interval.tick() => {
                info!(
                    "Session metrics - Active: {}, Total: {}",
                    registry.active_count(),
                    registry.total_accepted()
                );
            }
            _ = shutdown_rx.recv() => break,
        }
    }
}

/// Builder for [`TcpServer`].
#[derive(Debug)]
pub struct TcpServerBuilder {
    config: ServerConfig,
    metrics_interval: Duration,
}

impl Default for TcpServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TcpServerBuilder {
    /// Builder starting from [`ServerConfig::default`].
    pub fn new() -> Self {
        Self { config: ServerConfig::default(), metrics_interval: Duration::from_secs(10) }
    }

    /// Replace the whole server configuration.
    #[must_use]
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the bind host and port.
    #[must_use]
    pub fn bind(mut self, host: impl Into<String>, port: u16) -> Self {
        self.config.host = host.into();
        self.config.port = port;
        self
    }

    /// Set the session limit.
    #[must_use]
    pub fn max_connections(mut self, max: usize) -> Self {
        self.config.max_connections = max;
        self
    }

    /// Set the number of concurrently served sessions.
    #[must_use]
    pub fn worker_threads(mut self, workers: usize) -> Self {
        self.config.worker_threads = workers;
        self
    }

    /// Set the period of the session metrics log line.
    #[must_use]
    pub fn metrics_interval(mut self, period: Duration) -> Self {
        self.metrics_interval = period;
        self
    }

    /// Build the server.
    ///
    /// # Errors
    /// Returns a configuration error if the limits are zero.
    pub fn build(self, router: RequestRouter) -> Result<TcpServer> {
        let mut server = TcpServer::new(self.config, router)?;
        server.metrics_interval = self.metrics_interval;
        Ok(server)
    }
}
