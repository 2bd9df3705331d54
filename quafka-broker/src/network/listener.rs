//! Accept loop and per-session line handling.
//!
//! Each accepted transport gets its own task, but only `worker_threads` of them
//! serve requests at once; the rest wait for a worker permit.

use crate::{
    network::session::{Session, SessionRegistry, SessionState},
    routing::RequestRouter,
};
use quafka_core::{config::ServerConfig, Error, Result};
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::{TcpListener as TokioTcpListener, TcpSocket, TcpStream},
    sync::{broadcast, Semaphore},
    time::timeout,
};
use tracing::{debug, error, info, warn};

/// Bound TCP listener serving the line protocol.
#[derive(Debug)]
pub struct TcpListener {
    listener: TokioTcpListener,
    local_addr: SocketAddr,
    router: RequestRouter,
    registry: Arc<SessionRegistry>,
    workers: Arc<Semaphore>,
    worker_count: usize,
}

impl TcpListener {
    /// Bind according to `config`, honouring its backlog.
    ///
    /// # Errors
    /// Returns `NETWORK_ERROR` if the address cannot be resolved or bound.
    pub async fn bind(
        config: &ServerConfig,
        router: RequestRouter,
        registry: Arc<SessionRegistry>,
    ) -> Result<Self> {
        let addr = resolve(&config.bind_address()).await?;

        let socket = if addr.is_ipv4() { TcpSocket::new_v4()? } else { TcpSocket::new_v6()? };
        socket.set_reuseaddr(true)?;
        socket.bind(addr).map_err(|e| {
            Error::network(format!("failed to bind to {addr}: {e}")).with_source(e)
        })?;
        let listener = socket.listen(config.backlog)?;
        let local_addr = listener.local_addr()?;

        info!(
            "TCP listener bound on {} (backlog: {}, workers: {}, max connections: {})",
            local_addr, config.backlog, config.worker_threads, config.max_connections
        );

        Ok(Self {
            listener,
            local_addr,
            router,
            registry,
            workers: Arc::new(Semaphore::new(config.worker_threads)),
            worker_count: config.worker_threads,
        })
    }

    /// Actual bound address.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accept until `shutdown_rx` fires, then wait for sessions to finish.
    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        let (shutdown_tx, _) = broadcast::channel::<()>(1);
        let mut sessions = tokio::task::JoinSet::new();

        loop {
            tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        if let Some(session) = self.admit(peer) {
                            let router = self.router.clone();
                            let registry = Arc::clone(&self.registry);
                            let workers = Arc::clone(&self.workers);
                            let shutdown = shutdown_tx.subscribe();
                            sessions.spawn(async move {
                                serve(stream, session, router, registry, workers, shutdown).await;
                            });
                        }
                    },
                    Err(e) => {
                        error!("Error accepting connection: {}", e);
                        tokio::time::sleep(Duration::from_millis(100)).await;
                    },
                },

                Some(finished) = sessions.join_next(), if !sessions.is_empty() => {
                    if let Err(e) = finished {
                        error!("Session task failed: {}", e);
                    }
                },

                _ = shutdown_rx.recv() => {
                    info!("Received shutdown signal, stopping listener on {}", self.local_addr);
                    break;
                }
            }
        }

        drop(self.listener);
        let _ = shutdown_tx.send(());
        let draining = self.registry.active_count();
        if timeout(Duration::from_secs(10), async { while sessions.join_next().await.is_some() {} })
            .await
            .is_err()
        {
            warn!("Timed out waiting for {} sessions to close", draining);
            sessions.abort_all();
        }

        info!("TCP listener stopped ({} worker slots)", self.worker_count);
        Ok(())
    }

    fn admit(&self, peer: SocketAddr) -> Option<Arc<Session>> {
        match self.registry.register(Session::new(peer)) {
            Ok(session) => {
                info!(
                    "Accepted connection {} from {} (active: {})",
                    session.id(),
                    peer,
                    self.registry.active_count()
                );
                Some(session)
            },
            Err(e) => {
                warn!("Rejecting connection from {}: {}", peer, e);
                None
            },
        }
    }
}

async fn resolve(address: &str) -> Result<SocketAddr> {
    tokio::net::lookup_host(address)
        .await
        .map_err(|e| Error::network(format!("failed to resolve {address}: {e}")).with_source(e))?
        .next()
        .ok_or_else(|| Error::network(format!("{address} resolved to no addresses")))
}

/// Serve one session: wait for a worker, then answer lines until EOF or shutdown.
async fn serve(
    stream: TcpStream,
    session: Arc<Session>,
    router: RequestRouter,
    registry: Arc<SessionRegistry>,
    workers: Arc<Semaphore>,
    mut shutdown: broadcast::Receiver<()>,
) {
    let id = session.id();

    let permit = tokio::select! {
        permit = workers.acquire_owned() => permit.ok(),
        _ = shutdown.recv() => None,
    };

    if let Some(_permit) = permit {
        session.set_state(SessionState::Active);
        let outcome = tokio::select! {
            result = handle_lines(stream, &session, &router) => result,
            _ = shutdown.recv() => Ok(()),
        };
        match outcome {
            Ok(()) => session.set_state(SessionState::Closed),
            Err(e) => {
                debug!("Session {} ended with error: {}", id, e);
                session.set_state(SessionState::Error);
            },
        }
    } else {
        session.set_state(SessionState::Closed);
    }

    registry.remove(id);
}

async fn handle_lines(stream: TcpStream, session: &Session, router: &RequestRouter) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::with_capacity(256);

    loop {
        buf.clear();
        let read = reader.read_until(b'\n', &mut buf).await?;
        if read == 0 {
            return Ok(());
        }

        let line = String::from_utf8_lossy(&buf);
        let line = line.trim_end_matches(['\r', '\n']);
        let mut response = router.handle_line(line);
        let rejected = response.starts_with(quafka_core::protocol::constants::ERROR_PREFIX);
        response.push('\n');

        writer.write_all(response.as_bytes()).await?;
        writer.flush().await?;
        session.stats().record_request(read, response.len(), rejected);
    }
}
