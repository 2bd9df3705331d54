//! Server-side session tracking for accepted client transports.

use dashmap::DashMap;
use parking_lot::Mutex;
use quafka_core::{ConnectionId, Error, Result};
use std::{
    fmt,
    net::SocketAddr,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};
use tracing::info;

/// Lifecycle of an accepted session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Accepted, waiting for a worker permit
    Queued,
    /// Being served by a worker
    Active,
    /// Closed by the peer or by shutdown
    Closed,
    /// Ended by an I/O failure
    Error,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Queued => write!(f, "queued"),
            Self::Active => write!(f, "active"),
            Self::Closed => write!(f, "closed"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Counters for one session.
#[derive(Debug, Default)]
pub struct SessionStats {
    requests: AtomicU64,
    rejected: AtomicU64,
    bytes_received: AtomicU64,
    bytes_sent: AtomicU64,
}

impl SessionStats {
    /// Count one handled request line.
    pub fn record_request(&self, received: usize, sent: usize, rejected: bool) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        if rejected {
            self.rejected.fetch_add(1, Ordering::Relaxed);
        }
        self.bytes_received.fetch_add(received as u64, Ordering::Relaxed);
        self.bytes_sent.fetch_add(sent as u64, Ordering::Relaxed);
    }

    /// Request lines handled.
    pub fn requests(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }

    /// Request lines answered with `HATA:`.
    pub fn rejected(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }

    /// Bytes read from the peer.
    pub fn bytes_received(&self) -> u64 {
        self.bytes_received.load(Ordering::Relaxed)
    }

    /// Bytes written to the peer.
    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent.load(Ordering::Relaxed)
    }
}

/// One accepted client transport.
#[derive(Debug)]
pub struct Session {
    id: ConnectionId,
    peer: SocketAddr,
    state: Mutex<SessionState>,
    stats: SessionStats,
    accepted_at: Instant,
}

impl Session {
    /// Create a queued session for `peer`.
    pub fn new(peer: SocketAddr) -> Self {
        Self {
            id: ConnectionId::new(),
            peer,
            state: Mutex::new(SessionState::Queued),
            stats: SessionStats::default(),
            accepted_at: Instant::now(),
        }
    }

    /// Session identity.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Remote address.
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Current state.
    pub fn state(&self) -> SessionState {
        *self.state.lock()
    }

    /// Move to `state`.
    pub fn set_state(&self, state: SessionState) {
        *self.state.lock() = state;
    }

    /// Session counters.
    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    /// Time since accept.
    pub fn age(&self) -> Duration {
        self.accepted_at.elapsed()
    }
}

/// Registry of live sessions, bounded by `max_sessions`.
#[derive(Debug)]
pub struct SessionRegistry {
    sessions: DashMap<ConnectionId, Arc<Session>>,
    max_sessions: usize,
    accepted: AtomicU64,
}

impl SessionRegistry {
    /// Registry admitting at most `max_sessions` concurrent sessions.
    pub fn new(max_sessions: usize) -> Self {
        Self { sessions: DashMap::new(), max_sessions, accepted: AtomicU64::new(0) }
    }

    /// Track a new session.
    ///
    /// # Errors
    /// Returns `POOL_FULL` when the registry is at capacity.
    pub fn register(&self, session: Session) -> Result<Arc<Session>> {
        if self.sessions.len() >= self.max_sessions {
            return Err(Error::pool_full(format!(
                "session limit of {} reached",
                self.max_sessions
            )));
        }

        let session = Arc::new(session);
        self.sessions.insert(session.id(), Arc::clone(&session));
        self.accepted.fetch_add(1, Ordering::Relaxed);
        Ok(session)
    }

    /// Stop tracking a session.
    pub fn remove(&self, id: ConnectionId) -> Option<Arc<Session>> {
        let (_, session) = self.sessions.remove(&id)?;
        info!(
            "Session {} from {} closed after {} requests ({:?})",
            id,
            session.peer(),
            session.stats().requests(),
            session.age()
        );
        Some(session)
    }

    /// Look up a session.
    pub fn get(&self, id: ConnectionId) -> Option<Arc<Session>> {
        self.sessions.get(&id).map(|entry| Arc::clone(entry.value()))
    }

    /// Live sessions.
    pub fn active_count(&self) -> usize {
        self.sessions.len()
    }

    /// Sessions accepted since start.
    pub fn total_accepted(&self) -> u64 {
        self.accepted.load(Ordering::Relaxed)
    }

    /// Whether another session would be admitted.
    pub fn can_accept(&self) -> bool {
        self.sessions.len() < self.max_sessions
    }

    /// Identities of all live sessions.
    pub fn ids(&self) -> Vec<ConnectionId> {
        self.sessions.iter().map(|entry| *entry.key()).collect()
    }
}
