//! Bounded pool of connections to one endpoint.
//!
//! Borrowing prefers an idle connection, then creates one while the pool is
//! below `max_pool_size`, and otherwise waits up to `borrow_timeout` for a
//! connection to be released. `active + idle` never exceeds the maximum.

use crate::{connection::ConnectionController, factory::ConnectionFactory};
use dashmap::DashSet;
use parking_lot::Mutex;
use quafka_core::{
    config::{ConnectionConfig, PoolConfig},
    ConnectionId, Error, Result,
};
use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
        Arc,
    },
};
use tokio::{sync::Notify, time::Instant};
use tracing::{debug, info, warn};

/// Pool of [`ConnectionController`]s sharing one endpoint configuration.
#[derive(Debug)]
pub struct ConnectionPool {
    endpoint: ConnectionConfig,
    config: PoolConfig,
    factory: ConnectionFactory,
    idle: Mutex<VecDeque<Arc<ConnectionController>>>,
    borrowed: DashSet<ConnectionId>,
    released: Notify,
    live: AtomicUsize,
    created: AtomicU64,
    closed: AtomicBool,
}

impl ConnectionPool {
    /// Empty pool for `endpoint`. Connections are created on demand.
    #[must_use]
    pub fn new(endpoint: ConnectionConfig, config: PoolConfig, factory: ConnectionFactory) -> Self {
        Self {
            endpoint,
            config,
            factory,
            idle: Mutex::new(VecDeque::new()),
            borrowed: DashSet::new(),
            released: Notify::new(),
            live: AtomicUsize::new(0),
            created: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        }
    }

    /// Pool identity, the endpoint's connection id.
    pub fn id(&self) -> ConnectionId {
        self.endpoint.connection_id
    }

    /// Endpoint configuration new connections are created from.
    pub fn endpoint(&self) -> &ConnectionConfig {
        &self.endpoint
    }

    /// Borrow a connected connection.
    ///
    /// # Errors
    /// - `POOL_EMPTY` if the pool is closed
    /// - `POOL_FULL` if nothing frees up within `borrow_timeout`
    /// - the connect failure if a new connection cannot be opened
    pub async fn borrow(&self) -> Result<Arc<ConnectionController>> {
        let deadline = Instant::now() + self.config.borrow_timeout;

        loop {
            let released = self.released.notified();
            tokio::pin!(released);
            released.as_mut().enable();

            if let Some(connection) = self.acquire().await? {
                return Ok(connection);
            }

            if tokio::time::timeout_at(deadline, released).await.is_err() {
                return Err(Error::pool_full(format!(
                    "no connection to {} became available within {:?} (max {})",
                    self.endpoint.address(),
                    self.config.borrow_timeout,
                    self.config.max_pool_size
                )));
            }
        }
    }

    /// Borrow without waiting.
    ///
    /// # Errors
    /// `POOL_FULL` when no idle connection exists and the pool is at capacity;
    /// otherwise as [`borrow`](Self::borrow).
    pub async fn try_borrow(&self) -> Result<Arc<ConnectionController>> {
        self.acquire().await?.ok_or_else(|| {
            Error::pool_full(format!(
                "pool for {} is at capacity ({})",
                self.endpoint.address(),
                self.config.max_pool_size
            ))
        })
    }

    /// Give a borrowed connection back.
    ///
    /// Connected connections become idle. Disconnected ones are dropped and
    /// their slot freed. After [`close`](Self::close) every returned connection
    /// is disconnected. Connections this pool did not lend are ignored.
    pub async fn release(&self, connection: Arc<ConnectionController>) {
        if self.borrowed.remove(&connection.id()).is_none() {
            warn!("Connection {} was not borrowed from this pool", connection.id());
            return;
        }

        let rejected = {
            let mut idle = self.idle.lock();
            if self.closed.load(Ordering::Acquire) || !connection.is_connected() {
                Some(connection)
            } else {
                idle.push_back(connection);
                None
            }
        };

        if let Some(connection) = rejected {
            debug!("Discarding connection {} ({})", connection.id(), connection.state());
            self.discard(&connection).await;
        }
        self.released.notify_one();
    }

    /// Refuse further borrows and disconnect idle connections.
    ///
    /// Borrowed connections are disconnected when released.
    pub async fn close(&self) {
        let drained: Vec<_> = {
            let mut idle = self.idle.lock();
            if self.closed.swap(true, Ordering::AcqRel) {
                return;
            }
            idle.drain(..).collect()
        };
        self.released.notify_waiters();

        for connection in &drained {
            self.discard(connection).await;
        }
        info!(
            "Closed pool for {} ({} idle closed, {} still borrowed)",
            self.endpoint.address(),
            drained.len(),
            self.active()
        );
    }

    /// Disconnect idle connections matching `predicate`.
    ///
    /// Returns `(checked, evicted)`.
    pub async fn evict_idle_where<P>(&self, predicate: P) -> (usize, usize)
    where
        P: Fn(&ConnectionController) -> bool,
    {
        let (checked, evicted) = {
            let mut idle = self.idle.lock();
            let checked = idle.len();
            let (evicted, kept): (Vec<_>, Vec<_>) =
                idle.drain(..).partition(|connection| predicate(&**connection));
            idle.extend(kept);
            (checked, evicted)
        };

        for connection in &evicted {
            debug!("Evicting idle connection {} ({})", connection.id(), connection.state());
            self.discard(connection).await;
            self.released.notify_one();
        }
        (checked, evicted.len())
    }

    /// Connections currently lent out.
    pub fn active(&self) -> usize {
        self.borrowed.len()
    }

    /// Connections waiting to be borrowed.
    pub fn idle(&self) -> usize {
        self.idle.lock().len()
    }

    /// Capacity.
    pub fn max_size(&self) -> usize {
        self.config.max_pool_size
    }

    /// Connections are never pre-created.
    pub fn min_size(&self) -> usize {
        0
    }

    /// Live connections counted against capacity.
    pub fn total_connections(&self) -> usize {
        self.live.load(Ordering::Acquire)
    }

    /// Connections created over the pool's lifetime.
    pub fn created_connections(&self) -> u64 {
        self.created.load(Ordering::Relaxed)
    }

    /// Whether [`close`](Self::close) has run.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    async fn acquire(&self) -> Result<Option<Arc<ConnectionController>>> {
        if self.is_closed() {
            return Err(Error::pool_empty(format!(
                "pool for {} is closed",
                self.endpoint.address()
            )));
        }

        if let Some(connection) = self.take_idle() {
            return Ok(Some(connection));
        }

        if !self.reserve_slot() {
            return Ok(None);
        }

        let config = self.endpoint.clone().with_connection_id(ConnectionId::new());
        let connection = self.factory.create(config);
        if let Err(e) = connection.connect().await {
            self.live.fetch_sub(1, Ordering::AcqRel);
            self.released.notify_one();
            return Err(e);
        }

        let created = self.created.fetch_add(1, Ordering::Relaxed) + 1;
        debug!(
            "Created connection {} to {} ({} created)",
            connection.id(),
            self.endpoint.address(),
            created
        );
        self.borrowed.insert(connection.id());
        Ok(Some(connection))
    }

    fn take_idle(&self) -> Option<Arc<ConnectionController>> {
        loop {
            let connection = self.idle.lock().pop_front()?;
            if connection.is_connected() {
                self.borrowed.insert(connection.id());
                return Some(connection);
            }
            debug!("Dropping stale idle connection {}", connection.id());
            self.live.fetch_sub(1, Ordering::AcqRel);
        }
    }

    fn reserve_slot(&self) -> bool {
        self.live
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |live| {
                (live < self.config.max_pool_size).then_some(live + 1)
            })
            .is_ok()
    }

    async fn discard(&self, connection: &ConnectionController) {
        let _ = connection.disconnect().await;
        self.live.fetch_sub(1, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::mock::MockTransport;
    use quafka_core::ErrorKind;
    use std::time::Duration;

    fn pool(transport: &MockTransport, max: usize, borrow_timeout: Duration) -> Arc<ConnectionPool> {
        let factory = ConnectionFactory::new(Arc::new(transport.clone()));
        let config = PoolConfig::default()
            .with_max_pool_size(max)
            .with_borrow_timeout(borrow_timeout);
        Arc::new(ConnectionPool::new(ConnectionConfig::new("127.0.0.1", 9), config, factory))
    }

    #[tokio::test]
    async fn test_borrow_release_reuses_connection() {
        let transport = MockTransport::echo();
        let pool = pool(&transport, 2, Duration::from_millis(500));
        assert_eq!((pool.min_size(), pool.max_size()), (0, 2));

        let conn = pool.borrow().await.unwrap();
        let id = conn.id();
        assert!(conn.is_connected());
        assert_eq!((pool.active(), pool.idle()), (1, 0));

        pool.release(conn).await;
        assert_eq!((pool.active(), pool.idle()), (0, 1));

        let again = pool.borrow().await.unwrap();
        assert_eq!(again.id(), id);
        assert_eq!(pool.created_connections(), 1);
        assert_eq!(transport.opens.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_single_slot_waits_for_release() {
        let pool = pool(&MockTransport::echo(), 1, Duration::from_secs(2));
        let first = pool.borrow().await.unwrap();
        let first_id = first.id();

        let waiter = {
            let pool = Arc::clone(&pool);
            tokio::spawn(async move { pool.borrow().await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());
        assert_eq!(pool.active() + pool.idle(), 1);

        pool.release(first).await;
        let second = waiter.await.unwrap().unwrap();
        assert_eq!(second.id(), first_id);
        assert_eq!(pool.total_connections(), 1);
    }

    #[tokio::test]
    async fn test_borrow_times_out_when_exhausted() {
        let pool = pool(&MockTransport::echo(), 1, Duration::from_millis(100));
        let _held = pool.borrow().await.unwrap();

        let started = std::time::Instant::now();
        let err = pool.borrow().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PoolFull);
        assert!(started.elapsed() >= Duration::from_millis(90));

        let err = pool.try_borrow().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PoolFull);
    }

    #[tokio::test]
    async fn test_disconnected_return_frees_slot() {
        let pool = pool(&MockTransport::echo(), 1, Duration::from_millis(500));
        let conn = pool.borrow().await.unwrap();
        conn.disconnect().await.unwrap();
        pool.release(conn).await;
        assert_eq!((pool.active(), pool.idle(), pool.total_connections()), (0, 0, 0));

        let fresh = pool.borrow().await.unwrap();
        assert!(fresh.is_connected());
        assert_eq!(pool.created_connections(), 2);
    }

    #[tokio::test]
    async fn test_failed_create_frees_slot() {
        let transport = MockTransport::echo();
        transport.fail_next_opens(1);
        let pool = pool(&transport, 1, Duration::from_millis(500));

        let err = pool.borrow().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NetworkError);
        assert_eq!(pool.total_connections(), 0);
        assert!(pool.borrow().await.is_ok());
    }

    #[tokio::test]
    async fn test_foreign_release_is_ignored() {
        let transport = MockTransport::echo();
        let pool = pool(&transport, 2, Duration::from_millis(500));
        let stranger = ConnectionFactory::new(Arc::new(transport))
            .create(ConnectionConfig::new("127.0.0.1", 9));
        pool.release(stranger).await;
        assert_eq!((pool.active(), pool.idle(), pool.total_connections()), (0, 0, 0));
    }

    #[tokio::test]
    async fn test_close() {
        let pool = pool(&MockTransport::echo(), 3, Duration::from_millis(500));
        let kept = pool.borrow().await.unwrap();
        let idle = pool.borrow().await.unwrap();
        let idle_handle = Arc::clone(&idle);
        pool.release(idle).await;

        pool.close().await;
        assert!(pool.is_closed());
        assert!(!idle_handle.is_connected());
        assert!(kept.is_connected());
        assert_eq!(pool.borrow().await.unwrap_err().kind(), ErrorKind::PoolEmpty);

        let kept_handle = Arc::clone(&kept);
        pool.release(kept).await;
        assert!(!kept_handle.is_connected());
        assert_eq!(pool.total_connections(), 0);
        pool.close().await;
    }

    #[tokio::test]
    async fn test_close_wakes_waiters() {
        let pool = pool(&MockTransport::echo(), 1, Duration::from_secs(5));
        let _held = pool.borrow().await.unwrap();
        let waiter = {
            let pool = Arc::clone(&pool);
            tokio::spawn(async move { pool.borrow().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        pool.close().await;
        let err = waiter.await.unwrap().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PoolEmpty);
    }

    #[tokio::test]
    async fn test_evict_idle_where() {
        let pool = pool(&MockTransport::echo(), 3, Duration::from_millis(500));
        let a = pool.borrow().await.unwrap();
        let b = pool.borrow().await.unwrap();
        let doomed = a.id();
        pool.release(a).await;
        pool.release(b).await;

        let (checked, evicted) = pool.evict_idle_where(|c| c.id() == doomed).await;
        assert_eq!((checked, evicted), (2, 1));
        assert_eq!((pool.idle(), pool.total_connections()), (1, 1));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_borrowers_respect_capacity() {
        let pool = pool(&MockTransport::echo(), 3, Duration::from_secs(5));
        let mut tasks = Vec::new();
        for _ in 0..24 {
            let pool = Arc::clone(&pool);
            tasks.push(tokio::spawn(async move {
                let conn = pool.borrow().await.unwrap();
                assert!(pool.active() <= pool.max_size());
                assert!(pool.total_connections() <= pool.max_size());
                tokio::time::sleep(Duration::from_millis(5)).await;
                pool.release(conn).await;
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(pool.active(), 0);
        assert!(pool.idle() <= 3);
        assert!(pool.created_connections() <= 3);
    }
}
