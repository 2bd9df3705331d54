//! Polling consumer running on one dedicated task.

use crate::offset::OffsetTracker;
use futures::Stream;
use parking_lot::Mutex;
use quafka_core::{
    config::{ConnectionConfig, ConsumerConfig, PoolConfig},
    message::PayloadKind,
    protocol::{Command, Request, Response},
    Error, Offset, PartitionId, Result, Topic,
};
use quafka_publisher::{ConnectionController, ConnectionFactory, ConnectionPool};
use std::{
    pin::Pin,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    task::{Context, Poll},
    time::Duration,
};
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error, info, warn};

/// A message taken from a partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumedMessage {
    /// Partition polled
    pub partition: PartitionId,
    /// Offset reported by the broker
    pub offset: Offset,
    /// Payload as received
    pub payload: String,
}

impl ConsumedMessage {
    /// Payload classification by prefix.
    pub fn kind(&self) -> PayloadKind {
        PayloadKind::classify(&self.payload).0
    }
}

/// Messages delivered by a running [`Consumer`].
///
/// Ends when the consumer stops.
#[derive(Debug)]
pub struct MessageStream {
    inner: ReceiverStream<ConsumedMessage>,
}

impl Stream for MessageStream {
    type Item = ConsumedMessage;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

struct Worker {
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// Consumer polling a topic's partitions in turn.
pub struct Consumer {
    config: Arc<ConsumerConfig>,
    topic: Topic,
    pool: Arc<ConnectionPool>,
    offsets: Arc<OffsetTracker>,
    running: Arc<AtomicBool>,
    worker: Mutex<Option<Worker>>,
}

impl std::fmt::Debug for Consumer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Consumer")
            .field("group_id", &self.config.group_id)
            .field("topic", &self.topic)
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

impl Consumer {
    /// Consumer borrowing its connection from `pool`.
    ///
    /// # Errors
    /// Returns a configuration error for an invalid topic or an empty
    /// partition list.
    pub fn new(config: ConsumerConfig, pool: Arc<ConnectionPool>) -> Result<Self> {
        let topic = Topic::new(config.topic.clone())?;
        if config.partitions.is_empty() {
            return Err(Error::configuration("consumer needs at least one partition"));
        }
        if config.buffer_size == 0 {
            return Err(Error::configuration("consumer buffer_size must be greater than 0"));
        }

        Ok(Self {
            config: Arc::new(config),
            topic,
            pool,
            offsets: Arc::new(OffsetTracker::new()),
            running: Arc::new(AtomicBool::new(false)),
            worker: Mutex::new(None),
        })
    }

    /// Consumer with its own single-connection TCP pool to `endpoint`.
    ///
    /// Responses are awaited for up to `poll_timeout`.
    ///
    /// # Errors
    /// As [`new`](Self::new).
    pub fn connect(config: ConsumerConfig, endpoint: ConnectionConfig) -> Result<Self> {
        let endpoint = endpoint.with_timeout(config.poll_timeout);
        let pool = ConnectionPool::new(
            endpoint,
            PoolConfig::default().with_max_pool_size(1),
            ConnectionFactory::default(),
        );
        Self::new(config, Arc::new(pool))
    }

    /// Borrow a connection and start polling.
    ///
    /// # Errors
    /// Fails if already running or if no connection can be borrowed.
    pub async fn start(&self) -> Result<MessageStream> {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(Error::unknown("consumer is already running"));
        }

        let connection = match self.pool.borrow().await {
            Ok(connection) => connection,
            Err(e) => {
                self.running.store(false, Ordering::Release);
                return Err(e);
            },
        };

        info!(
            "Consumer starting: group_id={}, topic={}, partitions={:?}",
            self.config.group_id, self.topic, self.config.partitions
        );

        let (tx, rx) = mpsc::channel(self.config.buffer_size);
        let (stop_tx, stop_rx) = watch::channel(false);
        let poller = Poller {
            config: Arc::clone(&self.config),
            topic: self.topic.clone(),
            offsets: Arc::clone(&self.offsets),
            connection,
            tx,
            stop_rx,
        };
        let pool = Arc::clone(&self.pool);
        let running = Arc::clone(&self.running);
        let task = tokio::spawn(async move {
            let connection = poller.run().await;
            pool.release(connection).await;
            running.store(false, Ordering::Release);
        });

        *self.worker.lock() = Some(Worker { stop_tx, task });
        Ok(MessageStream { inner: ReceiverStream::new(rx) })
    }

    /// Stop polling and return the connection to the pool. A no-op if not running.
    pub async fn stop(&self) {
        let worker = self.worker.lock().take();
        let Some(worker) = worker else {
            return;
        };

        info!("Consumer stopping: group_id={}", self.config.group_id);
        let _ = worker.stop_tx.send(true);
        if let Err(e) = worker.task.await {
            error!("Consumer task failed: {}", e);
            self.running.store(false, Ordering::Release);
        }
        info!("Consumer stopped: group_id={}", self.config.group_id);
    }

    /// Whether the poll task is alive.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Configuration.
    pub fn config(&self) -> &ConsumerConfig {
        &self.config
    }

    /// Offsets seen and committed so far.
    pub fn offsets(&self) -> &OffsetTracker {
        &self.offsets
    }
}

struct Poller {
    config: Arc<ConsumerConfig>,
    topic: Topic,
    offsets: Arc<OffsetTracker>,
    connection: Arc<ConnectionController>,
    tx: mpsc::Sender<ConsumedMessage>,
    stop_rx: watch::Receiver<bool>,
}

impl Poller {
    async fn run(mut self) -> Arc<ConnectionController> {
        let partitions = self.config.partitions.clone();

        for partition in partitions.iter().copied().cycle() {
            if *self.stop_rx.borrow() {
                break;
            }

            let wait = match self.poll_once(partition).await {
                Ok(Some(message)) => {
                    if !self.deliver(message).await {
                        break;
                    }
                    self.config.poll_interval
                },
                Ok(None) => self.config.poll_interval,
                Err(e) => {
                    warn!("Poll of {}/{} failed: {}", self.topic, partition, e);
                    self.recover().await;
                    self.config.error_backoff
                },
            };

            if !self.pause(wait).await {
                break;
            }
        }

        debug!("Poll loop for {} ended", self.topic);
        self.connection
    }

    async fn poll_once(&self, partition: PartitionId) -> Result<Option<ConsumedMessage>> {
        let request = Request::Poll { topic: self.topic.as_str().to_string(), partition };
        let response = self.connection.send(&request.encode()).await?;

        let message = match Response::parse(Command::Poll, &response)? {
            Response::Message { payload, offset } => {
                let (kind, content) = PayloadKind::classify(&payload);
                debug!("Received {} message on {}/{}: {}", kind, self.topic, partition, content);
                self.offsets.record(partition, offset);
                Some(ConsumedMessage { partition, offset, payload })
            },
            Response::Empty => None,
            other => return Err(Error::protocol(format!("unexpected poll response: {other}"))),
        };

        // The poll already dequeued the message, so a failed commit must not drop it.
        if self.config.auto_commit {
            if let Err(e) = self.commit().await {
                warn!(
                    "Commit for group {} failed: {}; offsets stay pending",
                    self.config.group_id, e
                );
            }
        }
        Ok(message)
    }

    async fn commit(&self) -> Result<()> {
        let request = Request::Commit(self.config.group_id.clone());
        let response = self.connection.send(&request.encode()).await?;
        match Response::parse(Command::Commit, &response)? {
            Response::Committed(_) => {
                self.offsets.commit_all();
                Ok(())
            },
            other => Err(Error::protocol(format!("unexpected commit response: {other}"))),
        }
    }

    /// Returns `false` when the loop should end.
    async fn deliver(&mut self, message: ConsumedMessage) -> bool {
        tokio::select! {
            sent = self.tx.send(message) => {
                if sent.is_err() {
                    info!("Message stream for {} dropped, stopping", self.topic);
                }
                sent.is_ok()
            }
            _ = self.stop_rx.changed() => false,
        }
    }

    /// Returns `false` when stopped during the wait.
    async fn pause(&mut self, wait: Duration) -> bool {
        tokio::select! {
            () = tokio::time::sleep(wait) => true,
            _ = self.stop_rx.changed() => false,
        }
    }

    async fn recover(&self) {
        if self.connection.is_connected() {
            return;
        }
        if let Err(e) = self.connection.connect().await {
            warn!("Consumer reconnect to {} failed: {}", self.connection.config().address(), e);
        }
    }
}
