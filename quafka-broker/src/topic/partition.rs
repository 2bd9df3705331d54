//! A single topic shard: FIFO queue plus monotonic offset counter.

use bytes::Bytes;
use parking_lot::Mutex;
use quafka_core::{MessageWithOffset, Offset, PartitionId, PollPosition};
use std::{
    collections::VecDeque,
    sync::atomic::{AtomicU64, Ordering},
};
use tracing::debug;

/// Append-only in-memory shard of a topic.
///
/// Offsets start at 0 and are assigned under the queue lock, so queue order and
/// offset order always agree.
#[derive(Debug)]
pub struct Partition {
    topic: String,
    id: PartitionId,
    queue: Mutex<VecDeque<Bytes>>,
    next_offset: AtomicU64,
}

impl Partition {
    /// Create an empty partition.
    pub fn new(topic: impl Into<String>, id: PartitionId) -> Self {
        Self {
            topic: topic.into(),
            id,
            queue: Mutex::new(VecDeque::new()),
            next_offset: AtomicU64::new(0),
        }
    }

    /// Owning topic name.
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Position within the topic.
    pub fn id(&self) -> PartitionId {
        self.id
    }

    /// Append a payload and return its offset.
    pub fn publish(&self, payload: Bytes) -> Offset {
        let offset = {
            let mut queue = self.queue.lock();
            let offset = self.next_offset.fetch_add(1, Ordering::AcqRel);
            queue.push_back(payload);
            offset
        };
        debug!("Published to {}/{} at offset {}", self.topic, self.id, offset);
        Offset(offset)
    }

    /// Read according to `position`.
    pub fn poll(&self, position: PollPosition) -> Option<MessageWithOffset> {
        match position {
            PollPosition::Next => self.poll_next(),
            PollPosition::At(from) => self.peek_from(from),
        }
    }

    /// Dequeue the oldest pending payload.
    ///
    /// The reported offset is the partition's last assigned offset at the time of
    /// the dequeue, which is not necessarily the offset the payload was
    /// published with.
    pub fn poll_next(&self) -> Option<MessageWithOffset> {
        let mut queue = self.queue.lock();
        let payload = queue.pop_front()?;
        let last = self.next_offset.load(Ordering::Acquire).saturating_sub(1);
        drop(queue);

        debug!("Polled from {}/{} (last offset {})", self.topic, self.id, last);
        Some(MessageWithOffset::new(Some(payload), Offset(last)))
    }

    /// Non-destructive look at the head, only when `from` is behind the last
    /// assigned offset. The payload is `None` if the queue has been drained.
    pub fn peek_from(&self, from: Offset) -> Option<MessageWithOffset> {
        let queue = self.queue.lock();
        let last = self.last_offset()?;
        if from >= last {
            return None;
        }
        Some(MessageWithOffset::new(queue.front().cloned(), last))
    }

    /// Last assigned offset, `None` before the first publish.
    pub fn last_offset(&self) -> Option<Offset> {
        self.next_offset.load(Ordering::Acquire).checked_sub(1).map(Offset)
    }

    /// Number of pending payloads.
    pub fn message_count(&self) -> usize {
        self.queue.lock().len()
    }
}
