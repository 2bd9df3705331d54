//! Topic registry: topic name to a fixed list of partitions.

use crate::topic::Partition;
use bytes::Bytes;
use dashmap::DashMap;
use quafka_core::{
    MessageWithOffset, PartitionId, PartitionOffset, PollPosition, TextMessageHandler, Topic,
};
use rand::Rng;
use std::sync::Arc;
use tracing::{debug, info};

/// Partitions created for a topic unless configured otherwise.
pub const DEFAULT_PARTITIONS: u32 = 3;

/// In-memory, partitioned topic store.
///
/// Topics are created on first publish with a fixed partition count and live
/// until [`TopicStore::delete_topic`]. Instances are independent; share one
/// through an `Arc`.
#[derive(Debug)]
pub struct TopicStore {
    topics: DashMap<String, Arc<[Partition]>>,
    partitions_per_topic: u32,
}

impl Default for TopicStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TopicStore {
    /// Store creating [`DEFAULT_PARTITIONS`] partitions per topic.
    pub fn new() -> Self {
        Self::with_partitions(DEFAULT_PARTITIONS)
    }

    /// Store creating `partitions` partitions per topic (at least one).
    pub fn with_partitions(partitions: u32) -> Self {
        Self { topics: DashMap::new(), partitions_per_topic: partitions.max(1) }
    }

    /// Partition count given to new topics.
    pub fn partitions_per_topic(&self) -> u32 {
        self.partitions_per_topic
    }

    fn partitions_for(&self, topic: &Topic) -> Arc<[Partition]> {
        if let Some(existing) = self.topics.get(topic.as_str()) {
            return Arc::clone(existing.value());
        }

        let entry = self.topics.entry(topic.as_str().to_string()).or_insert_with(|| {
            info!("Creating topic '{}' with {} partitions", topic, self.partitions_per_topic);
            (0..self.partitions_per_topic)
                .map(|id| Partition::new(topic.as_str(), PartitionId(id)))
                .collect::<Vec<_>>()
                .into()
        });
        Arc::clone(entry.value())
    }

    /// Append `payload` to a uniformly random partition of `topic`, creating the
    /// topic on first use.
    pub fn publish(&self, topic: &Topic, payload: impl Into<Bytes>) -> PartitionOffset {
        let partitions = self.partitions_for(topic);
        let index = rand::thread_rng().gen_range(0..partitions.len());
        let partition = &partitions[index];
        let offset = partition.publish(payload.into());
        PartitionOffset::new(partition.id(), offset)
    }

    /// Read from one partition. Unknown topics and out-of-range partitions
    /// yield `None`.
    pub fn poll(
        &self,
        topic: &str,
        partition: PartitionId,
        position: PollPosition,
    ) -> Option<MessageWithOffset> {
        let partitions = self.topics.get(topic).map(|entry| Arc::clone(entry.value()))?;
        let Some(partition) = partitions.get(partition.index()) else {
            debug!("Poll for missing partition {} of '{}'", partition, topic);
            return None;
        };
        partition.poll(position)
    }

    /// Number of partitions of `topic`, 0 if unknown.
    pub fn partition_count(&self, topic: &str) -> usize {
        self.topics.get(topic).map_or(0, |entry| entry.len())
    }

    /// Pending messages across all partitions of `topic`, 0 if unknown.
    pub fn message_count(&self, topic: &str) -> usize {
        self.topics
            .get(topic)
            .map_or(0, |entry| entry.iter().map(Partition::message_count).sum())
    }

    /// Drop `topic` and everything queued in it. Returns whether it existed.
    pub fn delete_topic(&self, topic: &str) -> bool {
        let removed = self.topics.remove(topic).is_some();
        if removed {
            info!("Deleted topic '{}'", topic);
        }
        removed
    }

    /// Whether `topic` exists.
    pub fn contains(&self, topic: &str) -> bool {
        self.topics.contains_key(topic)
    }

    /// Names of all topics, sorted.
    pub fn topics(&self) -> Vec<String> {
        let mut names: Vec<String> = self.topics.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }
}

/// Routes client-side text publishes into a [`TopicStore`] under a fixed topic.
#[derive(Debug, Clone)]
pub struct TopicStoreSink {
    store: Arc<TopicStore>,
    topic: Topic,
}

impl TopicStoreSink {
    /// Sink appending to `topic` of `store`.
    pub fn new(store: Arc<TopicStore>, topic: Topic) -> Self {
        Self { store, topic }
    }
}

impl TextMessageHandler for TopicStoreSink {
    fn on_text_message(&self, content: &str) -> Option<PartitionOffset> {
        Some(self.store.publish(&self.topic, content.to_string()))
    }
}
