//! Topic management and partitioning.

pub mod partition;
pub mod store;

pub use partition::Partition;
pub use store::{TopicStore, TopicStoreSink, DEFAULT_PARTITIONS};
