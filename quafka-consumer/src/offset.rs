//! Consumer-side offset bookkeeping.

use parking_lot::RwLock;
use quafka_core::{Offset, PartitionId, PartitionOffset};
use std::collections::BTreeMap;

#[derive(Debug, Default, Clone, Copy)]
struct Position {
    seen: Option<Offset>,
    committed: Option<Offset>,
}

/// Last offset seen and last offset committed, per partition.
///
/// The broker does not store consumer positions; this tracker is local to
/// one consumer.
#[derive(Debug, Default)]
pub struct OffsetTracker {
    positions: RwLock<BTreeMap<PartitionId, Position>>,
}

impl OffsetTracker {
    /// Empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an offset reported for `partition`.
    pub fn record(&self, partition: PartitionId, offset: Offset) {
        self.positions.write().entry(partition).or_default().seen = Some(offset);
    }

    /// Mark everything seen as committed. Returns the positions committed.
    pub fn commit_all(&self) -> Vec<PartitionOffset> {
        let mut positions = self.positions.write();
        positions
            .iter_mut()
            .filter_map(|(partition, position)| {
                let seen = position.seen?;
                position.committed = Some(seen);
                Some(PartitionOffset::new(*partition, seen))
            })
            .collect()
    }

    /// Last offset seen on `partition`.
    pub fn position(&self, partition: PartitionId) -> Option<Offset> {
        self.positions.read().get(&partition).and_then(|p| p.seen)
    }

    /// Last offset committed on `partition`.
    pub fn committed(&self, partition: PartitionId) -> Option<Offset> {
        self.positions.read().get(&partition).and_then(|p| p.committed)
    }

    /// Seen offsets not yet committed, by partition.
    pub fn pending(&self) -> Vec<PartitionOffset> {
        self.positions
            .read()
            .iter()
            .filter_map(|(partition, position)| match (position.seen, position.committed) {
                (Some(seen), committed) if committed != Some(seen) => {
                    Some(PartitionOffset::new(*partition, seen))
                },
                _ => None,
            })
            .collect()
    }
}
