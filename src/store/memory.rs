//! In-memory counter store
//!
//! Partitions live in a `HashMap` keyed by counter name; each partition is a
//! `BTreeMap` ordered by `(kind, granularity, bucket)`, so a range scan is a
//! single ordered `range` call. A batch is applied under one write lock,
//! which makes it atomic with respect to every reader.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::trace;

use super::{CellKey, CounterBatch, CounterStore, RangeScan, StoreFuture};
use crate::counting::ConsistencyLevel;

type Partition = BTreeMap<CellKey, i64>;

/// Process-local store with wrapping 64-bit counters
#[derive(Debug, Default)]
pub struct InMemoryCounterStore {
    partitions: Arc<RwLock<HashMap<String, Partition>>>,
}

impl InMemoryCounterStore {
    pub fn new() -> Self {
        InMemoryCounterStore::default()
    }

    /// Current value of one cell (for testing)
    pub fn cell(&self, name: &str, key: &CellKey) -> Option<i64> {
        self.partitions
            .read()
            .get(name)
            .and_then(|partition| partition.get(key).copied())
    }

    /// Number of cells in a partition (for testing)
    pub fn cell_count(&self, name: &str) -> usize {
        self.partitions.read().get(name).map_or(0, |p| p.len())
    }

    /// Number of live partitions
    pub fn partition_count(&self) -> usize {
        self.partitions.read().len()
    }
}

impl Clone for InMemoryCounterStore {
    fn clone(&self) -> Self {
        InMemoryCounterStore {
            partitions: Arc::clone(&self.partitions),
        }
    }
}

impl CounterStore for InMemoryCounterStore {
    fn apply_batch<'a>(&'a self, batch: &'a CounterBatch) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let mut partitions = self.partitions.write();
            let partition = partitions.entry(batch.name.clone()).or_default();
            for delta in &batch.deltas {
                let cell = partition.entry(delta.key).or_insert(0);
                *cell = cell.wrapping_add(delta.delta);
            }
            trace!(counter = %batch.name, deltas = batch.len(), "applied batch");
            Ok(())
        })
    }

    fn scan<'a>(&'a self, scan: &'a RangeScan) -> StoreFuture<'a, Vec<(DateTime<Utc>, i64)>> {
        Box::pin(async move {
            // BTreeMap::range panics on an inverted range
            if scan.start > scan.finish {
                return Ok(Vec::new());
            }

            let partitions = self.partitions.read();
            let Some(partition) = partitions.get(&scan.name) else {
                return Ok(Vec::new());
            };

            let from = CellKey::new(scan.kind, scan.granularity, scan.start);
            let to = CellKey::new(scan.kind, scan.granularity, scan.finish);
            Ok(partition
                .range(from..=to)
                .map(|(key, value)| (key.bucket, *value))
                .collect())
        })
    }

    fn delete_partition<'a>(
        &'a self,
        name: &'a str,
        _consistency: ConsistencyLevel,
    ) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            self.partitions.write().remove(name);
            Ok(())
        })
    }
}
