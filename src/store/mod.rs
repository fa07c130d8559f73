//! Counter Store Abstraction
//!
//! The counting engine never reads before it writes. It needs a store that
//! can atomically apply a batch of increments, scan one clustering range in
//! bucket order, and drop a whole partition. This module defines that
//! capability surface as a trait, following the boxed-future style used for
//! pluggable backends.
//!
//! Logical layout: one partition per counter name, clustered by
//! `(kind, granularity, bucket)`, holding a 64-bit counter.
//!
//! Implementations:
//! - `InMemoryCounterStore`: process-local store for tests and the CLI
//! - `SimulatedCounterStore`: fault-injecting wrapper for deterministic tests

mod memory;
mod simulated;

pub use memory::InMemoryCounterStore;
pub use simulated::{SimulatedCounterStore, SimulatedStoreConfig, SimulatedStoreStats};

use chrono::{DateTime, Utc};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

use crate::counting::{ConsistencyLevel, Granularity, StatisticKind};

/// Boxed future returned by every store operation
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = StoreResult<T>> + Send + 'a>>;

pub type StoreResult<T> = Result<T, StoreError>;

/// Failure reported by the store collaborator
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("store operation timed out")]
    Timeout,

    /// Not enough live replicas to satisfy the requested consistency level
    #[error("cannot achieve consistency level {level}: {required} replicas required, {alive} alive")]
    Unavailable {
        level: ConsistencyLevel,
        required: usize,
        alive: usize,
    },

    #[error("batch write failed: {0}")]
    WriteFailed(String),

    #[error("range scan failed: {0}")]
    ReadFailed(String),

    #[error("partition delete failed: {0}")]
    DeleteFailed(String),
}

/// Clustering key of one accumulator cell inside a counter's partition
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CellKey {
    pub kind: StatisticKind,
    pub granularity: Granularity,
    pub bucket: DateTime<Utc>,
}

impl CellKey {
    pub fn new(kind: StatisticKind, granularity: Granularity, bucket: DateTime<Utc>) -> Self {
        CellKey {
            kind,
            granularity,
            bucket,
        }
    }
}

/// One increment inside a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellDelta {
    pub key: CellKey,
    pub delta: i64,
}

/// Every increment produced by one logical event, applied all-or-nothing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CounterBatch {
    /// Partition key
    pub name: String,
    pub consistency: ConsistencyLevel,
    pub deltas: Vec<CellDelta>,
}

impl CounterBatch {
    pub fn new(name: impl Into<String>, consistency: ConsistencyLevel) -> Self {
        CounterBatch {
            name: name.into(),
            consistency,
            deltas: Vec::new(),
        }
    }

    pub fn push(&mut self, key: CellKey, delta: i64) {
        self.deltas.push(CellDelta { key, delta });
    }

    pub fn len(&self) -> usize {
        self.deltas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.deltas.is_empty()
    }
}

/// Ordered scan over the buckets of one `(name, kind, granularity)` slice.
///
/// Both bounds are inclusive and already normalized by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeScan {
    pub name: String,
    pub kind: StatisticKind,
    pub granularity: Granularity,
    pub start: DateTime<Utc>,
    pub finish: DateTime<Utc>,
    pub consistency: ConsistencyLevel,
}

/// Capability surface the counting engine requires from its backing store.
///
/// Implementations must be safe to share across tasks; counters hold the
/// store behind an `Arc` and never lock around it.
pub trait CounterStore: Send + Sync + 'static {
    /// Apply every delta in `batch`, or none of them
    fn apply_batch<'a>(&'a self, batch: &'a CounterBatch) -> StoreFuture<'a, ()>;

    /// Return `(bucket, value)` pairs in ascending bucket order
    fn scan<'a>(&'a self, scan: &'a RangeScan) -> StoreFuture<'a, Vec<(DateTime<Utc>, i64)>>;

    /// Remove every cell of the partition `name` with one tombstone
    fn delete_partition<'a>(
        &'a self,
        name: &'a str,
        consistency: ConsistencyLevel,
    ) -> StoreFuture<'a, ()>;
}
