//! Increment engine
//!
//! Turns one logical event into the full set of per-granularity,
//! per-kind deltas and submits them as a single `CounterBatch`. The store
//! applies the batch all-or-nothing, so no bucket at one granularity can
//! reflect an event that a sibling granularity has not recorded.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::error::{CounterError, CounterResult};
use super::granularity::GranularitySet;
use super::kind::StatisticKind;
use super::policy::{Policy, WriteSynchronicity};
use crate::store::{CellKey, CounterBatch, CounterStore, StoreResult};

/// Build the batch for one event without touching the store.
///
/// COUNT receives +1 at every granularity whether or not a value is given;
/// SUM and SUM_OF_SQUARES are only written for valued events.
pub fn build_batch(
    name: &str,
    policy: &Policy,
    granularities: &GranularitySet,
    at: DateTime<Utc>,
    value: Option<i64>,
) -> CounterResult<CounterBatch> {
    if let Some(v) = value {
        if v.checked_mul(v).is_none() {
            return Err(CounterError::ValueOverflow(v));
        }
    }

    let mut batch = CounterBatch::new(name, policy.consistency);
    for granularity in granularities.iter() {
        let bucket = granularity.normalize(at);
        for kind in StatisticKind::ALL_VARIANTS {
            if let Some(delta) = kind.delta(value) {
                batch.push(CellKey::new(kind, granularity, bucket), delta);
            }
        }
    }
    Ok(batch)
}

/// Result of submitting an event
#[derive(Debug)]
pub enum WriteOutcome {
    /// The store acknowledged the batch before `apply` returned
    Acknowledged,
    /// The batch is in flight; its fate is only visible through the handle
    Pending(PendingWrite),
}

impl WriteOutcome {
    /// Wait for the write to settle, whichever mode produced it
    pub async fn settle(self) -> CounterResult<()> {
        match self {
            WriteOutcome::Acknowledged => Ok(()),
            WriteOutcome::Pending(pending) => pending.wait().await,
        }
    }
}

/// Handle to an asynchronous batch write.
///
/// Dropping the handle does not cancel the write; callers who never look
/// at it get fire-and-forget behavior.
#[derive(Debug)]
pub struct PendingWrite {
    handle: JoinHandle<StoreResult<()>>,
}

impl PendingWrite {
    /// True once the store has answered (successfully or not)
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the store's answer and surface its failure, if any
    pub async fn wait(self) -> CounterResult<()> {
        match self.handle.await {
            Ok(result) => result.map_err(CounterError::from),
            Err(join_error) => Err(CounterError::WriteAborted(join_error.to_string())),
        }
    }
}

/// Build and submit the batch for one event.
///
/// In synchronous mode the store's failure is returned directly. In
/// asynchronous mode the batch is spawned onto the current tokio runtime,
/// failures are logged, and the caller receives a `PendingWrite`. Without a
/// runtime the asynchronous path fails with `CounterError::NoRuntime`.
pub async fn apply(
    store: &Arc<dyn CounterStore>,
    name: &str,
    policy: &Policy,
    granularities: &GranularitySet,
    at: DateTime<Utc>,
    value: Option<i64>,
) -> CounterResult<WriteOutcome> {
    let batch = build_batch(name, policy, granularities, at, value)?;
    debug!(
        counter = name,
        deltas = batch.len(),
        consistency = %policy.consistency,
        mode = %policy.write_synchronicity,
        "submitting counter batch"
    );

    match policy.write_synchronicity {
        WriteSynchronicity::Synchronous => {
            store.apply_batch(&batch).await?;
            Ok(WriteOutcome::Acknowledged)
        }
        WriteSynchronicity::Asynchronous => {
            let runtime =
                Handle::try_current().map_err(|e| CounterError::NoRuntime(e.to_string()))?;
            let store = Arc::clone(store);
            let handle = runtime.spawn(async move {
                let result = store.apply_batch(&batch).await;
                if let Err(e) = &result {
                    warn!(counter = %batch.name, error = %e, "asynchronous counter batch failed");
                }
                result
            });
            Ok(WriteOutcome::Pending(PendingWrite { handle }))
        }
    }
}
