//! Named counter bound to a policy and a store handle

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::info;

use super::error::{CounterError, CounterResult};
use super::granularity::{Granularity, GranularitySet};
use super::increment::{self, WriteOutcome};
use super::kind::StatisticKind;
use super::policy::{ConsistencyLevel, Policy, WriteSynchronicity};
use super::query::{self, BucketStatistics, DerivedSeries, RawSeries};
use crate::store::CounterStore;

/// A named event counter with automatic time rollups.
///
/// Counters are stateless beyond their identity and cheap to construct:
/// every read goes to the store and nothing is cached. Clones share the
/// store handle but carry their own copy of the policy.
#[derive(Clone)]
pub struct Counter {
    name: String,
    policy: Policy,
    granularities: GranularitySet,
    store: Arc<dyn CounterStore>,
}

impl Counter {
    /// Bind `name` to a store. Fails on an empty or blank name.
    pub fn new(
        name: impl Into<String>,
        policy: Policy,
        granularities: GranularitySet,
        store: Arc<dyn CounterStore>,
    ) -> CounterResult<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(CounterError::InvalidName);
        }
        Ok(Counter {
            name,
            policy,
            granularities,
            store,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn policy(&self) -> Policy {
        self.policy
    }

    pub fn granularities(&self) -> &GranularitySet {
        &self.granularities
    }

    pub fn set_consistency_level(&mut self, consistency: ConsistencyLevel) {
        self.policy.consistency = consistency;
    }

    pub fn set_write_synchronicity(&mut self, write_synchronicity: WriteSynchronicity) {
        self.policy.write_synchronicity = write_synchronicity;
    }

    /// Record one event at `at`, optionally carrying a value for the
    /// mean/variance/deviation accumulators.
    ///
    /// Under an asynchronous policy this must run inside a tokio runtime;
    /// otherwise it returns `CounterError::NoRuntime`.
    pub async fn increment(
        &self,
        at: DateTime<Utc>,
        value: Option<i64>,
    ) -> CounterResult<WriteOutcome> {
        increment::apply(
            &self.store,
            &self.name,
            &self.policy,
            &self.granularities,
            at,
            value,
        )
        .await
    }

    /// Record one event at the current time
    pub async fn increment_now(&self, value: Option<i64>) -> CounterResult<WriteOutcome> {
        self.increment(Utc::now(), value).await
    }

    /// Remove every cell of this counter with one partition tombstone
    pub async fn delete(&self) -> CounterResult<()> {
        self.store
            .delete_partition(&self.name, self.policy.consistency)
            .await?;
        info!(counter = %self.name, consistency = %self.policy.consistency, "deleted counter");
        Ok(())
    }

    /// Raw accumulator values of `kind` between two inclusive bounds.
    ///
    /// Reads are not limited to the tracked granularities: cells written
    /// under an earlier, wider set stay readable.
    pub async fn raw_range(
        &self,
        kind: StatisticKind,
        granularity: Granularity,
        start: DateTime<Utc>,
        finish: DateTime<Utc>,
    ) -> CounterResult<RawSeries> {
        query::raw_range(
            self.store.as_ref(),
            &self.name,
            self.policy.consistency,
            kind,
            granularity,
            start,
            finish,
        )
        .await
    }

    pub async fn counts(
        &self,
        granularity: Granularity,
        start: DateTime<Utc>,
        finish: DateTime<Utc>,
    ) -> CounterResult<RawSeries> {
        self.raw_range(StatisticKind::Count, granularity, start, finish)
            .await
    }

    pub async fn sums(
        &self,
        granularity: Granularity,
        start: DateTime<Utc>,
        finish: DateTime<Utc>,
    ) -> CounterResult<RawSeries> {
        self.raw_range(StatisticKind::Sum, granularity, start, finish)
            .await
    }

    pub async fn squares(
        &self,
        granularity: Granularity,
        start: DateTime<Utc>,
        finish: DateTime<Utc>,
    ) -> CounterResult<RawSeries> {
        self.raw_range(StatisticKind::SumOfSquares, granularity, start, finish)
            .await
    }

    pub async fn means(
        &self,
        granularity: Granularity,
        start: DateTime<Utc>,
        finish: DateTime<Utc>,
    ) -> CounterResult<DerivedSeries> {
        let (counts, sums) = futures::try_join!(
            self.counts(granularity, start, finish),
            self.sums(granularity, start, finish),
        )?;
        Ok(query::means(&counts, &sums))
    }

    pub async fn deviations(
        &self,
        granularity: Granularity,
        start: DateTime<Utc>,
        finish: DateTime<Utc>,
    ) -> CounterResult<DerivedSeries> {
        let (counts, sums, squares) = self.moments(granularity, start, finish).await?;
        Ok(query::deviations(&counts, &sums, &squares))
    }

    pub async fn variances(
        &self,
        granularity: Granularity,
        start: DateTime<Utc>,
        finish: DateTime<Utc>,
    ) -> CounterResult<DerivedSeries> {
        let (counts, sums, squares) = self.moments(granularity, start, finish).await?;
        Ok(query::variances(&counts, &sums, &squares))
    }

    /// Count, sum, sum of squares, mean, variance and deviation per bucket
    pub async fn statistics(
        &self,
        granularity: Granularity,
        start: DateTime<Utc>,
        finish: DateTime<Utc>,
    ) -> CounterResult<BTreeMap<DateTime<Utc>, BucketStatistics>> {
        let (counts, sums, squares) = self.moments(granularity, start, finish).await?;
        Ok(query::summarize(&counts, &sums, &squares))
    }

    async fn moments(
        &self,
        granularity: Granularity,
        start: DateTime<Utc>,
        finish: DateTime<Utc>,
    ) -> CounterResult<(RawSeries, RawSeries, RawSeries)> {
        futures::try_join!(
            self.counts(granularity, start, finish),
            self.sums(granularity, start, finish),
            self.squares(granularity, start, finish),
        )
    }
}

impl fmt::Debug for Counter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Counter")
            .field("name", &self.name)
            .field("policy", &self.policy)
            .field("granularities", &self.granularities)
            .finish()
    }
}
