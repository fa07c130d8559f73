//! Counter registry: hands out counters bound to a shared store

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::info;

use super::counter::Counter;
use super::error::CounterResult;
use super::granularity::GranularitySet;
use super::increment::WriteOutcome;
use super::policy::Policy;
use crate::store::CounterStore;

/// Produces `Counter`s that share one store handle and default policy.
///
/// The store is injected here and copied (as an `Arc`) into every counter;
/// there is no process-wide session.
#[derive(Clone)]
pub struct CounterRegistry {
    store: Arc<dyn CounterStore>,
    policy: Policy,
    granularities: GranularitySet,
}

impl CounterRegistry {
    pub fn new(store: Arc<dyn CounterStore>, policy: Policy, granularities: GranularitySet) -> Self {
        info!(
            consistency = %policy.consistency,
            mode = %policy.write_synchronicity,
            granularities = granularities.len(),
            "counter registry ready"
        );
        CounterRegistry {
            store,
            policy,
            granularities,
        }
    }

    /// Registry with the default policy and all six granularities
    pub fn with_defaults(store: Arc<dyn CounterStore>) -> Self {
        Self::new(store, Policy::default(), GranularitySet::default())
    }

    pub fn policy(&self) -> Policy {
        self.policy
    }

    pub fn granularities(&self) -> &GranularitySet {
        &self.granularities
    }

    /// The counter identified by `name`, using the registry's policy
    pub fn counter(&self, name: &str) -> CounterResult<Counter> {
        self.counter_with_policy(name, self.policy)
    }

    /// The counter identified by `name` with an overriding policy
    pub fn counter_with_policy(&self, name: &str, policy: Policy) -> CounterResult<Counter> {
        Counter::new(
            name,
            policy,
            self.granularities.clone(),
            Arc::clone(&self.store),
        )
    }

    /// Record one event against the counter named `name`
    pub async fn increment(
        &self,
        name: &str,
        at: DateTime<Utc>,
        value: Option<i64>,
    ) -> CounterResult<WriteOutcome> {
        self.counter(name)?.increment(at, value).await
    }

    /// Record one event at the current time against the counter named `name`
    pub async fn increment_now(&self, name: &str, value: Option<i64>) -> CounterResult<WriteOutcome> {
        self.counter(name)?.increment_now(value).await
    }
}
