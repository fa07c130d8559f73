//! Named event counters with automatic time rollups.
//!
//! Every event is rolled up into a configurable set of granularities and
//! accumulates count, sum and sum-of-squares, from which mean, variance
//! and standard deviation are derived per bucket.

pub mod config;
pub mod counting;
pub mod observability;
pub mod store;

pub use config::{ConfigError, ServiceConfig, StoreBackend};
pub use counting::{
    ConsistencyLevel, Counter, CounterError, CounterRegistry, Granularity, GranularitySet, Policy,
    StatisticKind, WriteSynchronicity,
};
pub use store::{CounterStore, InMemoryCounterStore, SimulatedCounterStore, StoreError};
