//! Time-Rollup Event Counters
//!
//! Named counters that roll every event up into per-minute, per-hour,
//! per-day, per-month, per-year and all-time buckets, and derive mean,
//! variance and standard deviation from accumulated count, sum and
//! sum-of-squares cells.
//!
//! ## Layout
//!
//! - `granularity` / `kind`: bucket truncation rules and accumulator kinds
//! - `increment`: one event becomes one atomic `CounterBatch`
//! - `query`: ordered range scans and the derivation formulas
//! - `policy`: consistency level and write synchronicity
//! - `counter` / `registry`: the user-facing handles
//! - `commands`: line protocol used by the `rollup-counters` binary
//!
//! ## Example
//!
//! ```rust,no_run
//! use rollup_counters::counting::{CounterRegistry, Granularity};
//! use rollup_counters::store::InMemoryCounterStore;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), rollup_counters::counting::CounterError> {
//! let registry = CounterRegistry::with_defaults(Arc::new(InMemoryCounterStore::new()));
//! let latency = registry.counter("checkout.latency_ms")?;
//!
//! latency.increment_now(Some(42)).await?;
//! let now = chrono::Utc::now();
//! let means = latency.means(Granularity::Hour, now, now).await?;
//! # Ok(())
//! # }
//! ```

mod commands;
mod counter;
mod error;
mod granularity;
mod increment;
mod kind;
mod policy;
pub mod query;
mod registry;

pub use commands::{CommandReply, CounterCommand, CounterCommandExecutor, Derived};
pub use counter::Counter;
pub use error::{CounterError, CounterResult};
pub use granularity::{Granularity, GranularitySet};
pub use increment::{build_batch, PendingWrite, WriteOutcome};
pub use kind::StatisticKind;
pub use policy::{ConsistencyLevel, Policy, WriteSynchronicity};
pub use query::{BucketStatistics, DerivedSeries, RawSeries};
pub use registry::CounterRegistry;
