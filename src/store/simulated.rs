//! Simulated Counter Store with Fault Injection
//!
//! Wraps another `CounterStore` and injects faults drawn from a seeded
//! ChaCha RNG, so a failing run replays exactly from its seed. It also
//! models a replica topology: an operation whose consistency level needs
//! more acknowledgments than there are live replicas fails with
//! `StoreError::Unavailable`.
//!
//! Injected failures happen before the inner store is touched, so a failed
//! batch never leaves a partial write behind.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use super::{CounterBatch, CounterStore, RangeScan, StoreError, StoreFuture, StoreResult};
use crate::counting::ConsistencyLevel;

/// Configuration for simulated fault injection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatedStoreConfig {
    /// RNG seed; equal seeds give equal fault sequences
    pub seed: u64,
    /// Probability of a batch write failing outright
    pub batch_fail_prob: f64,
    /// Probability of any operation timing out
    pub timeout_prob: f64,
    /// Probability of a range scan failing
    pub scan_fail_prob: f64,
    /// Probability of a partition delete failing
    pub delete_fail_prob: f64,
    /// Replicas holding each partition
    pub replication_factor: usize,
    /// Replicas currently reachable
    pub live_replicas: usize,
    /// Simulated latency range in microseconds (min, max)
    pub latency_range_us: (u64, u64),
}

impl Default for SimulatedStoreConfig {
    fn default() -> Self {
        SimulatedStoreConfig {
            seed: 0,
            batch_fail_prob: 0.01,
            timeout_prob: 0.005,
            scan_fail_prob: 0.01,
            delete_fail_prob: 0.01,
            replication_factor: 3,
            live_replicas: 3,
            latency_range_us: (100, 10_000),
        }
    }
}

impl SimulatedStoreConfig {
    /// High chaos configuration for stress testing
    pub fn high_chaos() -> Self {
        SimulatedStoreConfig {
            batch_fail_prob: 0.05,
            timeout_prob: 0.02,
            scan_fail_prob: 0.05,
            delete_fail_prob: 0.05,
            latency_range_us: (1_000, 20_000),
            ..SimulatedStoreConfig::default()
        }
    }

    /// No faults, full topology, no latency
    pub fn no_faults() -> Self {
        SimulatedStoreConfig {
            seed: 0,
            batch_fail_prob: 0.0,
            timeout_prob: 0.0,
            scan_fail_prob: 0.0,
            delete_fail_prob: 0.0,
            replication_factor: 3,
            live_replicas: 3,
            latency_range_us: (0, 0),
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Reject topologies that cannot exist
    pub fn validate(&self) -> Result<(), String> {
        if self.replication_factor == 0 {
            return Err("replication_factor must be at least 1".to_string());
        }
        if self.live_replicas > self.replication_factor {
            return Err(format!(
                "live_replicas ({}) exceeds replication_factor ({})",
                self.live_replicas, self.replication_factor
            ));
        }
        let probabilities = [
            self.batch_fail_prob,
            self.timeout_prob,
            self.scan_fail_prob,
            self.delete_fail_prob,
        ];
        if probabilities.iter().any(|p| !(0.0..=1.0).contains(p)) {
            return Err("fault probabilities must lie in [0, 1]".to_string());
        }
        Ok(())
    }
}

/// Probability usable by `gen_bool`: NaN and infinities inject nothing
fn fault_chance(prob: f64) -> f64 {
    if prob.is_finite() {
        prob.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Statistics for fault injection
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SimulatedStoreStats {
    pub batch_attempts: u64,
    pub batch_failures: u64,
    pub scan_attempts: u64,
    pub scan_failures: u64,
    pub delete_attempts: u64,
    pub delete_failures: u64,
    pub timeouts: u64,
    pub unavailable: u64,
}

struct SimulatedStoreInner {
    rng: ChaCha8Rng,
    stats: SimulatedStoreStats,
    live_replicas: usize,
}

#[derive(Clone, Copy)]
enum Operation {
    Batch,
    Scan,
    Delete,
}

/// Store wrapper that injects deterministic faults in front of `S`
pub struct SimulatedCounterStore<S: CounterStore> {
    inner_store: S,
    config: SimulatedStoreConfig,
    state: Arc<Mutex<SimulatedStoreInner>>,
}

impl<S: CounterStore> SimulatedCounterStore<S> {
    pub fn new(inner_store: S, config: SimulatedStoreConfig) -> Self {
        let state = SimulatedStoreInner {
            rng: ChaCha8Rng::seed_from_u64(config.seed),
            stats: SimulatedStoreStats::default(),
            live_replicas: config.live_replicas,
        };
        SimulatedCounterStore {
            inner_store,
            config,
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// Get current statistics
    pub fn stats(&self) -> SimulatedStoreStats {
        self.state.lock().stats.clone()
    }

    /// Reset statistics
    pub fn reset_stats(&self) {
        self.state.lock().stats = SimulatedStoreStats::default();
    }

    /// Take replicas down or bring them back, clamped to the replication factor
    pub fn set_live_replicas(&self, live: usize) {
        self.state.lock().live_replicas = live.min(self.config.replication_factor);
    }

    /// Access the wrapped store
    pub fn inner(&self) -> &S {
        &self.inner_store
    }

    /// Decide the fate of one operation before it reaches the inner store.
    ///
    /// Returns the latency to simulate on success.
    fn admit(&self, op: Operation, consistency: ConsistencyLevel) -> StoreResult<u64> {
        let mut s = self.state.lock();
        match op {
            Operation::Batch => s.stats.batch_attempts += 1,
            Operation::Scan => s.stats.scan_attempts += 1,
            Operation::Delete => s.stats.delete_attempts += 1,
        }

        let required = consistency.required_acks(self.config.replication_factor);
        if required > s.live_replicas {
            s.stats.unavailable += 1;
            return Err(StoreError::Unavailable {
                level: consistency,
                required,
                alive: s.live_replicas,
            });
        }

        if s.rng.gen_bool(fault_chance(self.config.timeout_prob)) {
            s.stats.timeouts += 1;
            return Err(StoreError::Timeout);
        }

        let (fail_prob, error) = match op {
            Operation::Batch => (
                self.config.batch_fail_prob,
                StoreError::WriteFailed("simulated batch failure".to_string()),
            ),
            Operation::Scan => (
                self.config.scan_fail_prob,
                StoreError::ReadFailed("simulated scan failure".to_string()),
            ),
            Operation::Delete => (
                self.config.delete_fail_prob,
                StoreError::DeleteFailed("simulated delete failure".to_string()),
            ),
        };
        if s.rng.gen_bool(fault_chance(fail_prob)) {
            match op {
                Operation::Batch => s.stats.batch_failures += 1,
                Operation::Scan => s.stats.scan_failures += 1,
                Operation::Delete => s.stats.delete_failures += 1,
            }
            return Err(error);
        }

        let (min, max) = self.config.latency_range_us;
        Ok(if max > min { s.rng.gen_range(min..max) } else { min })
    }

    async fn simulate_latency(latency_us: u64) {
        if latency_us > 0 {
            tokio::time::sleep(Duration::from_micros(latency_us)).await;
        }
    }
}

impl<S: CounterStore> CounterStore for SimulatedCounterStore<S> {
    fn apply_batch<'a>(&'a self, batch: &'a CounterBatch) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let latency_us = self.admit(Operation::Batch, batch.consistency).map_err(|e| {
                warn!(counter = %batch.name, error = %e, "injected batch fault");
                e
            })?;
            Self::simulate_latency(latency_us).await;
            self.inner_store.apply_batch(batch).await
        })
    }

    fn scan<'a>(&'a self, scan: &'a RangeScan) -> StoreFuture<'a, Vec<(DateTime<Utc>, i64)>> {
        Box::pin(async move {
            let latency_us = self.admit(Operation::Scan, scan.consistency)?;
            Self::simulate_latency(latency_us).await;
            self.inner_store.scan(scan).await
        })
    }

    fn delete_partition<'a>(
        &'a self,
        name: &'a str,
        consistency: ConsistencyLevel,
    ) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let latency_us = self.admit(Operation::Delete, consistency)?;
            Self::simulate_latency(latency_us).await;
            self.inner_store.delete_partition(name, consistency).await
        })
    }
}

impl<S: CounterStore + Clone> Clone for SimulatedCounterStore<S> {
    fn clone(&self) -> Self {
        SimulatedCounterStore {
            inner_store: self.inner_store.clone(),
            config: self.config.clone(),
            state: self.state.clone(),
        }
    }
}
