//! Counter Integration Tests
//!
//! Exercises counters through the public API, verifying:
//! - COUNT conservation across granularities
//! - Derived statistics on known values
//! - Empty ranges and delete
//! - Asynchronous writes settle through their pending handles
//! - Failed batches never leave partial rollups behind

use chrono::{DateTime, Duration, TimeZone, Utc};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rollup_counters::counting::{
    ConsistencyLevel, Counter, CounterError, CounterRegistry, Granularity, GranularitySet, Policy,
    StatisticKind, WriteOutcome, WriteSynchronicity,
};
use rollup_counters::store::{
    CounterStore, InMemoryCounterStore, SimulatedCounterStore, SimulatedStoreConfig, StoreError,
};
use std::sync::Arc;

fn memory_registry() -> CounterRegistry {
    CounterRegistry::with_defaults(Arc::new(InMemoryCounterStore::new()))
}

fn origin() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2023, 11, 14, 22, 13, 20).unwrap()
}

fn min() -> DateTime<Utc> {
    DateTime::<Utc>::MIN_UTC
}

fn max() -> DateTime<Utc> {
    DateTime::<Utc>::MAX_UTC
}

async fn total(counter: &Counter, kind: StatisticKind, granularity: Granularity) -> i64 {
    counter
        .raw_range(kind, granularity, min(), max())
        .await
        .unwrap()
        .values()
        .sum()
}

// ============================================================================
// Conservation
// ============================================================================

#[tokio::test]
async fn test_count_is_conserved_at_every_granularity() {
    let registry = memory_registry();
    let counter = registry.counter("page.views").unwrap();
    let mut rng = ChaCha8Rng::seed_from_u64(42);

    // Spread events over roughly two years
    const EVENTS: i64 = 500;
    for _ in 0..EVENTS {
        let offset = Duration::seconds(rng.gen_range(0..2 * 365 * 24 * 3600));
        counter.increment(origin() + offset, None).await.unwrap();
    }

    for granularity in Granularity::ALL_VARIANTS {
        assert_eq!(
            total(&counter, StatisticKind::Count, granularity).await,
            EVENTS,
            "granularity {}",
            granularity
        );
        // Unvalued events never touch SUM or SUM_OF_SQUARES
        assert_eq!(total(&counter, StatisticKind::Sum, granularity).await, 0);
    }

    let all = counter.counts(Granularity::All, min(), max()).await.unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all.keys().next().copied(), Some(DateTime::UNIX_EPOCH));
}

#[tokio::test]
async fn test_coarser_buckets_contain_finer_ones() {
    let registry = memory_registry();
    let counter = registry.counter("logins").unwrap();
    let mut rng = ChaCha8Rng::seed_from_u64(7);

    let mut instants = Vec::new();
    for _ in 0..200 {
        let offset = Duration::minutes(rng.gen_range(0..90 * 24 * 60));
        let at = origin() + offset;
        counter.increment(at, None).await.unwrap();
        instants.push(at);
    }

    let chain = [
        Granularity::All,
        Granularity::Year,
        Granularity::Month,
        Granularity::Day,
        Granularity::Hour,
        Granularity::Minute,
    ];
    for at in instants {
        let mut previous = i64::MAX;
        for granularity in chain {
            let counts = counter.counts(granularity, at, at).await.unwrap();
            let here = counts[&granularity.normalize(at)];
            assert!(here <= previous, "{} bucket exceeds its parent", granularity);
            previous = here;
        }
    }
}

// ============================================================================
// Derived statistics
// ============================================================================

#[tokio::test]
async fn test_known_values_in_one_day() {
    let registry = memory_registry();
    let counter = registry.counter("checkout.latency_ms").unwrap();
    let day = Utc.with_ymd_and_hms(2024, 2, 29, 0, 0, 0).unwrap();

    for (hour, value) in [(1, 2), (9, 4), (23, 6)] {
        counter
            .increment(day + Duration::hours(hour), Some(value))
            .await
            .unwrap();
    }

    let end_of_day = day + Duration::hours(23) + Duration::minutes(59);
    assert_eq!(counter.counts(Granularity::Day, day, end_of_day).await.unwrap()[&day], 3);
    assert_eq!(counter.sums(Granularity::Day, day, end_of_day).await.unwrap()[&day], 12);
    assert_eq!(counter.squares(Granularity::Day, day, end_of_day).await.unwrap()[&day], 56);
    assert_eq!(counter.means(Granularity::Day, day, end_of_day).await.unwrap()[&day], 4.0);

    let deviation = counter.deviations(Granularity::Day, day, day).await.unwrap()[&day];
    let variance = counter.variances(Granularity::Day, day, day).await.unwrap()[&day];
    assert!((deviation - 2.0).abs() < 1e-12);
    assert!((variance - 4.0).abs() < 1e-12);

    // Each hour saw exactly one valued event
    let hourly = counter.deviations(Granularity::Hour, day, end_of_day).await.unwrap();
    assert_eq!(hourly.len(), 3);
    assert!(hourly.values().all(|d| *d == 0.0));
}

#[tokio::test]
async fn test_unvalued_buckets_drop_out_of_derived_statistics() {
    let registry = memory_registry();
    let counter = registry.counter("jobs").unwrap();
    let first = Utc.with_ymd_and_hms(2024, 4, 1, 8, 0, 0).unwrap();
    let second = first + Duration::days(1);

    counter.increment(first, None).await.unwrap();
    counter.increment(second, Some(10)).await.unwrap();
    counter.increment(second, None).await.unwrap();

    let counts = counter.counts(Granularity::Day, first, second).await.unwrap();
    assert_eq!(counts.len(), 2);

    let means = counter.means(Granularity::Day, first, second).await.unwrap();
    assert_eq!(means.len(), 1);
    // The unvalued event still counts toward the mean's denominator
    assert_eq!(means[&Granularity::Day.normalize(second)], 5.0);

    let stats = counter.statistics(Granularity::Day, first, second).await.unwrap();
    let bucket = stats[&Granularity::Day.normalize(second)];
    assert_eq!((bucket.count, bucket.sum, bucket.sum_of_squares), (2, 10, 100));
}

// ============================================================================
// Empty ranges and delete
// ============================================================================

#[tokio::test]
async fn test_empty_range_is_not_an_error() {
    let registry = memory_registry();
    let counter = registry.counter("quiet").unwrap();
    counter.increment(origin(), Some(3)).await.unwrap();

    let later = origin() + Duration::days(30);
    let window_end = later + Duration::days(1);
    assert!(counter.counts(Granularity::Day, later, window_end).await.unwrap().is_empty());
    assert!(counter.means(Granularity::Day, later, window_end).await.unwrap().is_empty());
    assert!(registry
        .counter("never.written")
        .unwrap()
        .variances(Granularity::Minute, min(), max())
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_delete_removes_every_cell() {
    let store = InMemoryCounterStore::new();
    let registry = CounterRegistry::with_defaults(Arc::new(store.clone()));
    let doomed = registry.counter("doomed").unwrap();
    let survivor = registry.counter("survivor").unwrap();

    for i in 0..10 {
        doomed.increment(origin() + Duration::hours(i), Some(i)).await.unwrap();
        survivor.increment(origin(), None).await.unwrap();
    }
    doomed.delete().await.unwrap();

    assert_eq!(store.cell_count("doomed"), 0);
    for granularity in Granularity::ALL_VARIANTS {
        for kind in StatisticKind::ALL_VARIANTS {
            assert!(doomed
                .raw_range(kind, granularity, min(), max())
                .await
                .unwrap()
                .is_empty());
        }
    }
    assert_eq!(total(&survivor, StatisticKind::Count, Granularity::All).await, 10);
}

// ============================================================================
// Policy
// ============================================================================

#[tokio::test]
async fn test_async_writes_settle() {
    let registry = CounterRegistry::new(
        Arc::new(InMemoryCounterStore::new()),
        Policy::new(ConsistencyLevel::One, WriteSynchronicity::Asynchronous),
        GranularitySet::compact(),
    );
    let counter = registry.counter("events").unwrap();

    let mut pending = Vec::new();
    for v in 1..=20 {
        match counter.increment(origin(), Some(v)).await.unwrap() {
            WriteOutcome::Pending(handle) => pending.push(handle),
            WriteOutcome::Acknowledged => panic!("asynchronous policy acknowledged inline"),
        }
    }
    for handle in pending {
        handle.wait().await.unwrap();
    }

    assert_eq!(total(&counter, StatisticKind::Count, Granularity::Minute).await, 20);
    assert_eq!(total(&counter, StatisticKind::Sum, Granularity::All).await, 210);
}

#[tokio::test]
async fn test_async_failure_is_observable_through_the_handle() {
    let failing = SimulatedCounterStore::new(
        InMemoryCounterStore::new(),
        SimulatedStoreConfig {
            batch_fail_prob: 1.0,
            ..SimulatedStoreConfig::no_faults()
        },
    );
    let counter = Counter::new(
        "events",
        Policy::default().with_write_synchronicity(WriteSynchronicity::Asynchronous),
        GranularitySet::full(),
        Arc::new(failing),
    )
    .unwrap();

    // The call itself succeeds; the failure only shows on the handle
    let outcome = counter.increment(origin(), None).await.unwrap();
    let result = outcome.settle().await;
    assert!(matches!(
        result,
        Err(CounterError::Store(StoreError::WriteFailed(_)))
    ));
}

#[tokio::test]
async fn test_consistency_level_reaches_the_store() {
    let store = SimulatedCounterStore::new(
        InMemoryCounterStore::new(),
        SimulatedStoreConfig::no_faults(),
    );
    store.set_live_replicas(1);
    let registry = CounterRegistry::with_defaults(Arc::new(store));

    // Quorum of three needs two replicas
    let mut counter = registry.counter("strict").unwrap();
    let result = counter.increment(origin(), None).await;
    assert!(matches!(
        result,
        Err(CounterError::Store(StoreError::Unavailable { required: 2, alive: 1, .. }))
    ));

    counter.set_consistency_level(ConsistencyLevel::One);
    counter.increment(origin(), None).await.unwrap();
    assert_eq!(total(&counter, StatisticKind::Count, Granularity::All).await, 1);
}

// ============================================================================
// Atomicity under injected faults
// ============================================================================

#[tokio::test]
async fn test_failed_batches_leave_no_partial_rollups() {
    for seed in 0..5 {
        let memory = InMemoryCounterStore::new();
        let store = SimulatedCounterStore::new(
            memory.clone(),
            SimulatedStoreConfig {
                batch_fail_prob: 0.4,
                timeout_prob: 0.1,
                ..SimulatedStoreConfig::no_faults().with_seed(seed)
            },
        );
        let counter = Counter::new(
            "flaky",
            Policy::default(),
            GranularitySet::full(),
            Arc::new(store.clone()),
        )
        .unwrap();

        let mut acknowledged = 0i64;
        let mut value_total = 0i64;
        for v in 0..100 {
            if counter.increment(origin(), Some(v)).await.is_ok() {
                acknowledged += 1;
                value_total += v;
            }
        }
        let stats = store.stats();
        assert!(stats.batch_failures + stats.timeouts > 0, "seed {} injected nothing", seed);
        assert_eq!(stats.batch_attempts, 100);

        // Read back through a fault-free view of the same cells
        let reader = Counter::new(
            "flaky",
            Policy::default(),
            GranularitySet::full(),
            Arc::new(memory) as Arc<dyn CounterStore>,
        )
        .unwrap();
        for granularity in Granularity::ALL_VARIANTS {
            assert_eq!(
                total(&reader, StatisticKind::Count, granularity).await,
                acknowledged,
                "seed {} granularity {}",
                seed,
                granularity
            );
            assert_eq!(
                total(&reader, StatisticKind::Sum, granularity).await,
                value_total
            );
        }
    }
}

#[tokio::test]
async fn test_fault_sequence_replays_from_seed() {
    async fn run(seed: u64) -> Vec<bool> {
        let store = SimulatedCounterStore::new(
            InMemoryCounterStore::new(),
            SimulatedStoreConfig::high_chaos().with_seed(seed),
        );
        let counter = Counter::new(
            "replay",
            Policy::default(),
            GranularitySet::compact(),
            Arc::new(store),
        )
        .unwrap();
        let mut outcomes = Vec::new();
        for _ in 0..30 {
            outcomes.push(counter.increment(origin(), None).await.is_ok());
        }
        outcomes
    }

    assert_eq!(run(99).await, run(99).await);
}

#[tokio::test]
async fn test_non_finite_fault_probability_does_not_panic() {
    let store = SimulatedCounterStore::new(
        InMemoryCounterStore::new(),
        SimulatedStoreConfig {
            timeout_prob: f64::NAN,
            ..SimulatedStoreConfig::no_faults()
        },
    );
    let counter = Counter::new("steady", Policy::default(), GranularitySet::full(), Arc::new(store))
        .unwrap();

    counter.increment(Utc::now(), None).await.unwrap();
    assert_eq!(total(&counter, StatisticKind::Count, Granularity::All).await, 1);
}
