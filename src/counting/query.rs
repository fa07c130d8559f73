//! Query and derivation engine
//!
//! Raw accumulators are scanned per `(kind, granularity)` in bucket order.
//! Derived statistics scan the three kinds over identical bounds and join
//! the results on bucket timestamp, never by position: a bucket that saw
//! only unvalued events has a COUNT cell but no SUM cell.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::debug;

use super::error::CounterResult;
use super::granularity::Granularity;
use super::kind::StatisticKind;
use super::policy::ConsistencyLevel;
use crate::store::{CounterStore, RangeScan};

/// Raw accumulator values keyed by bucket, ascending
pub type RawSeries = BTreeMap<DateTime<Utc>, i64>;

/// Derived statistic keyed by bucket, ascending
pub type DerivedSeries = BTreeMap<DateTime<Utc>, f64>;

/// Scan one accumulator kind over `[start, finish]`.
///
/// Both bounds are normalized first, so an unaligned boundary still includes
/// the bucket it falls in. No cells yields an empty map, not an error.
pub async fn raw_range(
    store: &dyn CounterStore,
    name: &str,
    consistency: ConsistencyLevel,
    kind: StatisticKind,
    granularity: Granularity,
    start: DateTime<Utc>,
    finish: DateTime<Utc>,
) -> CounterResult<RawSeries> {
    let scan = RangeScan {
        name: name.to_string(),
        kind,
        granularity,
        start: granularity.normalize(start),
        finish: granularity.normalize(finish),
        consistency,
    };
    let rows = store.scan(&scan).await?;
    debug!(
        counter = name,
        kind = %kind,
        granularity = %granularity,
        buckets = rows.len(),
        "scanned accumulator range"
    );
    Ok(rows.into_iter().collect())
}

/// Mean of the values in one bucket; NaN when `count` is zero
pub fn mean(count: i64, sum: i64) -> f64 {
    if count == 0 {
        return f64::NAN;
    }
    sum as f64 / count as f64
}

/// Bessel-corrected sample standard deviation from raw moments.
///
/// Defined as exactly 0 when `count <= 1`. Rounding residue that would put
/// a negative number under the root is clamped to 0.
pub fn deviation(count: i64, sum: i64, sum_of_squares: i64) -> f64 {
    if count <= 1 {
        return 0.0;
    }
    let n = count as f64;
    let s = sum as f64;
    let spread = (sum_of_squares as f64 - s * s / n) / (n - 1.0);
    spread.max(0.0).sqrt()
}

/// Square of `deviation`
pub fn variance(count: i64, sum: i64, sum_of_squares: i64) -> f64 {
    let d = deviation(count, sum, sum_of_squares);
    d * d
}

/// Per-bucket means over buckets present in both COUNT and SUM
pub fn means(counts: &RawSeries, sums: &RawSeries) -> DerivedSeries {
    counts
        .iter()
        .filter_map(|(bucket, &count)| sums.get(bucket).map(|&sum| (*bucket, mean(count, sum))))
        .collect()
}

/// Per-bucket deviations over buckets present in all three kinds
pub fn deviations(counts: &RawSeries, sums: &RawSeries, squares: &RawSeries) -> DerivedSeries {
    join3(counts, sums, squares)
        .map(|(bucket, count, sum, sq)| (bucket, deviation(count, sum, sq)))
        .collect()
}

/// Per-bucket variances over buckets present in all three kinds
pub fn variances(counts: &RawSeries, sums: &RawSeries, squares: &RawSeries) -> DerivedSeries {
    join3(counts, sums, squares)
        .map(|(bucket, count, sum, sq)| (bucket, variance(count, sum, sq)))
        .collect()
}

/// Everything known about one bucket
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BucketStatistics {
    pub count: i64,
    pub sum: i64,
    pub sum_of_squares: i64,
    pub mean: f64,
    pub variance: f64,
    pub deviation: f64,
}

impl BucketStatistics {
    pub fn from_moments(count: i64, sum: i64, sum_of_squares: i64) -> Self {
        let deviation = deviation(count, sum, sum_of_squares);
        BucketStatistics {
            count,
            sum,
            sum_of_squares,
            mean: mean(count, sum),
            variance: deviation * deviation,
            deviation,
        }
    }
}

/// Full statistics over buckets present in all three kinds
pub fn summarize(
    counts: &RawSeries,
    sums: &RawSeries,
    squares: &RawSeries,
) -> BTreeMap<DateTime<Utc>, BucketStatistics> {
    join3(counts, sums, squares)
        .map(|(bucket, count, sum, sq)| (bucket, BucketStatistics::from_moments(count, sum, sq)))
        .collect()
}

fn join3<'a>(
    counts: &'a RawSeries,
    sums: &'a RawSeries,
    squares: &'a RawSeries,
) -> impl Iterator<Item = (DateTime<Utc>, i64, i64, i64)> + 'a {
    counts.iter().filter_map(move |(bucket, &count)| {
        let sum = *sums.get(bucket)?;
        let sq = *squares.get(bucket)?;
        Some((*bucket, count, sum, sq))
    })
}
