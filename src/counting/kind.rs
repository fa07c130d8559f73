//! The three sufficient statistics accumulated per bucket

use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of accumulator stored in a cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatisticKind {
    /// Number of events
    #[serde(alias = "counts")]
    Count,
    /// Sum of event values
    #[serde(alias = "sums")]
    Sum,
    /// Sum of squared event values
    #[serde(alias = "squares")]
    SumOfSquares,
}

impl StatisticKind {
    pub const ALL_VARIANTS: [StatisticKind; 3] = [
        StatisticKind::Count,
        StatisticKind::Sum,
        StatisticKind::SumOfSquares,
    ];

    /// Storage code used in cell keys
    pub fn code(&self) -> &'static str {
        match self {
            StatisticKind::Count => "counts",
            StatisticKind::Sum => "sums",
            StatisticKind::SumOfSquares => "squares",
        }
    }

    pub fn from_code(code: &str) -> Option<StatisticKind> {
        match code {
            "counts" => Some(StatisticKind::Count),
            "sums" => Some(StatisticKind::Sum),
            "squares" => Some(StatisticKind::SumOfSquares),
            _ => None,
        }
    }

    /// Delta this kind receives for one event.
    ///
    /// `Count` always gets +1. The value-bearing kinds get nothing when the
    /// event has no value, and `None` is also returned when `value²` does not
    /// fit in 64 bits.
    pub fn delta(&self, value: Option<i64>) -> Option<i64> {
        match self {
            StatisticKind::Count => Some(1),
            StatisticKind::Sum => value,
            StatisticKind::SumOfSquares => value.and_then(|v| v.checked_mul(v)),
        }
    }
}

impl fmt::Display for StatisticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}
