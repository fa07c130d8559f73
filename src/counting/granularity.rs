//! Time granularities and the bucket normalizer
//!
//! Every event is rolled up into one bucket per tracked granularity. A bucket
//! is identified by the normalized timestamp of its first instant, computed
//! from UTC calendar fields.
//!
//! | Granularity | Bucket start |
//! |---|---|
//! | `Minute` | seconds and sub-seconds zeroed |
//! | `Hour` | minutes and below zeroed |
//! | `Day` | time-of-day zeroed |
//! | `Month` | first day of the month |
//! | `Year` | first day of the year |
//! | `All` | Unix epoch (one bucket for every event) |

use chrono::{DateTime, Datelike, Days, NaiveTime, TimeDelta, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::error::CounterError;

/// Resolution at which events are bucketed
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    /// Single bucket covering all time
    All,
    #[serde(alias = "minutely")]
    Minute,
    #[serde(alias = "hourly")]
    Hour,
    #[serde(alias = "daily")]
    Day,
    #[serde(alias = "monthly")]
    Month,
    #[serde(alias = "yearly")]
    Year,
}

impl Granularity {
    /// Every supported granularity, in storage order
    pub const ALL_VARIANTS: [Granularity; 6] = [
        Granularity::All,
        Granularity::Minute,
        Granularity::Hour,
        Granularity::Day,
        Granularity::Month,
        Granularity::Year,
    ];

    /// Storage code used in cell keys and the command front end
    pub fn code(&self) -> &'static str {
        match self {
            Granularity::All => "all",
            Granularity::Minute => "minutely",
            Granularity::Hour => "hourly",
            Granularity::Day => "daily",
            Granularity::Month => "monthly",
            Granularity::Year => "yearly",
        }
    }

    /// Parse a storage code back to a granularity
    pub fn from_code(code: &str) -> Option<Granularity> {
        match code {
            "all" => Some(Granularity::All),
            "minutely" => Some(Granularity::Minute),
            "hourly" => Some(Granularity::Hour),
            "daily" => Some(Granularity::Day),
            "monthly" => Some(Granularity::Month),
            "yearly" => Some(Granularity::Year),
            _ => None,
        }
    }

    /// Truncate `at` to the first instant of its bucket.
    ///
    /// Pure and idempotent: `g.normalize(g.normalize(t)) == g.normalize(t)`.
    pub fn normalize(&self, at: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            Granularity::All => DateTime::UNIX_EPOCH,
            Granularity::Minute => {
                start_of_day(at)
                    + TimeDelta::hours(i64::from(at.hour()))
                    + TimeDelta::minutes(i64::from(at.minute()))
            }
            Granularity::Hour => start_of_day(at) + TimeDelta::hours(i64::from(at.hour())),
            Granularity::Day => start_of_day(at),
            Granularity::Month => {
                let first = at.date_naive() - Days::new(u64::from(at.day0()));
                first.and_time(NaiveTime::MIN).and_utc()
            }
            Granularity::Year => {
                let first = at.date_naive() - Days::new(u64::from(at.ordinal0()));
                first.and_time(NaiveTime::MIN).and_utc()
            }
        }
    }
}

fn start_of_day(at: DateTime<Utc>) -> DateTime<Utc> {
    at.date_naive().and_time(NaiveTime::MIN).and_utc()
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Granularity {
    type Err = CounterError;

    /// Accepts the storage code (`hourly`) or the unit name (`hour`)
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        if let Some(g) = Granularity::from_code(&lower) {
            return Ok(g);
        }
        match lower.as_str() {
            "minute" => Ok(Granularity::Minute),
            "hour" => Ok(Granularity::Hour),
            "day" => Ok(Granularity::Day),
            "month" => Ok(Granularity::Month),
            "year" => Ok(Granularity::Year),
            _ => Err(CounterError::UnknownGranularity(s.to_string())),
        }
    }
}

/// The explicit set of granularities a registry rolls events up into
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Granularity>", into = "Vec<Granularity>")]
pub struct GranularitySet {
    members: Vec<Granularity>,
}

impl GranularitySet {
    /// Build a set from any list; duplicates collapse and order is canonical.
    ///
    /// Returns `None` for an empty list, since an event must land somewhere.
    pub fn new(granularities: impl IntoIterator<Item = Granularity>) -> Option<Self> {
        let mut members: Vec<Granularity> = granularities.into_iter().collect();
        members.sort();
        members.dedup();
        if members.is_empty() {
            None
        } else {
            Some(GranularitySet { members })
        }
    }

    /// All six granularities
    pub fn full() -> Self {
        GranularitySet {
            members: Granularity::ALL_VARIANTS.to_vec(),
        }
    }

    /// All-time, minute, hour and day only
    pub fn compact() -> Self {
        GranularitySet {
            members: vec![
                Granularity::All,
                Granularity::Minute,
                Granularity::Hour,
                Granularity::Day,
            ],
        }
    }

    pub fn contains(&self, granularity: Granularity) -> bool {
        self.members.contains(&granularity)
    }

    pub fn iter(&self) -> impl Iterator<Item = Granularity> + '_ {
        self.members.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

impl Default for GranularitySet {
    fn default() -> Self {
        Self::full()
    }
}

impl TryFrom<Vec<Granularity>> for GranularitySet {
    type Error = String;

    fn try_from(value: Vec<Granularity>) -> Result<Self, Self::Error> {
        GranularitySet::new(value).ok_or_else(|| "granularity list must not be empty".to_string())
    }
}

impl From<GranularitySet> for Vec<Granularity> {
    fn from(set: GranularitySet) -> Self {
        set.members
    }
}
