//! Consistency and write synchronicity settings carried by each counter

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::error::CounterError;

/// Replica acknowledgment policy applied to a single store operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsistencyLevel {
    /// Accepted once any node (or a hint) holds the write
    Any,
    One,
    Two,
    Three,
    Quorum,
    All,
    /// Quorum within the local datacenter
    LocalQuorum,
    /// Quorum within every datacenter
    EachQuorum,
}

impl ConsistencyLevel {
    pub const ALL_VARIANTS: [ConsistencyLevel; 8] = [
        ConsistencyLevel::Any,
        ConsistencyLevel::One,
        ConsistencyLevel::Two,
        ConsistencyLevel::Three,
        ConsistencyLevel::Quorum,
        ConsistencyLevel::All,
        ConsistencyLevel::LocalQuorum,
        ConsistencyLevel::EachQuorum,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ConsistencyLevel::Any => "any",
            ConsistencyLevel::One => "one",
            ConsistencyLevel::Two => "two",
            ConsistencyLevel::Three => "three",
            ConsistencyLevel::Quorum => "quorum",
            ConsistencyLevel::All => "all",
            ConsistencyLevel::LocalQuorum => "local_quorum",
            ConsistencyLevel::EachQuorum => "each_quorum",
        }
    }

    /// Replica acknowledgments needed under `replication_factor`.
    ///
    /// Topology is treated as a single datacenter, so both datacenter-scoped
    /// quorums reduce to a plain quorum. `Any` needs one live node to take a
    /// hint.
    pub fn required_acks(&self, replication_factor: usize) -> usize {
        let quorum = replication_factor / 2 + 1;
        match self {
            ConsistencyLevel::Any | ConsistencyLevel::One => 1,
            ConsistencyLevel::Two => 2,
            ConsistencyLevel::Three => 3,
            ConsistencyLevel::Quorum
            | ConsistencyLevel::LocalQuorum
            | ConsistencyLevel::EachQuorum => quorum,
            ConsistencyLevel::All => replication_factor,
        }
    }
}

impl Default for ConsistencyLevel {
    fn default() -> Self {
        ConsistencyLevel::Quorum
    }
}

impl fmt::Display for ConsistencyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ConsistencyLevel {
    type Err = CounterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace('-', "_");
        ConsistencyLevel::ALL_VARIANTS
            .into_iter()
            .find(|level| level.name() == wanted)
            .ok_or_else(|| CounterError::InvalidPolicy(format!("unknown consistency level '{}'", s)))
    }
}

/// Whether writes wait for the store to acknowledge them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteSynchronicity {
    /// Block until the batch is acknowledged; failures reach the caller
    #[default]
    Synchronous,
    /// Return a pending handle immediately; failures are only logged.
    /// Requires a tokio runtime on the calling task.
    Asynchronous,
}

impl WriteSynchronicity {
    pub fn name(&self) -> &'static str {
        match self {
            WriteSynchronicity::Synchronous => "synchronous",
            WriteSynchronicity::Asynchronous => "asynchronous",
        }
    }
}

impl fmt::Display for WriteSynchronicity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for WriteSynchronicity {
    type Err = CounterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sync" | "synchronous" => Ok(WriteSynchronicity::Synchronous),
            "async" | "asynchronous" => Ok(WriteSynchronicity::Asynchronous),
            _ => Err(CounterError::InvalidPolicy(format!(
                "unknown write synchronicity '{}'",
                s
            ))),
        }
    }
}

/// Per-counter operation policy, copied by value into every counter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Policy {
    pub consistency: ConsistencyLevel,
    pub write_synchronicity: WriteSynchronicity,
}

impl Policy {
    pub fn new(consistency: ConsistencyLevel, write_synchronicity: WriteSynchronicity) -> Self {
        Policy {
            consistency,
            write_synchronicity,
        }
    }

    pub fn with_consistency(mut self, consistency: ConsistencyLevel) -> Self {
        self.consistency = consistency;
        self
    }

    pub fn with_write_synchronicity(mut self, write_synchronicity: WriteSynchronicity) -> Self {
        self.write_synchronicity = write_synchronicity;
        self
    }
}
