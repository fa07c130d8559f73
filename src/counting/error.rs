//! Errors surfaced by counters and the registry

use thiserror::Error;

use crate::store::StoreError;

/// Error returned by counter construction, policy changes, writes and queries
#[derive(Debug, Error)]
pub enum CounterError {
    /// Counter names must contain at least one non-whitespace character
    #[error("counter name must not be empty or blank")]
    InvalidName,

    /// A policy value was missing or not recognised
    #[error("invalid policy: {0}")]
    InvalidPolicy(String),

    #[error("unknown granularity: {0}")]
    UnknownGranularity(String),

    /// `value * value` does not fit in a 64-bit accumulator
    #[error("value {0} is too large: its square overflows a 64-bit accumulator")]
    ValueOverflow(i64),

    /// Asynchronous writes need a tokio runtime to spawn onto
    #[error("asynchronous write requires a tokio runtime: {0}")]
    NoRuntime(String),

    /// The task carrying an asynchronous write was cancelled or panicked
    #[error("asynchronous write aborted: {0}")]
    WriteAborted(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type CounterResult<T> = Result<T, CounterError>;
