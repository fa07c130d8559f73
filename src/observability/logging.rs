//! Subscriber setup
//!
//! `RUST_LOG` wins over the configured level when it is set. Output goes
//! to stderr so stdout stays free for command replies.

use thiserror::Error;
use tracing_subscriber::filter::ParseError;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("invalid log filter: {0}")]
    Filter(#[from] ParseError),

    #[error("failed to install subscriber: {0}")]
    Init(#[from] TryInitError),
}

/// Filter from `RUST_LOG` when set and non-blank, else the configured level
fn build_filter<F>(config: &LoggingConfig, lookup: F) -> Result<EnvFilter, ParseError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(EnvFilter::DEFAULT_ENV) {
        Some(directive) if !directive.trim().is_empty() => EnvFilter::try_new(directive),
        _ => EnvFilter::try_new(&config.level),
    }
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init_logging(config: &LoggingConfig) -> Result<(), LoggingError> {
    let filter = build_filter(config, |key| std::env::var(key).ok())?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true);

    if config.json {
        builder.json().finish().try_init()?;
    } else {
        builder.finish().try_init()?;
    }
    Ok(())
}
