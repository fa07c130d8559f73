//! Observability
//!
//! Structured logging through `tracing`. Counter operations emit `debug!`
//! per batch and scan, lifecycle events use `info!`, and failed
//! asynchronous writes or injected faults use `warn!`.

mod logging;

pub use logging::{init_logging, LoggingError};
