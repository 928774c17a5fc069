//! Structured logging for Strata services.
//!
//! Wires `tracing-subscriber` up from a loaded [`strata_config::Container`]
//! and keeps the log level in sync with it:
//!
//! ```no_run
//! use strata_config::Loader;
//! use strata_telemetry::{init_logging, LogConfig};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Loader::new().with_file("config.yaml").load()?;
//!
//! let handle = init_logging(&LogConfig::from_container(&config))?;
//! // Re-apply `logging.level` whenever the file changes
//! config.add_observer(handle);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod error;
pub mod logging;

pub use error::TelemetryError;
pub use logging::{init_logging, subscriber, LogConfig, LogHandle};

/// Result type for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;
