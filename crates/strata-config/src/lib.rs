//! Layered, observable configuration for Strata services.
//!
//! This crate loads configuration from one or more sources and keeps it
//! current while the process runs:
//! - YAML, JSON and TOML files, deep-merged in order
//! - Readers and assets embedded in the binary
//! - Environment variable overrides resolved on every lookup
//! - Hot reload of the primary file with observer notification
//!
//! # Overview
//!
//! A [`Container`] owns the merged [`Settings`] and a list of [`Observer`]s.
//! When the primary file changes, the container re-reads all of its file
//! sources and runs a notification round: every observer runs on its own
//! thread and the round ends once all of them have returned.
//!
//! # Example
//!
//! ```no_run
//! use strata_config::{Container, ErrorSender, Loader};
//!
//! # fn main() -> Result<(), strata_config::ConfigError> {
//! let config = Loader::new()
//!     .with_file("config.yaml")
//!     .with_file("config.local.yaml")
//!     .with_env_prefix("STRATA")
//!     .load()?;
//!
//! config.add_observer_fn(|config: &Container, _: &ErrorSender| {
//!     println!("pool size is now {}", config.get_int("db.pool_size"));
//! });
//!
//! println!("listening on {}", config.get_string("server.addr"));
//! # Ok(())
//! # }
//! ```
//!
//! # Environment Variable Overrides
//!
//! A key is looked up in the environment by replacing dots with underscores
//! and uppercasing, with the prefix prepended when one is set:
//!
//! - `server.addr` → `SERVER_ADDR`
//! - `server.addr` with prefix `STRATA` → `STRATA_SERVER_ADDR`
//!
//! Empty variables are treated as unset.

#![warn(missing_docs)]

pub mod cast;
mod container;
mod error;
mod format;
mod fs;
mod loader;
mod observer;
mod round;
mod settings;
mod watch;

pub use container::Container;
pub use error::{ConfigError, ConfigResult, ObserverError};
pub use format::Format;
pub use fs::{EmbeddedFiles, FileSystem, MemFs, OsFs, StaticFiles};
pub use loader::{from_readers, load, load_embed, Loader, WatchMode};
pub use observer::{ErrorSender, FnObserver, Observer};
pub use settings::Settings;
