//! Structured logging with a reloadable level filter.
//!
//! # Example
//!
//! ```rust,ignore
//! use strata_telemetry::logging::{init_logging, LogConfig};
//!
//! let handle = init_logging(&LogConfig::development())?;
//! tracing::info!(source = "config.yaml", "loaded config");
//!
//! handle.set_level("warn")?;
//! ```

use std::sync::Arc;

use parking_lot::Mutex;
use strata_config::{Container, ErrorSender, Observer};
use tracing::Subscriber;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{reload, EnvFilter, Registry};

use crate::error::TelemetryError;
use crate::TelemetryResult;

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// Whether logging is enabled.
    pub enabled: bool,

    /// Log level or filter directive (e.g., "info", "strata_config=debug").
    pub level: String,

    /// Whether to output JSON format.
    pub json_format: bool,

    /// Whether to include span events (new, close).
    pub span_events: bool,

    /// Whether to include file/line info.
    pub file_line_info: bool,

    /// Whether to include thread IDs.
    pub thread_ids: bool,

    /// Whether to include target (module path).
    pub include_target: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self::production()
    }
}

impl LogConfig {
    /// Creates a development configuration with human-readable output.
    #[must_use]
    pub fn development() -> Self {
        Self {
            enabled: true,
            level: "debug".to_string(),
            json_format: false,
            span_events: true,
            file_line_info: true,
            thread_ids: true,
            include_target: true,
        }
    }

    /// Creates a production configuration with JSON output.
    #[must_use]
    pub fn production() -> Self {
        Self {
            enabled: true,
            level: "info".to_string(),
            json_format: true,
            span_events: false,
            file_line_info: false,
            thread_ids: false,
            include_target: true,
        }
    }

    /// Reads the `logging` subtree of `config` on top of [`LogConfig::default`].
    ///
    /// Recognised keys are `enabled`, `level`, `format` (`json` or `pretty`),
    /// `span_events`, `file_line_info`, `thread_ids` and `include_target`.
    pub fn from_container(config: &Container) -> Self {
        let logging = config.sub("logging");
        let defaults = Self::default();
        let flag = |key: &str, default: bool| {
            if logging.get(key).is_some() {
                logging.get_bool(key)
            } else {
                default
            }
        };

        let level = logging.get_string("level");
        let format = logging.get_string("format");

        Self {
            enabled: flag("enabled", defaults.enabled),
            level: if level.is_empty() { defaults.level } else { level },
            json_format: match format.to_lowercase().as_str() {
                "json" => true,
                "pretty" | "text" => false,
                _ => defaults.json_format,
            },
            span_events: flag("span_events", defaults.span_events),
            file_line_info: flag("file_line_info", defaults.file_line_info),
            thread_ids: flag("thread_ids", defaults.thread_ids),
            include_target: flag("include_target", defaults.include_target),
        }
    }

    /// Sets the level filter.
    #[must_use]
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = level.into();
        self
    }

    /// Sets JSON or pretty output.
    #[must_use]
    pub fn with_json_format(mut self, json: bool) -> Self {
        self.json_format = json;
        self
    }

    /// Enables or disables span open/close events.
    #[must_use]
    pub fn with_span_events(mut self, enabled: bool) -> Self {
        self.span_events = enabled;
        self
    }
}

/// Handle to a running subscriber's level filter.
///
/// Registered as an [`Observer`], it re-applies `logging.level` after every
/// configuration change.
#[derive(Clone)]
pub struct LogHandle {
    reload: Option<reload::Handle<EnvFilter, Registry>>,
    level: Arc<Mutex<String>>,
}

impl LogHandle {
    fn disabled() -> Self {
        Self {
            reload: None,
            level: Arc::new(Mutex::new(String::new())),
        }
    }

    /// The filter directive currently applied.
    pub fn level(&self) -> String {
        self.level.lock().clone()
    }

    /// Replace the level filter.
    ///
    /// # Errors
    ///
    /// Returns `TelemetryError::InvalidConfig` if `level` is not a valid
    /// filter directive, or `TelemetryError::LoggingInit` if the subscriber
    /// is gone.
    pub fn set_level(&self, level: &str) -> TelemetryResult<()> {
        let Some(reload) = &self.reload else {
            return Ok(());
        };

        let filter = create_env_filter(level)?;
        reload
            .reload(filter)
            .map_err(|e| TelemetryError::LoggingInit(e.to_string()))?;
        *self.level.lock() = level.to_string();
        Ok(())
    }
}

impl Observer for LogHandle {
    fn run(&self, config: &Container, errors: &ErrorSender) {
        let level = config.get_string("logging.level");
        if level.is_empty() || level == *self.level.lock() {
            return;
        }
        if let Err(e) = self.set_level(&level) {
            let _ = errors.send(Box::new(e));
        }
    }
}

impl std::fmt::Debug for LogHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogHandle")
            .field("enabled", &self.reload.is_some())
            .field("level", &*self.level.lock())
            .finish()
    }
}

/// Builds a subscriber for `config` without installing it.
///
/// # Errors
///
/// Returns `TelemetryError::InvalidConfig` if the level is invalid.
pub fn subscriber(
    config: &LogConfig,
) -> TelemetryResult<(Box<dyn Subscriber + Send + Sync>, LogHandle)> {
    let filter = create_env_filter(&config.level)?;
    let (filter, reload) = reload::Layer::new(filter);

    // Determine span events to capture
    let span_events = if config.span_events {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let registry = tracing_subscriber::registry().with(filter);
    let subscriber: Box<dyn Subscriber + Send + Sync> = if config.json_format {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .json()
            .with_span_events(span_events)
            .with_file(config.file_line_info)
            .with_line_number(config.file_line_info)
            .with_thread_ids(config.thread_ids)
            .with_target(config.include_target);
        Box::new(registry.with(fmt_layer))
    } else {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .pretty()
            .with_span_events(span_events)
            .with_file(config.file_line_info)
            .with_line_number(config.file_line_info)
            .with_thread_ids(config.thread_ids)
            .with_target(config.include_target);
        Box::new(registry.with(fmt_layer))
    };

    let handle = LogHandle {
        reload: Some(reload),
        level: Arc::new(Mutex::new(config.level.clone())),
    };
    Ok((subscriber, handle))
}

/// Initializes the global logging subscriber.
///
/// When logging is disabled, nothing is installed and the returned handle
/// ignores level changes.
///
/// # Errors
///
/// Returns `TelemetryError::InvalidConfig` if the level is invalid, or
/// `TelemetryError::LoggingInit` if a global subscriber is already set.
pub fn init_logging(config: &LogConfig) -> TelemetryResult<LogHandle> {
    if !config.enabled {
        return Ok(LogHandle::disabled());
    }

    let (subscriber, handle) = subscriber(config)?;
    subscriber
        .try_init()
        .map_err(|e| TelemetryError::LoggingInit(e.to_string()))?;
    Ok(handle)
}

fn create_env_filter(level: &str) -> TelemetryResult<EnvFilter> {
    EnvFilter::try_new(level)
        .map_err(|e| TelemetryError::InvalidConfig(format!("Invalid log level {level:?}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_config::{Format, Loader};
    use tracing::Level;

    fn container(yaml: &str) -> Container {
        Loader::new()
            .without_automatic_env()
            .load_readers(Format::Yaml, [yaml.as_bytes()])
    }

    #[test]
    fn test_default_config() {
        let config = LogConfig::default();
        assert!(config.enabled);
        assert!(config.json_format);
        assert_eq!(config.level, "info");
    }

    #[test]
    fn test_development_config() {
        let config = LogConfig::development();
        assert!(!config.json_format);
        assert!(config.span_events);
        assert!(config.file_line_info);
        assert_eq!(config.level, "debug");
    }

    #[test]
    fn test_builder_methods() {
        let config = LogConfig::production()
            .with_level("warn")
            .with_json_format(false)
            .with_span_events(true);
        assert_eq!(config.level, "warn");
        assert!(!config.json_format);
        assert!(config.span_events);
    }

    #[test]
    fn test_from_container() {
        let config = container(
            "logging:\n  level: debug\n  format: pretty\n  thread_ids: true\n  enabled: true\n",
        );
        let log = LogConfig::from_container(&config);
        assert_eq!(log.level, "debug");
        assert!(!log.json_format);
        assert!(log.thread_ids);
        assert!(log.enabled);
        assert!(log.include_target);
    }

    #[test]
    fn test_from_container_missing_subtree() {
        let log = LogConfig::from_container(&container("server:\n  port: 1\n"));
        assert_eq!(log, LogConfig::default());
    }

    #[test]
    fn test_disabled_logging() {
        let config = LogConfig {
            enabled: false,
            ..Default::default()
        };

        let handle = init_logging(&config).unwrap();
        assert!(handle.set_level("trace").is_ok());
        assert_eq!(handle.level(), "");
    }

    #[test]
    fn test_invalid_level() {
        let config = LogConfig::default().with_level("app=verbose");
        assert!(matches!(
            subscriber(&config),
            Err(TelemetryError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_set_level_reloads_filter() {
        let (subscriber, handle) = subscriber(&LogConfig::default()).unwrap();
        tracing::subscriber::with_default(subscriber, || {
            assert!(!tracing::enabled!(Level::DEBUG));
            handle.set_level("debug").unwrap();
            assert!(tracing::enabled!(Level::DEBUG));
        });
        assert_eq!(handle.level(), "debug");
    }

    #[test]
    fn test_observer_applies_level_from_config() {
        let (_subscriber, handle) = subscriber(&LogConfig::default()).unwrap();
        let config = container("logging:\n  level: warn\n");
        config.add_observer(handle.clone());

        config.notify_observers();
        assert_eq!(handle.level(), "warn");
    }

    #[test]
    fn test_observer_keeps_level_on_invalid_config() {
        let (_subscriber, handle) = subscriber(&LogConfig::default()).unwrap();
        let config = container("logging:\n  level: \"app=verbose\"\n");
        config.add_observer(handle.clone());

        config.notify_observers();
        assert_eq!(handle.level(), "info");
    }
}
