//! Configuration error types.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Error type observers push through their round's error channel.
pub type ObserverError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that can occur while loading or reading configuration.
///
/// Only [`ConfigError::NoSourcesFound`], [`ConfigError::EmbeddedRead`] and
/// [`ConfigError::Deserialize`] ever reach a caller. The remaining variants
/// describe failures that are logged and recovered from inside the loader.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// None of the requested sources exist and empty configuration is not allowed.
    #[error(
        "no configuration files found please run init, or provide a config file using the --config flag"
    )]
    NoSourcesFound,

    /// Failed to read a file or reader source.
    #[error("could not read config source {source_id}")]
    SourceRead {
        /// Identifier of the source (path or reader index).
        source_id: String,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    /// Failed to read an embedded asset.
    #[error("failed to read embedded config file {name}")]
    EmbeddedRead {
        /// Name of the embedded asset.
        name: String,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    /// Source content could not be parsed.
    #[error("could not parse config source {source_id} as {format}: {details}")]
    Parse {
        /// Identifier of the source.
        source_id: String,
        /// Format the content was parsed as.
        format: &'static str,
        /// Parser error details.
        details: String,
    },

    /// File extension does not map to a supported format.
    #[error("unsupported config type for {path}")]
    UnsupportedFormat {
        /// Path with the unrecognised extension.
        path: PathBuf,
    },

    /// The merged tree could not be serialized.
    #[error("unable to serialize config: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Part of the tree could not be deserialized into the requested type.
    #[error("unable to decode config key '{key}': {source}")]
    Deserialize {
        /// Key that was decoded (empty for the whole tree).
        key: String,
        /// Underlying error.
        #[source]
        source: serde_json::Error,
    },

    /// The file watcher could not be armed.
    #[error("failed to watch {path}: {details}")]
    Watch {
        /// Path that was to be watched.
        path: PathBuf,
        /// Watcher error details.
        details: String,
    },
}

impl ConfigError {
    /// Create a new source read error.
    pub fn source_read(source_id: impl Into<String>, source: io::Error) -> Self {
        Self::SourceRead {
            source_id: source_id.into(),
            source,
        }
    }

    /// Create a new embedded read error.
    pub fn embedded_read(name: impl Into<String>, source: io::Error) -> Self {
        Self::EmbeddedRead {
            name: name.into(),
            source,
        }
    }

    /// Create a new parse error.
    pub fn parse(
        source_id: impl Into<String>,
        format: &'static str,
        details: impl ToString,
    ) -> Self {
        Self::Parse {
            source_id: source_id.into(),
            format,
            details: details.to_string(),
        }
    }

    /// Create a new watch error.
    pub fn watch(path: impl Into<PathBuf>, details: impl ToString) -> Self {
        Self::Watch {
            path: path.into(),
            details: details.to_string(),
        }
    }

    /// Whether the error only means a source was not there to be read.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::SourceRead { source, .. } | Self::EmbeddedRead { source, .. } => {
                source.kind() == io::ErrorKind::NotFound
            }
            _ => false,
        }
    }
}
