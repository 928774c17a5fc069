//! Building containers from files, readers and embedded assets.
//!
//! The [`Loader`] applies sources in layers, later layers overriding earlier
//! ones:
//! 1. Registered defaults
//! 2. Sources, in the order they were given (deep-merged)
//! 3. Environment variables, resolved on every lookup
//!
//! # Example
//!
//! ```no_run
//! use strata_config::{Loader, WatchMode};
//!
//! # fn main() -> Result<(), strata_config::ConfigError> {
//! let config = Loader::new()
//!     .with_file("config.yaml")
//!     .with_file("config.local.yaml")
//!     .with_default("server.port", 8080)
//!     .with_env_prefix("APP")
//!     .watch(WatchMode::Auto)
//!     .load()?;
//!
//! let port = config.get_int("server.port");
//! # Ok(())
//! # }
//! ```

use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{debug, info, info_span, warn, Span};

use crate::container::Origin;
use crate::settings::{self, EnvLookup};
use crate::{watch, ConfigError, ConfigResult, Container, EmbeddedFiles, FileSystem, Format, OsFs, Settings};

/// When a file-backed container subscribes to changes of its primary file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WatchMode {
    /// Watch only when more than one file source was loaded.
    #[default]
    Auto,
    /// Watch whenever at least one file source was loaded.
    Always,
    /// Never watch.
    Never,
}

impl WatchMode {
    fn should_watch(self, sources: usize) -> bool {
        match self {
            WatchMode::Auto => sources > 1,
            WatchMode::Always => sources > 0,
            WatchMode::Never => false,
        }
    }
}

/// Builder for [`Container`]s.
#[derive(Debug)]
pub struct Loader {
    fs: Arc<dyn FileSystem>,
    paths: Vec<PathBuf>,
    allow_empty: bool,
    defaults: Map<String, Value>,
    env_prefix: Option<String>,
    automatic_env: bool,
    dotenv: bool,
    watch: WatchMode,
    span: Option<Span>,
}

impl Default for Loader {
    fn default() -> Self {
        Self::new()
    }
}

impl Loader {
    /// Create a loader reading from the OS filesystem with no sources.
    #[must_use]
    pub fn new() -> Self {
        Self {
            fs: Arc::new(OsFs),
            paths: Vec::new(),
            allow_empty: false,
            defaults: Map::new(),
            env_prefix: None,
            automatic_env: true,
            dotenv: false,
            watch: WatchMode::default(),
            span: None,
        }
    }

    /// Read files through `fs` instead of the OS filesystem.
    #[must_use]
    pub fn with_fs(mut self, fs: Arc<dyn FileSystem>) -> Self {
        self.fs = fs;
        self
    }

    /// Append a file source. The first file given is the primary one.
    #[must_use]
    pub fn with_file(mut self, path: impl AsRef<Path>) -> Self {
        self.paths.push(path.as_ref().to_path_buf());
        self
    }

    /// Append several file sources in order.
    #[must_use]
    pub fn with_files<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        self.paths
            .extend(paths.into_iter().map(|p| p.as_ref().to_path_buf()));
        self
    }

    /// Accept a load where none of the file sources exist.
    #[must_use]
    pub fn allow_empty(mut self, allow: bool) -> Self {
        self.allow_empty = allow;
        self
    }

    /// Register a default value for `key`.
    #[must_use]
    pub fn with_default(mut self, key: &str, value: impl Into<Value>) -> Self {
        let value = crate::format::normalize_keys(value.into());
        settings::insert_path(&mut self.defaults, &key.to_lowercase(), value);
        self
    }

    /// Only honour environment variables named `PREFIX_KEY`.
    #[must_use]
    pub fn with_env_prefix(mut self, prefix: &str) -> Self {
        self.env_prefix = Some(prefix.to_string());
        self
    }

    /// Disable environment variable overrides.
    #[must_use]
    pub fn without_automatic_env(mut self) -> Self {
        self.automatic_env = false;
        self
    }

    /// Load a `.env` file into the process environment before reading
    /// sources. A missing file is not an error.
    #[must_use]
    pub fn with_dotenv(mut self) -> Self {
        self.dotenv = true;
        self
    }

    /// Choose when the primary file is watched for changes.
    #[must_use]
    pub fn watch(mut self, mode: WatchMode) -> Self {
        self.watch = mode;
        self
    }

    /// Parent span for the container's log events.
    ///
    /// Defaults to the span that is current when the loader finishes.
    #[must_use]
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }

    /// Load the configured file sources.
    ///
    /// Sources that do not exist are skipped. Sources that exist but cannot
    /// be read or parsed are logged and skipped.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NoSourcesFound`] when no source exists and
    /// empty loads were not allowed.
    pub fn load(self) -> ConfigResult<Container> {
        let parent = self.parent_span();
        debug!(parent: &parent, sources = self.paths.len(), "loading configuration");
        self.load_dotenv(&parent);

        let loadable: Vec<PathBuf> = self
            .paths
            .iter()
            .filter(|path| self.fs.exists(path))
            .cloned()
            .collect();

        if loadable.is_empty() && !self.allow_empty {
            return Err(ConfigError::NoSourcesFound);
        }

        let id = loadable
            .iter()
            .map(|path| path.display().to_string())
            .collect::<Vec<_>>()
            .join(";");
        let span = info_span!(parent: &parent, "config", id = %id);

        let settings = read_files(self.base(), self.fs.as_ref(), &loadable, &span);
        if !loadable.is_empty() {
            info!(parent: &span, sources = loadable.len(), "loaded config");
        }

        let should_watch = self.watch.should_watch(loadable.len());
        let supports_watch = self.fs.supports_watch();
        let primary = loadable.first().cloned();
        let container = Container::new(
            id,
            settings,
            Origin::Files {
                fs: self.fs,
                paths: loadable,
            },
            span,
        );

        if let (true, Some(primary)) = (should_watch, primary) {
            if supports_watch {
                match watch::arm(&container, &primary) {
                    Ok(handle) => container.set_watch(handle),
                    Err(e) => warn!(parent: container.span(), error = %e, "unable to watch config file"),
                }
            } else {
                debug!(parent: container.span(), "filesystem does not support watching");
            }
        }

        Ok(container)
    }

    /// Build a container from readers holding documents in `format`.
    ///
    /// Readers that fail or hold invalid documents are logged and skipped.
    /// The container is not file-backed, so it never reloads or watches.
    pub fn load_readers<I, R>(self, format: Format, readers: I) -> Container
    where
        I: IntoIterator<Item = R>,
        R: Read,
    {
        let sources = readers
            .into_iter()
            .enumerate()
            .map(|(index, mut reader)| {
                let id = index.to_string();
                let mut bytes = Vec::new();
                let read = reader
                    .read_to_end(&mut bytes)
                    .map(|_| bytes)
                    .map_err(|e| ConfigError::source_read(id.clone(), e));
                (id, format, read)
            })
            .collect();
        self.detached(sources)
    }

    /// Build a container from files compiled into the binary.
    ///
    /// Each name's format is taken from its extension, falling back to YAML.
    /// Documents that do not parse are logged and skipped.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::EmbeddedRead`] if any name cannot be read.
    pub fn load_embedded<S>(self, names: &[S], files: &dyn EmbeddedFiles) -> ConfigResult<Container>
    where
        S: AsRef<str>,
    {
        let mut sources = Vec::with_capacity(names.len());
        for name in names {
            let name = name.as_ref();
            let bytes = files
                .read_file(name)
                .map_err(|e| ConfigError::embedded_read(name, e))?;
            let format = Format::from_path(name).unwrap_or_default();
            sources.push((name.to_string(), format, Ok(bytes)));
        }
        Ok(self.detached(sources))
    }

    fn detached(self, sources: Vec<(String, Format, ConfigResult<Vec<u8>>)>) -> Container {
        let parent = self.parent_span();
        self.load_dotenv(&parent);

        let id = sources
            .iter()
            .map(|(id, _, _)| id.as_str())
            .collect::<Vec<_>>()
            .join(";");
        let span = info_span!(parent: &parent, "config", id = %id);

        let mut settings = self.base();
        let mut seeded = false;
        for (source_id, format, bytes) in sources {
            match bytes.and_then(|bytes| format.parse(&bytes, &source_id)) {
                Ok(values) => {
                    apply(&mut settings, values, seeded);
                    seeded = true;
                }
                Err(e) => warn!(parent: &span, error = %e, "could not read the config source"),
            }
        }

        Container::new(id, settings, Origin::Detached, span)
    }

    fn base(&self) -> Settings {
        let env = EnvLookup::new(self.automatic_env, self.env_prefix.clone());
        base_settings(env, self.defaults.clone())
    }

    fn parent_span(&self) -> Span {
        self.span.clone().unwrap_or_else(Span::current)
    }

    fn load_dotenv(&self, span: &Span) {
        if !self.dotenv {
            return;
        }
        match dotenvy::dotenv() {
            Ok(path) => debug!(parent: span, path = %path.display(), "loaded .env file"),
            Err(e) if e.not_found() => {}
            Err(e) => warn!(parent: span, error = %e, "could not load .env file"),
        }
    }
}

/// Load `paths` from `fs`.
///
/// Shorthand for a [`Loader`] with default watch behaviour.
///
/// # Errors
///
/// Returns [`ConfigError::NoSourcesFound`] when none of `paths` exist and
/// `allow_empty` is false.
pub fn load<P: AsRef<Path>>(
    paths: &[P],
    fs: Arc<dyn FileSystem>,
    allow_empty: bool,
) -> ConfigResult<Container> {
    Loader::new()
        .with_fs(fs)
        .with_files(paths)
        .allow_empty(allow_empty)
        .load()
}

/// Load embedded files by name.
///
/// # Errors
///
/// Returns [`ConfigError::EmbeddedRead`] if any name cannot be read.
pub fn load_embed<S: AsRef<str>>(names: &[S], files: &dyn EmbeddedFiles) -> ConfigResult<Container> {
    Loader::new().load_embedded(names, files)
}

/// Build a container from readers holding documents in `format`.
pub fn from_readers<I, R>(format: Format, readers: I) -> Container
where
    I: IntoIterator<Item = R>,
    R: Read,
{
    Loader::new().load_readers(format, readers)
}

pub(crate) fn base_settings(env: EnvLookup, defaults: Map<String, Value>) -> Settings {
    let mut settings = Settings::with_env(env);
    settings.set_defaults(defaults);
    settings
}

/// Merge `paths` into `settings` in order. Failures are logged and skipped.
pub(crate) fn read_files(
    mut settings: Settings,
    fs: &dyn FileSystem,
    paths: &[PathBuf],
    span: &Span,
) -> Settings {
    let mut seeded = false;
    for path in paths {
        match read_file(fs, path) {
            Ok(values) => {
                apply(&mut settings, values, seeded);
                seeded = true;
                debug!(parent: span, source = %path.display(), "merged config source");
            }
            Err(e) if e.is_not_found() => {
                warn!(parent: span, error = %e, "could not load config file. Using default values");
            }
            Err(e) => warn!(parent: span, error = %e, "could not read the config file"),
        }
    }
    settings
}

fn read_file(fs: &dyn FileSystem, path: &Path) -> ConfigResult<Map<String, Value>> {
    let format = Format::from_path(path).ok_or_else(|| ConfigError::UnsupportedFormat {
        path: path.to_path_buf(),
    })?;
    let source_id = path.display().to_string();
    let bytes = fs
        .read(path)
        .map_err(|e| ConfigError::source_read(source_id.clone(), e))?;
    format.parse(&bytes, &source_id)
}

fn apply(settings: &mut Settings, values: Map<String, Value>, seeded: bool) {
    if seeded {
        settings.merge(values);
    } else {
        settings.set_source(values);
    }
}
