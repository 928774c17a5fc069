//! File watching for configuration hot-reload.
//!
//! A file-backed container can subscribe to changes of its primary file.
//! The watcher observes the file's parent directory, since editors often
//! replace files instead of writing them in place. When an event for the
//! primary file arrives, the watch thread:
//! 1. Re-reads and re-merges every file source of the container
//! 2. Runs a notification round and waits for it to finish
//!
//! The primary path is watched as given, without resolving symlinks. Every
//! event re-resolves it, so retargeting a symlink on the way to the file also
//! counts as a change of the primary file.
//!
//! Events are handled one at a time in arrival order. There is no debounce,
//! so a single save can produce several rounds.
//!
//! The watch thread only holds a weak reference to the container. Dropping
//! the last container handle, or calling [`Container::stop_watching`],
//! drops the watcher, which closes the event channel and ends the thread.

use std::env;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::thread;

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{debug, info, warn, Span};

use crate::container::WeakContainer;
use crate::{ConfigError, ConfigResult, Container};

/// Kind of change seen on the primary file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FileChangeKind {
    /// File was created, including being renamed into place.
    Created,
    /// File contents or metadata changed.
    Modified,
    /// File was deleted.
    Deleted,
}

impl FileChangeKind {
    fn from_event_kind(kind: &EventKind) -> Option<Self> {
        match kind {
            EventKind::Create(_) => Some(Self::Created),
            EventKind::Modify(_) => Some(Self::Modified),
            EventKind::Remove(_) => Some(Self::Deleted),
            EventKind::Access(_) | EventKind::Other | EventKind::Any => None,
        }
    }
}

/// An active subscription. Dropping it stops the watch.
pub(crate) struct WatchHandle {
    _watcher: RecommendedWatcher,
    path: PathBuf,
}

impl WatchHandle {
    pub(crate) fn path(&self) -> &Path {
        &self.path
    }
}

/// The primary file as configured, and the file it currently resolves to.
///
/// The path is kept as given so that swapping a symlink anywhere along it
/// (the way mounted config maps are updated) is seen as a change.
#[derive(Debug)]
struct PrimaryFile {
    path: PathBuf,
    // Same file name under the canonical parent; some backends report this.
    alias: Option<PathBuf>,
    resolved: Option<PathBuf>,
}

impl PrimaryFile {
    fn new(path: PathBuf) -> Self {
        let alias = path
            .parent()
            .and_then(|dir| dir.canonicalize().ok())
            .zip(path.file_name())
            .map(|(dir, name)| dir.join(name));
        let resolved = path.canonicalize().ok();
        Self {
            path,
            alias,
            resolved,
        }
    }

    fn is_named_by(&self, event: &Event) -> bool {
        event
            .paths
            .iter()
            .any(|p| *p == self.path || Some(p) == self.alias.as_ref())
    }

    /// Resolve symlinks again. Returns whether the file now lives elsewhere.
    fn retarget(&mut self) -> bool {
        match self.path.canonicalize() {
            Ok(current) if self.resolved.as_ref() != Some(&current) => {
                self.resolved = Some(current);
                true
            }
            _ => false,
        }
    }
}

/// Start watching `path` on behalf of `container`.
pub(crate) fn arm(container: &Container, path: &Path) -> ConfigResult<WatchHandle> {
    let file = if path.is_absolute() {
        path.to_path_buf()
    } else {
        env::current_dir()
            .map_err(|e| ConfigError::watch(path, e))?
            .join(path)
    };
    let directory = file
        .parent()
        .ok_or_else(|| ConfigError::watch(&file, "config file has no parent directory"))?
        .to_path_buf();
    if !file.exists() {
        return Err(ConfigError::watch(&file, "config file does not exist"));
    }

    let (tx, rx) = mpsc::channel();
    let mut watcher = notify::recommended_watcher(tx).map_err(|e| ConfigError::watch(&file, e))?;
    watcher
        .watch(&directory, RecursiveMode::NonRecursive)
        .map_err(|e| ConfigError::watch(&directory, e))?;

    let weak = container.downgrade();
    let span = container.span().clone();
    let primary = PrimaryFile::new(file.clone());
    thread::Builder::new()
        .name("config-watch".to_string())
        .spawn(move || watch_loop(&rx, &weak, primary, &span))
        .map_err(|e| ConfigError::watch(&file, e))?;

    debug!(parent: container.span(), path = %file.display(), "watching config file");
    Ok(WatchHandle {
        _watcher: watcher,
        path: file,
    })
}

fn watch_loop(
    rx: &mpsc::Receiver<notify::Result<Event>>,
    weak: &WeakContainer,
    mut primary: PrimaryFile,
    span: &Span,
) {
    // Ends once the watcher, and with it the sender, is dropped.
    for result in rx {
        let event = match result {
            Ok(event) => event,
            Err(e) => {
                warn!(parent: span, error = %e, "config watch error");
                continue;
            }
        };

        let Some(kind) = FileChangeKind::from_event_kind(&event.kind) else {
            continue;
        };
        let retargeted = primary.retarget();
        if !retargeted && !primary.is_named_by(&event) {
            continue;
        }

        let Some(container) = weak.upgrade() else {
            break;
        };

        if kind == FileChangeKind::Deleted && !retargeted {
            info!(parent: span, path = %primary.path.display(), "config file removed, keeping loaded values");
            continue;
        }

        if retargeted {
            if let Some(resolved) = &primary.resolved {
                info!(parent: span, path = %primary.path.display(), target = %resolved.display(), "config file target changed");
            }
        }
        info!(parent: span, path = %primary.path.display(), ?kind, "config updated");
        container.reload();
        container.notify_observers();
    }

    debug!(parent: span, path = %primary.path.display(), "config watch stopped");
}
