//! The configuration container facade.

use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{error, info_span, Span};

use crate::watch::WatchHandle;
use crate::{loader, round, ConfigError, ConfigResult, ErrorSender, FileSystem, FnObserver, Observer, Settings};

/// Where a container's values came from, kept so it can re-read them.
pub(crate) enum Origin {
    /// Files read through a filesystem, in merge order.
    Files {
        fs: Arc<dyn FileSystem>,
        paths: Vec<PathBuf>,
    },
    /// Readers, embedded assets and subtrees. Nothing to re-read.
    Detached,
}

struct Inner {
    id: String,
    settings: RwLock<Settings>,
    origin: Origin,
    observers: RwLock<Vec<Arc<dyn Observer>>>,
    span: Span,
    watch: Mutex<Option<WatchHandle>>,
    // Held for a whole re-read so concurrent reloads land in call order.
    reloading: Mutex<()>,
}

/// Merged configuration plus the observers to notify when it changes.
///
/// `Container` is a cheap handle: clones share the same settings, observers
/// and watch subscription. [`Container::sub`] is the exception and produces
/// an independent container.
///
/// # Example
///
/// ```
/// use strata_config::{Format, Loader};
///
/// let yaml = "yaml:\n  more:\n    key2: secondfile\n";
/// let config = Loader::new().load_readers(Format::Yaml, [yaml.as_bytes()]);
///
/// assert_eq!(config.get_string("yaml.more.key2"), "secondfile");
/// assert_eq!(config.sub("yaml.more").get_string("key2"), "secondfile");
/// ```
#[derive(Clone)]
pub struct Container {
    inner: Arc<Inner>,
}

impl Container {
    pub(crate) fn new(id: String, settings: Settings, origin: Origin, span: Span) -> Self {
        Self {
            inner: Arc::new(Inner {
                id,
                settings: RwLock::new(settings),
                origin,
                observers: RwLock::new(Vec::new()),
                span,
                watch: Mutex::new(None),
                reloading: Mutex::new(()),
            }),
        }
    }

    /// A container with no values and no observers.
    pub fn empty() -> Self {
        Self::new(
            String::new(),
            Settings::new(),
            Origin::Detached,
            info_span!("config", id = ""),
        )
    }

    /// Identity built from the sources this container was loaded from.
    ///
    /// Meant for logs and debugging, not as a lookup key.
    pub fn id(&self) -> &str {
        &self.inner.id
    }

    /// The span all of this container's log events are recorded in.
    pub fn span(&self) -> &Span {
        &self.inner.span
    }

    /// Raw value for `key`, or `None` if nothing defines it.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.inner.settings.read().get(key)
    }

    /// Boolean value for `key`, `false` if missing.
    pub fn get_bool(&self, key: &str) -> bool {
        self.inner.settings.read().get_bool(key)
    }

    /// Integer value for `key`, `0` if missing.
    pub fn get_int(&self, key: &str) -> i64 {
        self.inner.settings.read().get_int(key)
    }

    /// Float value for `key`, `0.0` if missing.
    pub fn get_float(&self, key: &str) -> f64 {
        self.inner.settings.read().get_float(key)
    }

    /// String value for `key`, empty if missing.
    pub fn get_string(&self, key: &str) -> String {
        self.inner.settings.read().get_string(key)
    }

    /// Timestamp for `key`, the Unix epoch if missing.
    pub fn get_time(&self, key: &str) -> DateTime<Utc> {
        self.inner.settings.read().get_time(key)
    }

    /// Duration for `key`, zero if missing.
    pub fn get_duration(&self, key: &str) -> Duration {
        self.inner.settings.read().get_duration(key)
    }

    /// Whether `key` is defined by a loaded source.
    pub fn has(&self, key: &str) -> bool {
        self.inner.settings.read().has(key)
    }

    /// A snapshot of the underlying settings store.
    ///
    /// Use this when several reads must come from the same version of the
    /// configuration; a reload can otherwise land between two calls.
    pub fn settings(&self) -> Settings {
        self.inner.settings.read().clone()
    }

    /// Independent container rooted at `key`.
    ///
    /// The subtree shares this container's span but starts with no
    /// observers. A missing key yields an empty container.
    pub fn sub(&self, key: &str) -> Container {
        let settings = self.inner.settings.read().sub(key);
        Container::new(
            format!("{}#{}", self.inner.id, key),
            settings,
            Origin::Detached,
            self.inner.span.clone(),
        )
    }

    /// Register an observer for future notification rounds.
    pub fn add_observer<O>(&self, observer: O)
    where
        O: Observer + 'static,
    {
        self.inner.observers.write().push(Arc::new(observer));
    }

    /// Register a plain function for future notification rounds.
    pub fn add_observer_fn<F>(&self, f: F)
    where
        F: Fn(&Container, &ErrorSender) + Send + Sync + 'static,
    {
        self.add_observer(FnObserver::new(f));
    }

    /// The currently registered observers.
    pub fn observers(&self) -> Vec<Arc<dyn Observer>> {
        self.inner.observers.read().clone()
    }

    /// Run one notification round now and wait for it to finish.
    ///
    /// Observers registered while the round runs take part from the next
    /// round on.
    pub fn notify_observers(&self) {
        let observers = self.observers();
        round::run(self, &observers);
    }

    /// Re-read every file source and swap the result in.
    ///
    /// Returns `false` for containers that were not loaded from files.
    pub fn reload(&self) -> bool {
        let Origin::Files { fs, paths } = &self.inner.origin else {
            return false;
        };

        let _reloading = self.inner.reloading.lock();
        let base = {
            let current = self.inner.settings.read();
            loader::base_settings(current.env().clone(), current.defaults().clone())
        };
        let fresh = loader::read_files(base, fs.as_ref(), paths, &self.inner.span);
        *self.inner.settings.write() = fresh;
        true
    }

    /// Whether a file watch subscription is active.
    pub fn is_watching(&self) -> bool {
        self.inner.watch.lock().is_some()
    }

    /// Release the file watch subscription, if any.
    pub fn stop_watching(&self) -> bool {
        self.inner.watch.lock().take().is_some()
    }

    /// The merged tree as a JSON string.
    ///
    /// Serialization failures are logged and produce an empty string.
    pub fn to_json(&self) -> String {
        let all = self.inner.settings.read().all_settings();
        match serde_json::to_string(&all) {
            Ok(json) => json,
            Err(e) => {
                error!(parent: &self.inner.span, error = %ConfigError::from(e), "unable to marshal config to JSON");
                String::new()
            }
        }
    }

    /// Print the merged tree as JSON to stdout.
    pub fn dump(&self) {
        println!("{}", self.to_json());
    }

    /// Deserialize the whole merged tree.
    pub fn unmarshal<T: DeserializeOwned>(&self) -> ConfigResult<T> {
        let all = self.inner.settings.read().all_settings();
        serde_json::from_value(Value::Object(all)).map_err(|source| ConfigError::Deserialize {
            key: String::new(),
            source,
        })
    }

    /// Deserialize the value or subtree at `key`.
    ///
    /// A missing key deserializes from `null`, so `Option` and defaulted
    /// types still succeed.
    pub fn unmarshal_key<T: DeserializeOwned>(&self, key: &str) -> ConfigResult<T> {
        let value = {
            let settings = self.inner.settings.read();
            let pointer = format!("/{}", key.to_lowercase().replace('.', "/"));
            Value::Object(settings.all_settings())
                .pointer(&pointer)
                .cloned()
                .or_else(|| settings.get(key))
                .unwrap_or(Value::Null)
        };
        serde_json::from_value(value).map_err(|source| ConfigError::Deserialize {
            key: key.to_string(),
            source,
        })
    }

    pub(crate) fn set_watch(&self, handle: WatchHandle) {
        *self.inner.watch.lock() = Some(handle);
    }

    pub(crate) fn downgrade(&self) -> WeakContainer {
        WeakContainer(Arc::downgrade(&self.inner))
    }
}

/// Non-owning handle used by the watch thread, so an armed watch never keeps
/// its container alive.
pub(crate) struct WeakContainer(Weak<Inner>);

impl WeakContainer {
    pub(crate) fn upgrade(&self) -> Option<Container> {
        self.0.upgrade().map(|inner| Container { inner })
    }
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("id", &self.inner.id)
            .field("observers", &self.inner.observers.read().len())
            .field(
                "watching",
                &self.inner.watch.lock().as_ref().map(WatchHandle::path),
            )
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::path::Path;
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    use crate::{Loader, MemFs};

    /// Filesystem whose next read stalls until released.
    #[derive(Debug, Default)]
    struct GatedFs {
        files: MemFs,
        gate: Mutex<Option<(mpsc::Sender<()>, mpsc::Receiver<()>)>>,
    }

    impl FileSystem for GatedFs {
        fn exists(&self, path: &Path) -> bool {
            self.files.exists(path)
        }

        fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
            let contents = self.files.read(path);
            let gate = self.gate.lock().take();
            if let Some((entered, release)) = gate {
                let _ = entered.send(());
                let _ = release.recv();
            }
            contents
        }
    }

    #[test]
    fn test_debug_output() {
        let config = Container::empty();
        let debug = format!("{config:?}");
        assert!(debug.contains("Container"));
        assert!(debug.contains("observers: 0"));
    }

    #[test]
    fn test_reload_of_detached_container() {
        assert!(!Container::empty().reload());
    }

    #[test]
    fn test_concurrent_reloads_keep_latest_contents() {
        let fs = Arc::new(GatedFs::default());
        fs.files.write("app.yaml", "version: 1\n");
        let config = Loader::new()
            .with_fs(fs.clone())
            .with_file("app.yaml")
            .without_automatic_env()
            .load()
            .unwrap();

        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        *fs.gate.lock() = Some((entered_tx, release_rx));

        // First reload reads version 1 and stalls before storing it
        let first = {
            let config = config.clone();
            thread::spawn(move || config.reload())
        };
        entered_rx.recv().unwrap();

        fs.files.write("app.yaml", "version: 2\n");
        let second = {
            let config = config.clone();
            thread::spawn(move || config.reload())
        };
        thread::sleep(Duration::from_millis(50));
        release_tx.send(()).unwrap();

        assert!(first.join().unwrap());
        assert!(second.join().unwrap());
        assert_eq!(config.get_int("version"), 2);
    }
}
