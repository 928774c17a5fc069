//! The settings store: a merged tree of configuration values.
//!
//! Values resolve in this order, first match wins:
//! 1. Environment variables (when automatic env is enabled)
//! 2. Values from loaded sources (later sources override earlier ones)
//! 3. Registered defaults
//!
//! Keys are dot-separated paths and are matched case-insensitively.

use std::env;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::cast;

/// How environment variables are resolved for a store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct EnvLookup {
    automatic: bool,
    prefix: Option<String>,
    // Key path of the subtree this store is rooted at.
    path: Vec<String>,
}

impl Default for EnvLookup {
    fn default() -> Self {
        Self {
            automatic: true,
            prefix: None,
            path: Vec::new(),
        }
    }
}

impl EnvLookup {
    pub(crate) fn new(automatic: bool, prefix: Option<String>) -> Self {
        Self {
            automatic,
            prefix: prefix.map(|p| p.to_uppercase()),
            path: Vec::new(),
        }
    }

    fn variable_name(&self, key: &str) -> String {
        let mut parts: Vec<&str> = Vec::with_capacity(self.path.len() + 2);
        if let Some(prefix) = &self.prefix {
            parts.push(prefix);
        }
        parts.extend(self.path.iter().map(String::as_str));
        parts.push(key);
        parts.join("_").replace('.', "_").to_uppercase()
    }

    fn lookup(&self, key: &str) -> Option<String> {
        if !self.automatic {
            return None;
        }
        env::var(self.variable_name(key))
            .ok()
            .filter(|value| !value.is_empty())
    }

    fn descend(&self, key: &str) -> Self {
        let mut path = self.path.clone();
        path.extend(key.split('.').map(str::to_string));
        Self {
            automatic: self.automatic,
            prefix: self.prefix.clone(),
            path,
        }
    }
}

/// A merged, case-insensitive configuration tree with typed accessors.
///
/// # Example
///
/// ```
/// use strata_config::{Format, Settings};
///
/// let mut settings = Settings::new();
/// settings.set_source(Format::Yaml.parse(b"server:\n  port: 8080\n", "base").unwrap());
/// settings.merge(Format::Yaml.parse(b"server:\n  host: localhost\n", "override").unwrap());
///
/// assert_eq!(settings.get_int("server.port"), 8080);
/// assert_eq!(settings.get_string("Server.Host"), "localhost");
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Settings {
    config: Map<String, Value>,
    defaults: Map<String, Value>,
    env: EnvLookup,
}

impl Settings {
    /// Create an empty store with automatic environment lookup enabled.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_env(env: EnvLookup) -> Self {
        Self {
            env,
            ..Self::default()
        }
    }

    /// Replace all source values with `values`.
    pub fn set_source(&mut self, values: Map<String, Value>) {
        self.config = values;
    }

    /// Deep-merge `values` on top of the current source values.
    ///
    /// Only leaves at conflicting paths are replaced; sibling keys survive.
    pub fn merge(&mut self, values: Map<String, Value>) {
        merge_maps(&mut self.config, values);
    }

    /// Register a default value for `key`.
    pub fn set_default(&mut self, key: &str, value: impl Into<Value>) {
        let key = key.to_lowercase();
        let value = crate::format::normalize_keys(value.into());
        insert_path(&mut self.defaults, &key, value);
    }

    /// Raw value for `key`, or `None` if no layer defines it.
    ///
    /// Environment values are always strings.
    pub fn get(&self, key: &str) -> Option<Value> {
        let key = key.to_lowercase();
        if key.is_empty() {
            return None;
        }
        if let Some(value) = self.env.lookup(&key) {
            return Some(Value::String(value));
        }
        find_path(&self.config, &key)
            .or_else(|| find_path(&self.defaults, &key))
            .cloned()
    }

    /// Boolean value for `key`, `false` if missing or not coercible.
    pub fn get_bool(&self, key: &str) -> bool {
        self.get(key).as_ref().and_then(cast::to_bool).unwrap_or_default()
    }

    /// Integer value for `key`, `0` if missing or not coercible.
    pub fn get_int(&self, key: &str) -> i64 {
        self.get(key).as_ref().and_then(cast::to_i64).unwrap_or_default()
    }

    /// Float value for `key`, `0.0` if missing or not coercible.
    pub fn get_float(&self, key: &str) -> f64 {
        self.get(key).as_ref().and_then(cast::to_f64).unwrap_or_default()
    }

    /// String value for `key`, empty if missing or not coercible.
    pub fn get_string(&self, key: &str) -> String {
        self.get(key).as_ref().and_then(cast::to_string).unwrap_or_default()
    }

    /// Timestamp for `key`, the Unix epoch if missing or not coercible.
    pub fn get_time(&self, key: &str) -> DateTime<Utc> {
        self.get(key).as_ref().and_then(cast::to_time).unwrap_or_default()
    }

    /// Duration for `key`, zero if missing or not coercible.
    pub fn get_duration(&self, key: &str) -> Duration {
        self.get(key).as_ref().and_then(cast::to_duration).unwrap_or_default()
    }

    /// Whether `key` is present in the loaded sources.
    ///
    /// Defaults and environment variables do not count.
    pub fn has(&self, key: &str) -> bool {
        let key = key.to_lowercase();
        !key.is_empty() && find_path(&self.config, &key).is_some()
    }

    /// Independent store rooted at `key`.
    ///
    /// A missing or non-mapping key yields an empty store. Environment lookups
    /// in the subtree still use the full key path.
    pub fn sub(&self, key: &str) -> Settings {
        let key = key.to_lowercase();
        let subtree = |tree: &Map<String, Value>| match find_path(tree, &key) {
            Some(Value::Object(map)) if !key.is_empty() => map.clone(),
            _ => Map::new(),
        };

        Settings {
            config: subtree(&self.config),
            defaults: subtree(&self.defaults),
            env: self.env.descend(&key),
        }
    }

    /// The fully merged tree: defaults, then sources, then environment
    /// overrides for every key present in the tree.
    pub fn all_settings(&self) -> Map<String, Value> {
        let mut merged = self.defaults.clone();
        merge_maps(&mut merged, self.config.clone());
        if self.env.automatic {
            self.apply_env(&mut merged, "");
        }
        merged
    }

    /// Every leaf key in the merged tree, sorted.
    pub fn all_keys(&self) -> Vec<String> {
        let mut merged = self.defaults.clone();
        merge_maps(&mut merged, self.config.clone());
        let mut keys = Vec::new();
        collect_keys(&merged, "", &mut keys);
        keys.sort();
        keys
    }

    /// Whether no layer holds any values.
    pub fn is_empty(&self) -> bool {
        self.config.is_empty() && self.defaults.is_empty()
    }

    pub(crate) fn env(&self) -> &EnvLookup {
        &self.env
    }

    pub(crate) fn defaults(&self) -> &Map<String, Value> {
        &self.defaults
    }

    pub(crate) fn set_defaults(&mut self, defaults: Map<String, Value>) {
        self.defaults = defaults;
    }

    fn apply_env(&self, tree: &mut Map<String, Value>, prefix: &str) {
        for (key, value) in tree.iter_mut() {
            let path = join_key(prefix, key);
            match value {
                Value::Object(children) => self.apply_env(children, &path),
                leaf => {
                    if let Some(env_value) = self.env.lookup(&path) {
                        *leaf = Value::String(env_value);
                    }
                }
            }
        }
    }
}

/// Deep-merge `overlay` into `base`. Overlay wins on conflicting leaves.
pub(crate) fn merge_maps(base: &mut Map<String, Value>, overlay: Map<String, Value>) {
    for (key, overlay_value) in overlay {
        match (base.get_mut(&key), overlay_value) {
            (Some(Value::Object(base_child)), Value::Object(overlay_child)) => {
                merge_maps(base_child, overlay_child);
            }
            (_, overlay_value) => {
                base.insert(key, overlay_value);
            }
        }
    }
}

fn find_path<'a>(tree: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    let mut parts = key.split('.');
    let mut current = tree.get(parts.next()?)?;
    for part in parts {
        current = match current {
            Value::Object(map) => map.get(part)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Set `value` at the dotted `key`, replacing scalars that sit on the path.
pub(crate) fn insert_path(tree: &mut Map<String, Value>, key: &str, value: Value) {
    match key.split_once('.') {
        None => {
            tree.insert(key.to_string(), value);
        }
        Some((head, rest)) => {
            let child = tree
                .entry(head.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !child.is_object() {
                *child = Value::Object(Map::new());
            }
            if let Value::Object(map) = child {
                insert_path(map, rest, value);
            }
        }
    }
}

fn collect_keys(tree: &Map<String, Value>, prefix: &str, keys: &mut Vec<String>) {
    for (key, value) in tree {
        let path = join_key(prefix, key);
        match value {
            Value::Object(children) if !children.is_empty() => {
                collect_keys(children, &path, keys);
            }
            _ => keys.push(path),
        }
    }
}

fn join_key(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}.{key}")
    }
}
