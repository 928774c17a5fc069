//! Source formats and parsing into the settings tree.

use std::fmt;
use std::path::Path;

use serde_json::{Map, Value};

use crate::{ConfigError, ConfigResult};

/// Structured format of a configuration source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Format {
    /// YAML (`.yaml`, `.yml`).
    #[default]
    Yaml,
    /// JSON (`.json`).
    Json,
    /// TOML (`.toml`).
    Toml,
}

impl Format {
    /// Determine the format from a file extension.
    pub fn from_path(path: impl AsRef<Path>) -> Option<Self> {
        let extension = path
            .as_ref()
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase);

        match extension.as_deref() {
            Some("yaml" | "yml") => Some(Self::Yaml),
            Some("json") => Some(Self::Json),
            Some("toml") => Some(Self::Toml),
            _ => None,
        }
    }

    /// Short lowercase name of the format.
    pub fn name(self) -> &'static str {
        match self {
            Self::Yaml => "yaml",
            Self::Json => "json",
            Self::Toml => "toml",
        }
    }

    /// Parse raw bytes into a mapping with lowercased keys.
    ///
    /// Empty documents parse to an empty mapping. A document whose top level
    /// is not a mapping is rejected.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] if the content is not valid for the format.
    pub fn parse(self, bytes: &[u8], source_id: &str) -> ConfigResult<Map<String, Value>> {
        let value = match self {
            Self::Yaml => {
                if is_blank_yaml(bytes) {
                    return Ok(Map::new());
                }
                let mut document = serde_yaml::from_slice::<serde_yaml::Value>(bytes)
                    .map_err(|e| ConfigError::parse(source_id, self.name(), e))?;
                // `<<: *anchor` keys are folded into their mapping
                document
                    .apply_merge()
                    .map_err(|e| ConfigError::parse(source_id, self.name(), e))?;
                serde_yaml::from_value::<Value>(document)
                    .map_err(|e| ConfigError::parse(source_id, self.name(), e))?
            }
            Self::Json => {
                if bytes.iter().all(u8::is_ascii_whitespace) {
                    return Ok(Map::new());
                }
                serde_json::from_slice::<Value>(bytes)
                    .map_err(|e| ConfigError::parse(source_id, self.name(), e))?
            }
            Self::Toml => {
                let text = std::str::from_utf8(bytes)
                    .map_err(|e| ConfigError::parse(source_id, self.name(), e))?;
                let table = toml::from_str::<toml::Table>(text)
                    .map_err(|e| ConfigError::parse(source_id, self.name(), e))?;
                Value::Object(toml_table_to_json(table))
            }
        };

        match normalize_keys(value) {
            Value::Object(map) => Ok(map),
            Value::Null => Ok(Map::new()),
            other => Err(ConfigError::parse(
                source_id,
                self.name(),
                format!("top level must be a mapping, found {}", type_name(&other)),
            )),
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Lowercase every mapping key in the tree.
pub(crate) fn normalize_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (k.to_lowercase(), normalize_keys(v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(normalize_keys).collect()),
        other => other,
    }
}

pub(crate) fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "sequence",
        Value::Object(_) => "mapping",
    }
}

// Comment-only and separator-only documents count as empty.
fn is_blank_yaml(bytes: &[u8]) -> bool {
    String::from_utf8_lossy(bytes).lines().all(|line| {
        let line = line.trim();
        line.is_empty() || line.starts_with('#') || line == "---" || line == "..."
    })
}

fn toml_table_to_json(table: toml::Table) -> Map<String, Value> {
    table
        .into_iter()
        .map(|(k, v)| (k, toml_to_json(v)))
        .collect()
}

fn toml_to_json(value: toml::Value) -> Value {
    match value {
        toml::Value::String(s) => Value::String(s),
        toml::Value::Integer(i) => Value::from(i),
        toml::Value::Float(f) => serde_json::Number::from_f64(f).map_or(Value::Null, Value::Number),
        toml::Value::Boolean(b) => Value::Bool(b),
        toml::Value::Datetime(dt) => Value::String(dt.to_string()),
        toml::Value::Array(items) => Value::Array(items.into_iter().map(toml_to_json).collect()),
        toml::Value::Table(table) => Value::Object(toml_table_to_json(table)),
    }
}
