//! Execution-context configuration (`opts`).
//!
//! # Responsibility
//! - Hold the nested option mapping shared by capabilities and adapters.
//! - Implement `config.option` / `config.get` lookup precedence.
//! - Load option files from YAML or JSON.
//!
//! # Invariants
//! - The root value is always a mapping.
//! - Options are cloned into a registry at build time; a built registry never
//!   observes later edits.

use log::debug;
use serde_json::{Map, Value};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

/// Default minion id when `id` is not configured.
pub const DEFAULT_MINION_ID: &str = "saltloader";
/// Delimiter used by colon-path lookups (`proxy:proxytype`).
pub const DEFAULT_TARGET_DELIM: char = ':';

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Configuration load errors.
#[derive(Debug)]
pub enum ConfigError {
    Io { path: PathBuf, source: std::io::Error },
    Yaml(serde_yaml::Error),
    Json(serde_json::Error),
    NotAMapping,
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "failed to read config `{}`: {source}", path.display())
            }
            Self::Yaml(err) => write!(f, "invalid yaml config: {err}"),
            Self::Json(err) => write!(f, "invalid json config: {err}"),
            Self::NotAMapping => write!(f, "config root must be a mapping"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Yaml(err) => Some(err),
            Self::Json(err) => Some(err),
            Self::NotAMapping => None,
        }
    }
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(value: serde_yaml::Error) -> Self {
        Self::Yaml(value)
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}

/// Option mapping for one execution context.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoaderOptions {
    root: Map<String, Value>,
}

impl LoaderOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps an existing value; the value must be a mapping (or null).
    pub fn from_value(value: Value) -> ConfigResult<Self> {
        match value {
            Value::Object(root) => Ok(Self { root }),
            Value::Null => Ok(Self::default()),
            _ => Err(ConfigError::NotAMapping),
        }
    }

    pub fn from_yaml_str(raw: &str) -> ConfigResult<Self> {
        let value: Value = serde_yaml::from_str(raw)?;
        Self::from_value(value)
    }

    pub fn from_json_str(raw: &str) -> ConfigResult<Self> {
        let value: Value = serde_json::from_str(raw)?;
        Self::from_value(value)
    }

    /// Loads an option file. `.json` files are parsed as JSON, anything else
    /// as YAML.
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        debug!(
            "event=config_load module=config status=start path={} format={}",
            path.display(),
            if is_json { "json" } else { "yaml" }
        );
        if is_json {
            Self::from_json_str(&raw)
        } else {
            Self::from_yaml_str(&raw)
        }
    }

    /// Builder-style setter used while preparing a context.
    pub fn with(mut self, key: impl Into<String>, value: Value) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.root.insert(key.into(), value);
    }

    pub fn raw(&self, key: &str) -> Option<&Value> {
        self.root.get(key)
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.root.clone())
    }

    /// Minion id.
    pub fn id(&self) -> &str {
        self.root
            .get("id")
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_MINION_ID)
    }

    /// Configured grain overrides (empty when absent or not a mapping).
    pub fn grain_overrides(&self) -> Map<String, Value> {
        self.mapping("grains")
    }

    pub fn pillar(&self) -> Map<String, Value> {
        self.mapping("pillar")
    }

    /// Returns a list of strings; scalars are treated as one-item lists.
    pub fn string_list(&self, key: &str) -> Vec<String> {
        match self.root.get(key) {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|item| item.as_str().map(str::to_string))
                .collect(),
            Some(Value::String(item)) if !item.trim().is_empty() => vec![item.clone()],
            _ => vec![],
        }
    }

    pub fn flag(&self, key: &str, default: bool) -> bool {
        self.root.get(key).and_then(Value::as_bool).unwrap_or(default)
    }

    /// Proxy type when this context runs as a proxy minion.
    pub fn proxy_type(&self) -> Option<&str> {
        self.root
            .get("proxy")
            .and_then(|proxy| proxy.get("proxytype"))
            .and_then(Value::as_str)
    }

    /// `config.option` lookup: opts first, then top-level pillar keys.
    pub fn option(&self, key: &str, default: Value) -> Value {
        if let Some(value) = self.root.get(key) {
            return value.clone();
        }
        if let Some(value) = self.root.get("pillar").and_then(|pillar| pillar.get(key)) {
            return value.clone();
        }
        default
    }

    /// `config.get` lookup: colon-path traversal over opts, grains, then
    /// pillar.
    ///
    /// `grains` is passed in because effective grains include detected host
    /// facts that are not part of the option mapping.
    pub fn get(&self, path: &str, grains: &Value, default: Value) -> Value {
        let opts = Value::Object(self.root.clone());
        if let Some(value) = traverse(&opts, path, DEFAULT_TARGET_DELIM) {
            return value.clone();
        }
        if let Some(value) = traverse(grains, path, DEFAULT_TARGET_DELIM) {
            return value.clone();
        }
        if let Some(pillar) = self.root.get("pillar") {
            if let Some(value) = traverse(pillar, path, DEFAULT_TARGET_DELIM) {
                return value.clone();
            }
        }
        default
    }

    fn mapping(&self, key: &str) -> Map<String, Value> {
        match self.root.get(key) {
            Some(Value::Object(map)) => map.clone(),
            _ => Map::new(),
        }
    }
}

/// Walks a nested mapping/list by delimited path.
///
/// List segments are addressed by decimal index. An empty path returns the
/// value itself.
pub fn traverse<'a>(value: &'a Value, path: &str, delimiter: char) -> Option<&'a Value> {
    if path.is_empty() {
        return Some(value);
    }
    let mut current = value;
    for segment in path.split(delimiter) {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}
