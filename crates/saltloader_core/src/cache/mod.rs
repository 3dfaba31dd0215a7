//! Key-value cache collaborator contract and backends.
//!
//! # Responsibility
//! - Define the uniform `store/fetch/flush/list/contains` contract that every
//!   cache backend honours.
//! - Select a backend from execution-context options.
//!
//! # Invariants
//! - Banks are `/`-separated paths of non-empty segments; keys never contain
//!   `/`.
//! - `flush(bank, None)` removes the bank and every nested bank.
//! - `list(bank)` returns direct keys plus direct child bank names, sorted and
//!   deduplicated.

use crate::config::LoaderOptions;
use log::info;
use serde_json::Value;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

mod memory;
pub mod sqlite;

pub use memory::MemoryCache;
pub use sqlite::SqliteCache;

/// Backend selected when `cache` is not configured.
pub const DEFAULT_CACHE_BACKEND: &str = "memory";
/// SQLite file name inside `cachedir`.
pub const SQLITE_CACHE_FILE_NAME: &str = "cache.sqlite3";

pub type CacheResult<T> = Result<T, CacheError>;

/// Cache backend errors.
#[derive(Debug)]
pub enum CacheError {
    InvalidBank(String),
    InvalidKey(String),
    Db(rusqlite::Error),
    Serialization(serde_json::Error),
    UnsupportedSchemaVersion {
        db_version: u32,
        latest_supported: u32,
    },
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    UnsupportedBackend(String),
    InvalidConfig(String),
}

impl Display for CacheError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidBank(value) => write!(f, "cache bank is invalid: `{value}`"),
            Self::InvalidKey(value) => write!(f, "cache key is invalid: `{value}`"),
            Self::Db(err) => write!(f, "{err}"),
            Self::Serialization(err) => write!(f, "cache value is not valid json: {err}"),
            Self::UnsupportedSchemaVersion {
                db_version,
                latest_supported,
            } => write!(
                f,
                "cache schema version {db_version} is newer than supported {latest_supported}"
            ),
            Self::Io { path, source } => {
                write!(f, "cache path `{}` is unusable: {source}", path.display())
            }
            Self::UnsupportedBackend(value) => write!(f, "unsupported cache backend: {value}"),
            Self::InvalidConfig(message) => write!(f, "invalid cache config: {message}"),
        }
    }
}

impl Error for CacheError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Serialization(err) => Some(err),
            Self::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<rusqlite::Error> for CacheError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(value)
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization(value)
    }
}

/// Uniform cache contract shared by every backend.
pub trait CacheBackend: Send + Sync {
    /// Backend name as used in the `cache` option.
    fn name(&self) -> &'static str;
    fn store(&self, bank: &str, key: &str, data: &Value) -> CacheResult<()>;
    fn fetch(&self, bank: &str, key: &str) -> CacheResult<Option<Value>>;
    /// Epoch seconds of the last store for `bank/key`.
    fn updated(&self, bank: &str, key: &str) -> CacheResult<Option<i64>>;
    /// Removes one key, or the whole bank tree when `key` is `None`.
    /// Returns whether anything was removed.
    fn flush(&self, bank: &str, key: Option<&str>) -> CacheResult<bool>;
    fn list(&self, bank: &str) -> CacheResult<Vec<String>>;
    /// Checks one key, or bank existence when `key` is `None`.
    fn contains(&self, bank: &str, key: Option<&str>) -> CacheResult<bool>;
}

/// Opens the backend named by the `cache` option.
///
/// # Errors
/// - Unknown backend name.
/// - `sqlite` without an absolute `cachedir`, or when the database cannot be
///   opened and migrated.
pub fn open(options: &LoaderOptions) -> CacheResult<Arc<dyn CacheBackend>> {
    let backend = options
        .raw("cache")
        .and_then(Value::as_str)
        .unwrap_or(DEFAULT_CACHE_BACKEND)
        .trim()
        .to_ascii_lowercase();
    let cache: Arc<dyn CacheBackend> = match backend.as_str() {
        "memory" => Arc::new(MemoryCache::new()),
        "sqlite" => {
            let dir = options
                .raw("cachedir")
                .and_then(Value::as_str)
                .ok_or_else(|| {
                    CacheError::InvalidConfig("sqlite cache requires `cachedir`".to_string())
                })?;
            let dir = Path::new(dir.trim());
            if !dir.is_absolute() {
                return Err(CacheError::InvalidConfig(format!(
                    "cachedir must be an absolute path, got `{}`",
                    dir.display()
                )));
            }
            std::fs::create_dir_all(dir).map_err(|source| CacheError::Io {
                path: dir.to_path_buf(),
                source,
            })?;
            Arc::new(SqliteCache::open(dir.join(SQLITE_CACHE_FILE_NAME))?)
        }
        other => return Err(CacheError::UnsupportedBackend(other.to_string())),
    };
    info!(
        "event=cache_open module=cache status=ok backend={}",
        cache.name()
    );
    Ok(cache)
}

pub(crate) fn validate_bank(bank: &str) -> CacheResult<()> {
    let valid = !bank.is_empty()
        && bank.split('/').all(|segment| {
            !segment.is_empty()
                && segment
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
        });
    if valid {
        Ok(())
    } else {
        Err(CacheError::InvalidBank(bank.to_string()))
    }
}

pub(crate) fn validate_key(key: &str) -> CacheResult<()> {
    if key.is_empty() || key.contains('/') || key.trim() != key {
        return Err(CacheError::InvalidKey(key.to_string()));
    }
    Ok(())
}

/// Returns the direct child segment of `bank` for a nested `candidate`.
pub(crate) fn child_segment<'a>(bank: &str, candidate: &'a str) -> Option<&'a str> {
    let rest = candidate.strip_prefix(bank)?.strip_prefix('/')?;
    rest.split('/').next().filter(|segment| !segment.is_empty())
}

pub(crate) fn is_within(bank: &str, candidate: &str) -> bool {
    candidate == bank || child_segment(bank, candidate).is_some()
}

pub(crate) fn now_epoch_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs() as i64)
        .unwrap_or(0)
}
