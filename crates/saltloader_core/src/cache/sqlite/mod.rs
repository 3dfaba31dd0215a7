//! SQLite cache backend.
//!
//! # Responsibility
//! - Persist cache banks in one SQLite file (or in memory for tests).
//! - Keep the schema versioned through `migrations`.
//!
//! # Invariants
//! - Values are stored as JSON text and must decode back to JSON.
//! - The connection is guarded by a mutex; every call is one statement or
//!   one transaction.

use crate::cache::{
    child_segment, now_epoch_secs, validate_bank, validate_key, CacheBackend, CacheResult,
};
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

pub mod migrations;
mod open;

use open::{open_connection, open_connection_in_memory};

// Matches `bank` itself or any bank nested below it, without LIKE wildcards.
const WITHIN_BANK_SQL: &str = "(bank = ?1 OR substr(bank, 1, length(?1) + 1) = ?1 || '/')";

/// SQLite-backed cache.
pub struct SqliteCache {
    conn: Mutex<Connection>,
}

impl std::fmt::Debug for SqliteCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteCache").finish_non_exhaustive()
    }
}

impl SqliteCache {
    /// Opens (and migrates) a cache file.
    pub fn open(path: impl AsRef<Path>) -> CacheResult<Self> {
        Ok(Self {
            conn: Mutex::new(open_connection(path)?),
        })
    }

    pub fn open_in_memory() -> CacheResult<Self> {
        Ok(Self {
            conn: Mutex::new(open_connection_in_memory()?),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl CacheBackend for SqliteCache {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn store(&self, bank: &str, key: &str, data: &Value) -> CacheResult<()> {
        validate_bank(bank)?;
        validate_key(key)?;
        let encoded = serde_json::to_string(data)?;
        self.conn().execute(
            "INSERT INTO cache_entries (bank, key, data, updated)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (bank, key) DO UPDATE SET
                data = excluded.data,
                updated = excluded.updated",
            params![bank, key, encoded, now_epoch_secs()],
        )?;
        Ok(())
    }

    fn fetch(&self, bank: &str, key: &str) -> CacheResult<Option<Value>> {
        validate_bank(bank)?;
        validate_key(key)?;
        let raw: Option<String> = self
            .conn()
            .query_row(
                "SELECT data FROM cache_entries WHERE bank = ?1 AND key = ?2",
                params![bank, key],
                |row| row.get(0),
            )
            .optional()?;
        match raw {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    fn updated(&self, bank: &str, key: &str) -> CacheResult<Option<i64>> {
        validate_bank(bank)?;
        validate_key(key)?;
        Ok(self
            .conn()
            .query_row(
                "SELECT updated FROM cache_entries WHERE bank = ?1 AND key = ?2",
                params![bank, key],
                |row| row.get(0),
            )
            .optional()?)
    }

    fn flush(&self, bank: &str, key: Option<&str>) -> CacheResult<bool> {
        validate_bank(bank)?;
        let removed = match key {
            Some(key) => {
                validate_key(key)?;
                self.conn().execute(
                    "DELETE FROM cache_entries WHERE bank = ?1 AND key = ?2",
                    params![bank, key],
                )?
            }
            None => self.conn().execute(
                &format!("DELETE FROM cache_entries WHERE {WITHIN_BANK_SQL}"),
                params![bank],
            )?,
        };
        Ok(removed > 0)
    }

    fn list(&self, bank: &str) -> CacheResult<Vec<String>> {
        validate_bank(bank)?;
        let conn = self.conn();
        let mut names = BTreeSet::new();

        let mut keys = conn.prepare("SELECT key FROM cache_entries WHERE bank = ?1")?;
        for key in keys.query_map(params![bank], |row| row.get::<_, String>(0))? {
            names.insert(key?);
        }

        let mut banks = conn.prepare(&format!(
            "SELECT DISTINCT bank FROM cache_entries WHERE {WITHIN_BANK_SQL} AND bank != ?1"
        ))?;
        for nested in banks.query_map(params![bank], |row| row.get::<_, String>(0))? {
            let nested = nested?;
            if let Some(child) = child_segment(bank, &nested) {
                names.insert(child.to_string());
            }
        }
        Ok(names.into_iter().collect())
    }

    fn contains(&self, bank: &str, key: Option<&str>) -> CacheResult<bool> {
        validate_bank(bank)?;
        let conn = self.conn();
        let found = match key {
            Some(key) => {
                validate_key(key)?;
                conn.query_row(
                    "SELECT EXISTS(SELECT 1 FROM cache_entries WHERE bank = ?1 AND key = ?2)",
                    params![bank, key],
                    |row| row.get::<_, bool>(0),
                )?
            }
            None => conn.query_row(
                &format!("SELECT EXISTS(SELECT 1 FROM cache_entries WHERE {WITHIN_BANK_SQL})"),
                params![bank],
                |row| row.get::<_, bool>(0),
            )?,
        };
        Ok(found)
    }
}
