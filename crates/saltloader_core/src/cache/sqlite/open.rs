//! Connection bootstrap for the SQLite cache.
//!
//! # Invariants
//! - Returned connections have migrations fully applied.

use super::migrations::apply_migrations;
use crate::cache::CacheResult;
use log::{error, info};
use rusqlite::Connection;
use std::path::Path;
use std::time::{Duration, Instant};

/// Opens a cache file and applies pending migrations.
///
/// # Side effects
/// - Emits `cache_db_open` logging events with duration and status.
pub fn open_connection(path: impl AsRef<Path>) -> CacheResult<Connection> {
    bootstrap("file", || Connection::open(path.as_ref()))
}

/// Opens an in-memory cache database.
pub fn open_connection_in_memory() -> CacheResult<Connection> {
    bootstrap("memory", Connection::open_in_memory)
}

fn bootstrap(
    mode: &'static str,
    connect: impl FnOnce() -> rusqlite::Result<Connection>,
) -> CacheResult<Connection> {
    let started_at = Instant::now();
    let mut conn = match connect() {
        Ok(conn) => conn,
        Err(err) => {
            error!(
                "event=cache_db_open module=cache status=error mode={} duration_ms={} error_code=db_open_failed error={}",
                mode,
                started_at.elapsed().as_millis(),
                err
            );
            return Err(err.into());
        }
    };

    let prepared = conn
        .busy_timeout(Duration::from_secs(5))
        .map_err(Into::into)
        .and_then(|()| apply_migrations(&mut conn));
    match prepared {
        Ok(()) => {
            info!(
                "event=cache_db_open module=cache status=ok mode={} duration_ms={}",
                mode,
                started_at.elapsed().as_millis()
            );
            Ok(conn)
        }
        Err(err) => {
            error!(
                "event=cache_db_open module=cache status=error mode={} duration_ms={} error_code=db_bootstrap_failed error={}",
                mode,
                started_at.elapsed().as_millis(),
                err
            );
            Err(err)
        }
    }
}
