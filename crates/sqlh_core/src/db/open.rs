//! Connection pool bootstrap for SQLite.
//!
//! # Responsibility
//! - Build the `r2d2` pool backing a [`Helper`](super::Helper).
//! - Configure every new pooled connection with the fixed pragma set.
//!
//! # Invariants
//! - Pooled connections have `journal_mode=WAL`, `busy_timeout=5000` and
//!   `foreign_keys=ON` before they are handed out.
//! - Pool construction gives up after the configured connect timeout.

use super::config::{BUSY_TIMEOUT_MS, FOREIGN_KEYS, JOURNAL_MODE};
use super::DbResult;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;
use std::path::Path;
use std::time::Duration;

pub type ConnectionPool = Pool<SqliteConnectionManager>;

pub type PooledConnection = r2d2::PooledConnection<SqliteConnectionManager>;

#[derive(Debug)]
struct PragmaCustomizer;

impl r2d2::CustomizeConnection<Connection, rusqlite::Error> for PragmaCustomizer {
    fn on_acquire(&self, conn: &mut Connection) -> Result<(), rusqlite::Error> {
        // Busy timeout first so the WAL switch waits on concurrent openers.
        conn.busy_timeout(Duration::from_millis(u64::from(BUSY_TIMEOUT_MS)))?;
        conn.execute_batch(&format!(
            "PRAGMA journal_mode = {JOURNAL_MODE};\
             PRAGMA foreign_keys = {};",
            if FOREIGN_KEYS { "ON" } else { "OFF" }
        ))?;
        Ok(())
    }
}

/// Builds a file-backed pool, blocking until the first connections are open
/// or `connect_timeout` elapses.
pub(crate) fn open_pool(
    path: &Path,
    pool_size: u32,
    connect_timeout: Duration,
) -> Result<ConnectionPool, r2d2::Error> {
    let manager = SqliteConnectionManager::file(path);
    Pool::builder()
        .max_size(pool_size.max(1))
        .min_idle(Some(1))
        .connection_timeout(connect_timeout)
        .connection_customizer(Box::new(PragmaCustomizer))
        .build(manager)
}

/// Reads back the pragmas that [`open_pool`] sets.
pub fn verify_pragmas(conn: &Connection) -> DbResult<PragmaState> {
    let journal_mode: String = conn.query_row("PRAGMA journal_mode;", [], |row| row.get(0))?;
    let busy_timeout_ms: u32 = conn.query_row("PRAGMA busy_timeout;", [], |row| row.get(0))?;
    let foreign_keys: i64 = conn.query_row("PRAGMA foreign_keys;", [], |row| row.get(0))?;
    Ok(PragmaState {
        journal_mode,
        busy_timeout_ms,
        foreign_keys_enabled: foreign_keys == 1,
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PragmaState {
    pub journal_mode: String,
    pub busy_timeout_ms: u32,
    pub foreign_keys_enabled: bool,
}
