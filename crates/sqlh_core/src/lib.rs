//! Transactional access layer over SQLite.
//!
//! A [`Helper`] owns a pooled connection configured for WAL, a busy timeout
//! and foreign keys. Units of work run through [`Helper::in_transaction`],
//! which commits on success and rolls back on error or panic. Both the helper
//! and the transaction scope implement [`Querier`].

pub mod db;
pub mod logging;

pub use db::migrations::{current_version, latest_version};
pub use db::{
    connection_target, CallbackError, ConnectionPool, Context, DbError, DbResult, FromRow,
    Helper, HelperOptions, PooledConnection, Querier, Tx,
};
pub use logging::{default_log_level, init_logging, logging_status, LogSink};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
