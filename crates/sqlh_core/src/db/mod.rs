//! SQLite connection handling, transactions and the query surface.
//!
//! # Responsibility
//! - Open a pooled SQLite connection with WAL, busy timeout and foreign keys.
//! - Run units of work inside transactions with guaranteed commit or rollback.
//! - Expose `select`/`get`/`exec` on both the connection and a transaction.
//! - Apply and revert embedded schema migrations.
//!
//! # Invariants
//! - Every transaction ends with exactly one commit or one rollback.
//! - A failed unit of work is never committed, including when it panics.
//! - `get` reports an empty result as [`DbError::NoRows`], never as a generic error.
//! - Core code must not read/write application data before migrations succeed.

use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod config;
pub mod context;
pub mod helper;
pub mod migrations;
mod open;
pub mod query;
pub mod row;
pub mod tx;

pub use config::{connection_target, HelperOptions, BUSY_TIMEOUT_MS, FOREIGN_KEYS, JOURNAL_MODE};
pub use context::Context;
pub use helper::Helper;
pub use open::{verify_pragmas, ConnectionPool, PooledConnection, PragmaState};
pub use query::Querier;
pub use row::FromRow;
pub use tx::Tx;

pub type DbResult<T> = Result<T, DbError>;

/// Boxed error reported by a unit of work.
pub type CallbackError = Box<dyn Error + Send + Sync + 'static>;

#[derive(Debug)]
pub enum DbError {
    /// Opening or configuring the pool failed, including the startup deadline.
    Connect {
        target: String,
        source: r2d2::Error,
    },
    NotConnected,
    AlreadyConnected,
    /// No pooled connection became available in time.
    Pool(r2d2::Error),
    Begin(rusqlite::Error),
    Commit(rusqlite::Error),
    /// Rolling back after a failure failed too; both causes are kept.
    Rollback {
        rollback: rusqlite::Error,
        original: Box<DbError>,
    },
    Callback(CallbackError),
    /// A unit of work panicked; carries the panic message.
    Panic(String),
    NoRows,
    Cancelled,
    DeadlineExceeded,
    Sqlite(rusqlite::Error),
    Migration {
        version: String,
        source: Box<DbError>,
    },
    UnknownMigration {
        version: String,
    },
}

impl DbError {
    /// Wraps a caller-side failure so it can be returned from a unit of work.
    pub fn callback(err: impl Into<CallbackError>) -> Self {
        Self::Callback(err.into())
    }

    /// Builds a caller-side failure from a plain message.
    pub fn msg(message: impl Into<String>) -> Self {
        Self::Callback(message.into().into())
    }

    /// Returns true for failures to open, reach or use the connection itself.
    pub fn is_connection(&self) -> bool {
        matches!(
            self,
            Self::Connect { .. } | Self::NotConnected | Self::AlreadyConnected | Self::Pool(_)
        )
    }

    pub fn is_no_rows(&self) -> bool {
        matches!(self, Self::NoRows)
    }

    /// Returns true when the caller's context was cancelled or ran out of time.
    pub fn is_context(&self) -> bool {
        matches!(self, Self::Cancelled | Self::DeadlineExceeded)
    }

    /// Returns the failure that triggered a rollback, looking through a
    /// composite rollback error.
    pub fn root_cause(&self) -> &DbError {
        match self {
            Self::Rollback { original, .. } => original.root_cause(),
            other => other,
        }
    }
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connect { target, source } => {
                write!(f, "error connecting to database `{target}`: {source}")
            }
            Self::NotConnected => write!(f, "database is not connected"),
            Self::AlreadyConnected => write!(f, "database is already connected"),
            Self::Pool(err) => write!(f, "error acquiring database connection: {err}"),
            Self::Begin(err) => write!(f, "error beginning transaction: {err}"),
            Self::Commit(err) => write!(f, "error committing transaction: {err}"),
            Self::Rollback { rollback, original } => write!(
                f,
                "error rolling back transaction after error (transaction error: {rollback}), original error: {original}"
            ),
            Self::Callback(err) => write!(f, "{err}"),
            Self::Panic(message) => write!(f, "panic: {message}"),
            Self::NoRows => write!(f, "no rows in result set"),
            Self::Cancelled => write!(f, "context canceled"),
            Self::DeadlineExceeded => write!(f, "context deadline exceeded"),
            Self::Sqlite(err) => write!(f, "{err}"),
            Self::Migration { version, source } => {
                write!(f, "error running migration `{version}`: {source}")
            }
            Self::UnknownMigration { version } => {
                write!(f, "unknown migration version `{version}`")
            }
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Connect { source, .. } => Some(source),
            Self::Pool(err) => Some(err),
            Self::Begin(err) | Self::Commit(err) | Self::Sqlite(err) => Some(err),
            Self::Rollback { original, .. } => Some(original.as_ref()),
            Self::Callback(err) => Some(err.as_ref()),
            Self::Migration { source, .. } => Some(source.as_ref()),
            Self::NotConnected
            | Self::AlreadyConnected
            | Self::Panic(_)
            | Self::NoRows
            | Self::Cancelled
            | Self::DeadlineExceeded
            | Self::UnknownMigration { .. } => None,
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        match value {
            rusqlite::Error::QueryReturnedNoRows => Self::NoRows,
            other => Self::Sqlite(other),
        }
    }
}

impl From<r2d2::Error> for DbError {
    fn from(value: r2d2::Error) -> Self {
        Self::Pool(value)
    }
}
