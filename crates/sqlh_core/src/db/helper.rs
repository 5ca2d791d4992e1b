//! The connection handle applications hold for the lifetime of the process.
//!
//! # Responsibility
//! - Own the connection pool and its lifecycle (`new` → `connect` → `close`).
//! - Hand out transaction scopes through [`Helper::in_transaction`].
//! - Serve autocommit queries through [`Querier`].
//!
//! # Invariants
//! - At most one pool is live per helper; connecting twice is rejected.
//! - Queries and transactions on a helper that is not connected fail with
//!   [`DbError::NotConnected`].

use super::config::{connection_target, HelperOptions};
use super::context::Context;
use super::migrations;
use super::open::{open_pool, ConnectionPool, PooledConnection};
use super::query::{exec_on, get_on, select_on, Querier};
use super::row::FromRow;
use super::tx::{run_in_transaction, Tx};
use super::{DbError, DbResult};
use crate::logging::LogSink;
use rusqlite::Params;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

pub struct Helper {
    pool: Option<ConnectionPool>,
    log: LogSink,
    path: PathBuf,
    target: String,
    pool_size: u32,
    connect_timeout: Duration,
}

impl Helper {
    /// Creates a helper for `options.path`. Nothing is opened until
    /// [`connect`](Self::connect).
    pub fn new(options: HelperOptions) -> Self {
        let connect_timeout = options.connect_timeout();
        Self {
            target: connection_target(&options.path),
            pool: None,
            log: options.log,
            path: options.path,
            pool_size: options.pool_size,
            connect_timeout,
        }
    }

    /// Opens the pool, waiting at most the configured connect timeout.
    ///
    /// # Side effects
    /// - Logs one `db_connect` line naming the target, or an error line.
    pub fn connect(&mut self) -> DbResult<()> {
        if self.pool.is_some() {
            return Err(DbError::AlreadyConnected);
        }

        let started_at = Instant::now();
        match open_pool(&self.path, self.pool_size, self.connect_timeout) {
            Ok(pool) => {
                self.log.info(format_args!(
                    "event=db_connect module=db status=ok path={} duration_ms={}",
                    self.target,
                    started_at.elapsed().as_millis()
                ));
                self.pool = Some(pool);
                Ok(())
            }
            Err(source) => {
                self.log.error(format_args!(
                    "event=db_connect module=db status=error duration_ms={} error_code=db_open_failed error={}",
                    started_at.elapsed().as_millis(),
                    source
                ));
                Err(DbError::Connect {
                    target: self.target.clone(),
                    source,
                })
            }
        }
    }

    /// Drops the pool. The helper can be connected again afterwards.
    pub fn close(&mut self) {
        if self.pool.take().is_some() {
            self.log
                .info(format_args!("event=db_close module=db status=ok"));
        }
    }

    pub fn is_connected(&self) -> bool {
        self.pool.is_some()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Connection target including the fixed parameter set.
    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn log(&self) -> &LogSink {
        &self.log
    }

    /// The raw pool, for collaborators such as a job queue that share the
    /// same database file.
    pub fn pool(&self) -> DbResult<&ConnectionPool> {
        self.pool.as_ref().ok_or(DbError::NotConnected)
    }

    /// Runs `callback` in a transaction and commits if it succeeds.
    ///
    /// The transaction is rolled back when the callback returns an error,
    /// panics, or finishes after `ctx` is done. The callback's error is
    /// returned unchanged unless the rollback fails too, in which case both
    /// are reported as [`DbError::Rollback`].
    pub fn in_transaction<T, F>(&self, ctx: &Context, callback: F) -> DbResult<T>
    where
        F: FnOnce(&Tx<'_>) -> DbResult<T>,
    {
        let mut conn = self.acquire(ctx)?;
        run_in_transaction(&mut conn, ctx, &self.log, callback)
    }

    /// Round-trips `select 1` through a transaction.
    pub fn ping(&self, ctx: &Context) -> DbResult<()> {
        self.in_transaction(ctx, |tx| tx.exec(ctx, "select 1", []).map(|_| ()))
    }

    /// Applies all pending migrations.
    pub fn migrate_up(&self, ctx: &Context) -> DbResult<()> {
        migrations::migrate_up(self, ctx)
    }

    /// Reverts all applied migrations.
    pub fn migrate_down(&self, ctx: &Context) -> DbResult<()> {
        migrations::migrate_down(self, ctx)
    }

    /// Migrates up or down until `version` is the current version. An empty
    /// version means no migrations applied.
    pub fn migrate_to(&self, ctx: &Context, version: &str) -> DbResult<()> {
        migrations::migrate_to(self, ctx, version)
    }

    /// Checks out a pooled connection, waiting no longer than `ctx` allows.
    fn acquire(&self, ctx: &Context) -> DbResult<PooledConnection> {
        ctx.check()?;
        let pool = self.pool()?;
        let timeout = match ctx.remaining() {
            Some(remaining) => remaining.min(self.connect_timeout),
            None => self.connect_timeout,
        };
        pool.get_timeout(timeout).map_err(|err| match ctx.err() {
            Some(ctx_err) => ctx_err,
            None => DbError::Pool(err),
        })
    }
}

impl std::fmt::Debug for Helper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Helper")
            .field("target", &self.target)
            .field("connected", &self.is_connected())
            .field("pool_size", &self.pool_size)
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}

impl Querier for Helper {
    fn select<T, P>(&self, ctx: &Context, sql: &str, params: P) -> DbResult<Vec<T>>
    where
        T: FromRow,
        P: Params,
    {
        let conn = self.acquire(ctx)?;
        select_on(&conn, ctx, sql, params)
    }

    fn get<T, P>(&self, ctx: &Context, sql: &str, params: P) -> DbResult<T>
    where
        T: FromRow,
        P: Params,
    {
        let conn = self.acquire(ctx)?;
        get_on(&conn, ctx, sql, params)
    }

    fn exec<P>(&self, ctx: &Context, sql: &str, params: P) -> DbResult<usize>
    where
        P: Params,
    {
        let conn = self.acquire(ctx)?;
        exec_on(&conn, ctx, sql, params)
    }
}
