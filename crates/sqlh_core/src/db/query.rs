//! The `select` / `get` / `exec` query surface.
//!
//! # Responsibility
//! - Run single statements with positional parameters bound by SQLite.
//! - Enforce the caller's [`Context`] before and while a statement runs.
//!
//! # Invariants
//! - `get` on an empty result returns [`DbError::NoRows`].
//! - A statement interrupted because its context finished reports
//!   [`DbError::Cancelled`] or [`DeadlineExceeded`](DbError::DeadlineExceeded).
//! - No progress handler stays installed on a connection after a call returns
//!   or unwinds.

use super::context::Context;
use super::row::FromRow;
use super::{DbError, DbResult};
use rusqlite::ffi::ErrorCode;
use rusqlite::{Connection, Params};

/// Number of SQLite VM instructions between context checks.
const PROGRESS_CHECK_OPS: i32 = 1000;

/// Read/write primitives shared by [`Helper`](super::Helper) and
/// [`Tx`](super::Tx).
///
/// On a helper each call runs on its own pooled connection in autocommit
/// mode. On a transaction scope calls run inside the transaction and are only
/// visible to other connections after commit.
pub trait Querier {
    /// Fetches every row of the result.
    fn select<T, P>(&self, ctx: &Context, sql: &str, params: P) -> DbResult<Vec<T>>
    where
        T: FromRow,
        P: Params;

    /// Fetches the first row of the result, or [`DbError::NoRows`].
    fn get<T, P>(&self, ctx: &Context, sql: &str, params: P) -> DbResult<T>
    where
        T: FromRow,
        P: Params;

    /// Runs a statement and returns the number of changed rows.
    ///
    /// Statements that produce rows are stepped to completion and report 0.
    fn exec<P>(&self, ctx: &Context, sql: &str, params: P) -> DbResult<usize>
    where
        P: Params;
}

pub(crate) fn select_on<T, P>(
    conn: &Connection,
    ctx: &Context,
    sql: &str,
    params: P,
) -> DbResult<Vec<T>>
where
    T: FromRow,
    P: Params,
{
    with_context(conn, ctx, || {
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(params, |row| T::from_row(row))?;
        rows.collect()
    })
}

pub(crate) fn get_on<T, P>(conn: &Connection, ctx: &Context, sql: &str, params: P) -> DbResult<T>
where
    T: FromRow,
    P: Params,
{
    with_context(conn, ctx, || {
        let mut stmt = conn.prepare(sql)?;
        stmt.query_row(params, |row| T::from_row(row))
    })
}

pub(crate) fn exec_on<P>(conn: &Connection, ctx: &Context, sql: &str, params: P) -> DbResult<usize>
where
    P: Params,
{
    with_context(conn, ctx, || {
        let mut stmt = conn.prepare(sql)?;
        if stmt.column_count() == 0 {
            return stmt.execute(params);
        }
        let mut rows = stmt.query(params)?;
        while rows.next()?.is_some() {}
        Ok(0)
    })
}

pub(crate) fn exec_batch_on(conn: &Connection, ctx: &Context, sql: &str) -> DbResult<()> {
    with_context(conn, ctx, || conn.execute_batch(sql))
}

/// Runs `op` with the context watched by a progress handler.
fn with_context<R>(
    conn: &Connection,
    ctx: &Context,
    op: impl FnOnce() -> rusqlite::Result<R>,
) -> DbResult<R> {
    ctx.check()?;
    let _guard = InterruptGuard::install(conn, ctx);
    op().map_err(|err| statement_error(err, ctx))
}

fn statement_error(err: rusqlite::Error, ctx: &Context) -> DbError {
    if err.sqlite_error_code() == Some(ErrorCode::OperationInterrupted) {
        if let Some(ctx_err) = ctx.err() {
            return ctx_err;
        }
    }
    DbError::from(err)
}

struct InterruptGuard<'conn> {
    conn: &'conn Connection,
}

impl<'conn> InterruptGuard<'conn> {
    fn install(conn: &'conn Connection, ctx: &Context) -> Self {
        let watched = ctx.clone();
        conn.progress_handler(PROGRESS_CHECK_OPS, Some(move || watched.is_done()));
        Self { conn }
    }
}

impl Drop for InterruptGuard<'_> {
    fn drop(&mut self) {
        self.conn.progress_handler(0, None::<fn() -> bool>);
    }
}
