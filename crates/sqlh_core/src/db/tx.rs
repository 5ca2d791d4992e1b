//! Transaction scopes and the commit/rollback lifecycle.
//!
//! # Responsibility
//! - Begin a transaction, run a unit of work in it, then commit or roll back.
//! - Turn a panicking unit of work into an ordinary failure.
//!
//! # Invariants
//! - The `rusqlite::Transaction` is consumed exactly once, by `commit` or
//!   `rollback`, on every path out of [`run_in_transaction`]. A transaction
//!   SQLite already ended on its own is released without a `ROLLBACK`.
//! - A rollback failure is reported together with the failure that caused it.
//! - A unit of work that succeeds after its context finished is rolled back.

use super::context::Context;
use super::query::{exec_batch_on, exec_on, get_on, select_on, Querier};
use super::row::FromRow;
use super::{DbError, DbResult};
use crate::logging::{panic_payload_summary, LogSink};
use rusqlite::{Connection, Params, Transaction, TransactionBehavior};
use std::panic::{self, AssertUnwindSafe};

/// Handle over one in-flight transaction.
///
/// Only ever lent to a unit of work by reference; it cannot outlive the
/// callback that received it.
pub struct Tx<'conn> {
    tx: Transaction<'conn>,
}

impl Tx<'_> {
    /// Runs several `;`-separated statements inside the transaction.
    pub(crate) fn exec_batch(&self, ctx: &Context, sql: &str) -> DbResult<()> {
        exec_batch_on(&self.tx, ctx, sql)
    }
}

impl Querier for Tx<'_> {
    fn select<T, P>(&self, ctx: &Context, sql: &str, params: P) -> DbResult<Vec<T>>
    where
        T: FromRow,
        P: Params,
    {
        select_on(&self.tx, ctx, sql, params)
    }

    fn get<T, P>(&self, ctx: &Context, sql: &str, params: P) -> DbResult<T>
    where
        T: FromRow,
        P: Params,
    {
        get_on(&self.tx, ctx, sql, params)
    }

    fn exec<P>(&self, ctx: &Context, sql: &str, params: P) -> DbResult<usize>
    where
        P: Params,
    {
        exec_on(&self.tx, ctx, sql, params)
    }
}

/// Runs `callback` inside a transaction on `conn`.
///
/// SQLite transactions are serializable. The transaction takes the write lock
/// up front (`BEGIN IMMEDIATE`), so a competing writer waits out the busy
/// timeout at begin instead of failing on lock upgrade mid-transaction.
pub(crate) fn run_in_transaction<T, F>(
    conn: &mut Connection,
    ctx: &Context,
    log: &LogSink,
    callback: F,
) -> DbResult<T>
where
    F: FnOnce(&Tx<'_>) -> DbResult<T>,
{
    ctx.check()?;
    let tx = conn
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .map_err(DbError::Begin)?;

    let scope = Tx { tx };
    let outcome = match panic::catch_unwind(AssertUnwindSafe(|| callback(&scope))) {
        Ok(result) => result,
        Err(payload) => {
            let message = panic_payload_summary(payload.as_ref());
            log.error(format_args!(
                "event=tx_panic module=db status=error payload={message}"
            ));
            Err(DbError::Panic(message))
        }
    };
    let Tx { tx } = scope;

    let value = match outcome {
        Ok(value) => value,
        Err(err) => return rollback(tx, log, err),
    };
    if let Some(err) = ctx.err() {
        return rollback(tx, log, err);
    }

    tx.commit().map_err(DbError::Commit)?;
    Ok(value)
}

/// Rolls back `tx` after `err`, keeping both errors if the rollback fails.
///
/// An interrupted write or an `OR ROLLBACK` conflict makes SQLite end the
/// transaction itself; then there is nothing left to roll back.
fn rollback<T>(tx: Transaction<'_>, log: &LogSink, err: DbError) -> DbResult<T> {
    if tx.is_autocommit() {
        log.debug(format_args!(
            "event=tx_rollback module=db status=skipped reason={err}"
        ));
        return Err(err);
    }

    match tx.rollback() {
        Ok(()) => {
            log.debug(format_args!(
                "event=tx_rollback module=db status=ok reason={err}"
            ));
            Err(err)
        }
        Err(rollback) => {
            log.error(format_args!(
                "event=tx_rollback module=db status=error error={rollback} reason={err}"
            ));
            Err(DbError::Rollback {
                rollback,
                original: Box::new(err),
            })
        }
    }
}
