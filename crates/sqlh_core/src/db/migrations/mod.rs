//! SQLite migration registry and executor.
//!
//! # Responsibility
//! - Register schema migrations, each with `up` and `down` SQL, in order.
//! - Move the schema up or down one migration per transaction.
//!
//! # Invariants
//! - The current version lives in the single row of the `migrations` table;
//!   an empty version means nothing is applied.
//! - A step's SQL and its version update commit together or not at all.
//! - A stored version this binary does not know is an error, never skipped.

use crate::db::context::Context;
use crate::db::helper::Helper;
use crate::db::query::Querier;
use crate::db::tx::Tx;
use crate::db::{DbError, DbResult};
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, Copy)]
struct Migration {
    version: &'static str,
    up: &'static str,
    down: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: "1-jobs",
        up: include_str!("1-jobs.up.sql"),
        down: include_str!("1-jobs.down.sql"),
    },
    Migration {
        version: "2-jobs-priority",
        up: include_str!("2-jobs-priority.up.sql"),
        down: include_str!("2-jobs-priority.down.sql"),
    },
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Up,
    Down,
}

impl Display for Direction {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Up => write!(f, "up"),
            Self::Down => write!(f, "down"),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Step {
    version: &'static str,
    direction: Direction,
}

/// Returns the latest migration version known by this binary.
pub fn latest_version() -> &'static str {
    MIGRATIONS.last().map_or("", |migration| migration.version)
}

/// Returns all known migration versions in apply order.
pub fn versions() -> Vec<&'static str> {
    MIGRATIONS.iter().map(|migration| migration.version).collect()
}

pub fn migrate_up(helper: &Helper, ctx: &Context) -> DbResult<()> {
    migrate_to(helper, ctx, latest_version())
}

pub fn migrate_down(helper: &Helper, ctx: &Context) -> DbResult<()> {
    migrate_to(helper, ctx, "")
}

/// Applies or reverts migrations until `version` is current.
pub fn migrate_to(helper: &Helper, ctx: &Context, version: &str) -> DbResult<()> {
    let target = applied_count(version)?;
    ensure_migrations_table(helper, ctx)?;

    while let Some(step) = helper.in_transaction(ctx, |tx| step_towards(tx, ctx, target))? {
        helper.log().info(format_args!(
            "event=db_migrate module=db status=ok direction={} version={}",
            step.direction, step.version
        ));
    }

    Ok(())
}

/// Reads the current schema version.
pub fn current_version(querier: &impl Querier, ctx: &Context) -> DbResult<String> {
    querier.get(ctx, "select version from migrations", [])
}

fn ensure_migrations_table(helper: &Helper, ctx: &Context) -> DbResult<()> {
    helper.in_transaction(ctx, |tx| {
        tx.exec(
            ctx,
            "create table if not exists migrations (version text not null)",
            [],
        )?;
        let rows: i64 = tx.get(ctx, "select count(*) from migrations", [])?;
        if rows == 0 {
            tx.exec(ctx, "insert into migrations (version) values ('')", [])?;
        }
        Ok(())
    })
}

/// Runs at most one migration towards `target` applied migrations.
///
/// The version is re-read inside the transaction so concurrent migrators
/// never apply the same step twice.
fn step_towards(tx: &Tx<'_>, ctx: &Context, target: usize) -> DbResult<Option<Step>> {
    let current = current_version(tx, ctx)?;
    let applied = applied_count(&current)?;

    if applied < target {
        let migration = &MIGRATIONS[applied];
        run_step(tx, ctx, migration.version, migration.up, migration.version)?;
        return Ok(Some(Step {
            version: migration.version,
            direction: Direction::Up,
        }));
    }

    if applied > target {
        let migration = &MIGRATIONS[applied - 1];
        let previous = applied
            .checked_sub(2)
            .map_or("", |index| MIGRATIONS[index].version);
        run_step(tx, ctx, migration.version, migration.down, previous)?;
        return Ok(Some(Step {
            version: migration.version,
            direction: Direction::Down,
        }));
    }

    Ok(None)
}

fn run_step(
    tx: &Tx<'_>,
    ctx: &Context,
    version: &str,
    sql: &str,
    next_version: &str,
) -> DbResult<()> {
    let result = tx.exec_batch(ctx, sql).and_then(|()| {
        tx.exec(ctx, "update migrations set version = ?1", [next_version])
            .map(|_| ())
    });
    result.map_err(|err| DbError::Migration {
        version: version.to_string(),
        source: Box::new(err),
    })
}

/// Number of migrations applied when `version` is current.
fn applied_count(version: &str) -> DbResult<usize> {
    if version.is_empty() {
        return Ok(0);
    }
    MIGRATIONS
        .iter()
        .position(|migration| migration.version == version)
        .map(|index| index + 1)
        .ok_or_else(|| DbError::UnknownMigration {
            version: version.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::{applied_count, latest_version, versions, MIGRATIONS};
    use crate::db::DbError;
    use std::collections::HashSet;

    #[test]
    fn versions_are_unique_and_non_empty() {
        let all = versions();
        let unique: HashSet<_> = all.iter().collect();
        assert_eq!(unique.len(), all.len());
        assert!(all.iter().all(|version| !version.is_empty()));
        assert_eq!(latest_version(), *all.last().unwrap());
    }

    #[test]
    fn every_migration_can_be_reverted() {
        for migration in MIGRATIONS {
            assert!(!migration.up.trim().is_empty(), "{} has no up", migration.version);
            assert!(!migration.down.trim().is_empty(), "{} has no down", migration.version);
        }
    }

    #[test]
    fn applied_count_maps_versions_to_positions() {
        assert_eq!(applied_count("").unwrap(), 0);
        assert_eq!(applied_count("1-jobs").unwrap(), 1);
        assert_eq!(applied_count(latest_version()).unwrap(), MIGRATIONS.len());

        let err = applied_count("99-future").unwrap_err();
        assert!(matches!(err, DbError::UnknownMigration { version } if version == "99-future"));
    }
}
