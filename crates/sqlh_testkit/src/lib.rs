//! Test helpers for code built on `sqlh_core`.
//!
//! [`TestDb`] gives every test its own database file in a temporary
//! directory, connected and migrated, with helper logs printed into the
//! test's captured output.
//!
//! ```ignore
//! use sqlh_core::{Context, Querier};
//! use sqlh_testkit::TestDb;
//!
//! #[test]
//! fn counts_jobs() {
//!     let db = TestDb::new();
//!     let count: i64 = db.get(&Context::background(), "select count(*) from goqite", []).unwrap();
//!     assert_eq!(count, 0);
//! }
//! ```

use log::{Log, Metadata, Record};
use sqlh_core::{Context, Helper, HelperOptions, LogSink};
use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

const DB_FILE_NAME: &str = "test.db";

/// Prints log records so the test harness captures them per test.
#[derive(Debug, Default)]
pub struct TestLog;

impl Log for TestLog {
    fn enabled(&self, _metadata: &Metadata<'_>) -> bool {
        true
    }

    fn log(&self, record: &Record<'_>) {
        println!("{} [{}] {}", record.level(), record.target(), record.args());
    }

    fn flush(&self) {}
}

/// A connected, migrated helper over a disposable database.
///
/// The database directory is removed when the value is dropped.
pub struct TestDb {
    helper: Helper,
    dir: TempDir,
}

impl TestDb {
    /// Connects and applies all migrations.
    ///
    /// # Panics
    /// Panics when the database cannot be created, connected or migrated.
    pub fn new() -> Self {
        let db = Self::unmigrated();
        db.helper
            .migrate_up(&Context::background())
            .expect("test database migrations should apply");
        db
    }

    /// Connects without applying migrations.
    ///
    /// # Panics
    /// Panics when the database cannot be created or connected.
    pub fn unmigrated() -> Self {
        let dir = tempfile::tempdir().expect("temp dir should be created");
        let options = HelperOptions::new(dir.path().join(DB_FILE_NAME)).with_log(test_log());
        let mut helper = Helper::new(options);
        helper.connect().expect("test database should connect");
        Self { helper, dir }
    }

    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    pub fn path(&self) -> PathBuf {
        self.dir.path().join(DB_FILE_NAME)
    }

    pub fn helper(&self) -> &Helper {
        &self.helper
    }
}

impl Default for TestDb {
    fn default() -> Self {
        Self::new()
    }
}

impl Deref for TestDb {
    type Target = Helper;

    fn deref(&self) -> &Self::Target {
        &self.helper
    }
}

impl DerefMut for TestDb {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.helper
    }
}

/// A log sink that prints into the running test's output.
pub fn test_log() -> LogSink {
    LogSink::new(Arc::new(TestLog))
}

#[cfg(test)]
mod tests {
    use super::TestDb;
    use sqlh_core::{current_version, latest_version, Context, Querier};

    #[test]
    fn new_database_is_connected_and_migrated() {
        let db = TestDb::new();
        let ctx = Context::background();

        assert!(db.is_connected());
        assert!(db.path().exists());
        assert_eq!(current_version(db.helper(), &ctx).unwrap(), latest_version());
    }

    #[test]
    fn databases_are_isolated() {
        let first = TestDb::new();
        let second = TestDb::new();
        let ctx = Context::background();

        first.exec(&ctx, "create table t (v integer)", []).unwrap();
        let err = second.select::<i64, _>(&ctx, "select v from t", []).unwrap_err();
        assert!(err.to_string().contains("no such table"));
    }
}
