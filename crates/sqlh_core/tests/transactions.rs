use sqlh_core::{Context, DbError, Helper, HelperOptions, Querier};
use sqlh_testkit::TestDb;
use std::thread;
use std::time::Duration;

fn db_with_table() -> TestDb {
    let db = TestDb::new();
    db.exec(&Context::background(), "create table t (v integer not null)", [])
        .unwrap();
    db
}

fn values(db: &TestDb) -> Vec<i64> {
    db.select(&Context::background(), "select v from t order by v", [])
        .unwrap()
}

#[test]
fn committed_writes_are_visible_outside_the_transaction() {
    let db = db_with_table();
    let ctx = Context::background();

    db.in_transaction(&ctx, |tx| {
        tx.exec(&ctx, "insert into t values (1)", [])?;
        Ok(())
    })
    .unwrap();

    assert_eq!(values(&db), vec![1]);
}

#[test]
fn failed_unit_of_work_is_rolled_back() {
    let db = db_with_table();
    let ctx = Context::background();

    let err = db
        .in_transaction(&ctx, |tx| {
            tx.exec(&ctx, "insert into t values (1)", [])?;
            Err::<(), _>(DbError::msg("oh no"))
        })
        .unwrap_err();

    assert_eq!(err.to_string(), "oh no");
    assert!(values(&db).is_empty());
}

#[test]
fn callback_error_is_returned_unchanged() {
    #[derive(Debug)]
    struct QuotaExceeded;

    impl std::fmt::Display for QuotaExceeded {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "quota exceeded")
        }
    }

    impl std::error::Error for QuotaExceeded {}

    let db = db_with_table();
    let ctx = Context::background();

    let err = db
        .in_transaction(&ctx, |_tx| Err::<(), _>(DbError::callback(QuotaExceeded)))
        .unwrap_err();

    match err {
        DbError::Callback(inner) => assert!(inner.downcast_ref::<QuotaExceeded>().is_some()),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn panicking_unit_of_work_is_rolled_back_and_reported() {
    let db = db_with_table();
    let ctx = Context::background();

    let err = db
        .in_transaction::<(), _>(&ctx, |tx| {
            tx.exec(&ctx, "insert into t values (1)", [])?;
            panic!("unexpected state")
        })
        .unwrap_err();

    assert!(matches!(&err, DbError::Panic(message) if message == "unexpected state"));
    assert!(err.to_string().starts_with("panic:"));
    assert!(values(&db).is_empty());

    // The connection went back to the pool without an open transaction.
    db.in_transaction(&ctx, |tx| tx.exec(&ctx, "insert into t values (2)", []))
        .unwrap();
    assert_eq!(values(&db), vec![2]);
}

#[test]
fn failing_statement_inside_transaction_rolls_back_earlier_writes() {
    let db = db_with_table();
    let ctx = Context::background();

    let err = db
        .in_transaction(&ctx, |tx| {
            tx.exec(&ctx, "insert into t values (1)", [])?;
            tx.exec(&ctx, "insert into t values (null)", [])?;
            Ok(())
        })
        .unwrap_err();

    assert!(matches!(err, DbError::Sqlite(_)));
    assert!(values(&db).is_empty());
}

#[test]
fn in_transaction_returns_callback_value() {
    let db = db_with_table();
    let ctx = Context::background();

    let total: i64 = db
        .in_transaction(&ctx, |tx| {
            tx.exec(&ctx, "insert into t values (?1), (?2)", [20, 22])?;
            tx.get(&ctx, "select sum(v) from t", [])
        })
        .unwrap();

    assert_eq!(total, 42);
}

#[test]
fn writes_are_invisible_to_other_connections_until_commit() {
    let db = db_with_table();
    let ctx = Context::background();

    db.in_transaction(&ctx, |tx| {
        tx.exec(&ctx, "insert into t values (1)", [])?;
        let inside: i64 = tx.get(&ctx, "select count(*) from t", [])?;
        let outside: i64 = db.get(&ctx, "select count(*) from t", [])?;
        assert_eq!(inside, 1);
        assert_eq!(outside, 0);
        Ok(())
    })
    .unwrap();

    assert_eq!(values(&db), vec![1]);
}

#[test]
fn cancellation_mid_transaction_rolls_back() {
    let db = db_with_table();
    let ctx = Context::background();

    let err = db
        .in_transaction(&ctx, |tx| {
            tx.exec(&ctx, "insert into t values (1)", [])?;
            ctx.cancel();
            tx.exec(&ctx, "insert into t values (2)", [])?;
            Ok(())
        })
        .unwrap_err();

    assert!(matches!(err, DbError::Cancelled));
    assert!(values(&db).is_empty());
}

#[test]
fn deadline_interrupting_a_write_reports_the_deadline() {
    let db = db_with_table();
    let ctx = Context::background().with_timeout(Duration::from_millis(100));

    let err = db
        .in_transaction(&ctx, |tx| {
            tx.exec(&ctx, "insert into t values (1)", [])?;
            tx.exec(
                &ctx,
                "insert into t
                 with recursive c(x) as (select 1 union all select x + 1 from c where x < 100000000)
                 select x from c",
                [],
            )?;
            Ok(())
        })
        .unwrap_err();

    assert!(matches!(err, DbError::DeadlineExceeded), "unexpected error: {err:?}");
    assert!(err.is_context());
    assert!(values(&db).is_empty());

    db.ping(&Context::background()).unwrap();
}

#[test]
fn commit_failure_is_reported_and_nothing_is_kept() {
    let db = TestDb::new();
    let ctx = Context::background();
    db.exec(&ctx, "create table p (id integer primary key)", [])
        .unwrap();
    db.exec(
        &ctx,
        "create table c (pid integer references p (id) deferrable initially deferred)",
        [],
    )
    .unwrap();

    let err = db
        .in_transaction(&ctx, |tx| {
            tx.exec(&ctx, "insert into c (pid) values (42)", [])?;
            Ok(())
        })
        .unwrap_err();

    assert!(matches!(err, DbError::Commit(_)), "unexpected error: {err:?}");
    let orphans: i64 = db.get(&ctx, "select count(*) from c", []).unwrap();
    assert_eq!(orphans, 0);

    for _ in 0..12 {
        db.ping(&ctx).unwrap();
    }
}

#[test]
fn begin_failure_when_the_write_lock_is_held_past_the_busy_timeout() {
    let db = db_with_table();
    let holder = rusqlite::Connection::open(db.path()).unwrap();
    holder.execute_batch("begin immediate").unwrap();
    let ctx = Context::background();
    let mut called = false;

    let err = db
        .in_transaction(&ctx, |_tx| {
            called = true;
            Ok(())
        })
        .unwrap_err();

    assert!(matches!(err, DbError::Begin(_)), "unexpected error: {err:?}");
    assert!(err.to_string().starts_with("error beginning transaction"));
    assert!(!called);

    holder.execute_batch("rollback").unwrap();
    db.ping(&ctx).unwrap();
}

#[test]
fn concurrent_writers_wait_on_each_other_instead_of_failing() {
    let db = db_with_table();
    let db = &db;

    let results: Vec<_> = thread::scope(|scope| {
        let handles: Vec<_> = (1..=4_i64)
            .map(|value| {
                scope.spawn(move || {
                    let ctx = Context::background();
                    db.in_transaction(&ctx, |tx| {
                        tx.exec(&ctx, "insert into t values (?1)", [value])?;
                        thread::sleep(Duration::from_millis(100));
                        Ok(())
                    })
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .collect()
    });

    for result in results {
        result.unwrap();
    }
    assert_eq!(values(db), vec![1, 2, 3, 4]);
}

#[test]
fn ping_succeeds_on_connected_helper() {
    let db = TestDb::new();
    db.ping(&Context::background()).unwrap();
}

#[test]
fn ping_on_unreachable_database_is_a_connection_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("missing").join("app.db");
    let mut helper = Helper::new(
        HelperOptions::new(&path).with_connect_timeout(Duration::from_millis(200)),
    );

    let err = helper.connect().unwrap_err();
    assert!(matches!(err, DbError::Connect { .. }));
    assert!(err.is_connection());
    assert!(err.to_string().contains("_journal=WAL"));

    let err = helper.ping(&Context::background()).unwrap_err();
    assert!(err.is_connection());
}
