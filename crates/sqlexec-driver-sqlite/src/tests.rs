use crate::{SqliteDatabase, SqliteOptions};
use sqlexec_core::{Database, RowsAffected, SqlExecError, Value};
use std::time::Duration;
use tempfile::TempDir;
use tokio::time::Instant;

async fn file_database() -> (TempDir, SqliteDatabase) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("driver.db");
    let db = SqliteDatabase::open(path.to_str().unwrap()).unwrap();
    db.execute_batch(
        "CREATE TABLE accounts (id INTEGER PRIMARY KEY, owner TEXT NOT NULL, balance INTEGER NOT NULL);
         INSERT INTO accounts (id, owner, balance) VALUES (1, 'ana', 100), (2, 'bo', 50);",
    )
    .await
    .unwrap();
    (dir, db)
}

fn deadline() -> Instant {
    Instant::now() + Duration::from_secs(10)
}

async fn balance(db: &SqliteDatabase, id: i64) -> Option<i64> {
    let result = db
        .query(&format!("SELECT balance FROM accounts WHERE id = {}", id))
        .await
        .unwrap();
    result.rows.first().and_then(|row| row.get(0)).and_then(Value::as_i64)
}

mod transaction_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_commit_makes_changes_visible() {
        let (_dir, db) = file_database().await;

        let tx = db.begin_transaction(deadline()).await.unwrap();
        let result = tx
            .execute("UPDATE accounts SET balance = balance - 10 WHERE id = 1")
            .await
            .unwrap();
        assert_eq!(result.rows_affected, RowsAffected::Count(1));
        tx.commit().await.unwrap();

        assert_eq!(balance(&db, 1).await, Some(90));
    }

    #[tokio::test]
    async fn test_rollback_discards_changes() {
        let (_dir, db) = file_database().await;

        let tx = db.begin_transaction(deadline()).await.unwrap();
        tx.execute("DELETE FROM accounts WHERE id = 2").await.unwrap();
        tx.rollback().await.unwrap();

        assert_eq!(balance(&db, 2).await, Some(50));
    }

    #[tokio::test]
    async fn test_dropped_transaction_is_rolled_back() {
        let (_dir, db) = file_database().await;

        {
            let tx = db.begin_transaction(deadline()).await.unwrap();
            tx.execute("DELETE FROM accounts").await.unwrap();
        }

        assert_eq!(balance(&db, 1).await, Some(100));
    }

    #[tokio::test]
    async fn test_statement_matching_no_rows_reports_zero() {
        let (_dir, db) = file_database().await;

        let tx = db.begin_transaction(deadline()).await.unwrap();
        let result = tx
            .execute("DELETE FROM accounts WHERE id = 99")
            .await
            .unwrap();
        tx.commit().await.unwrap();

        assert_eq!(result.rows_affected, RowsAffected::Count(0));
    }

    #[tokio::test]
    async fn test_statement_returning_rows_has_no_count() {
        let (_dir, db) = file_database().await;

        let tx = db.begin_transaction(deadline()).await.unwrap();
        let result = tx.execute("SELECT * FROM accounts").await.unwrap();
        tx.rollback().await.unwrap();

        assert!(matches!(result.rows_affected, RowsAffected::Unavailable(_)));
        assert_eq!(result.rows_affected.count(), 0);
    }

    #[tokio::test]
    async fn test_invalid_statement_is_a_query_error() {
        let (_dir, db) = file_database().await;

        let tx = db.begin_transaction(deadline()).await.unwrap();
        let err = tx
            .execute("UPDATE missing_table SET x = 1")
            .await
            .unwrap_err();
        tx.rollback().await.unwrap();

        assert!(matches!(err, SqlExecError::Query(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn test_begin_after_deadline_times_out() {
        let (_dir, db) = file_database().await;

        let err = match db.begin_transaction(Instant::now()).await {
            Ok(_) => panic!("expected the elapsed deadline to fail BEGIN"),
            Err(e) => e,
        };

        assert!(err.is_timeout());
    }

    #[tokio::test]
    async fn test_query_inside_transaction_sees_own_writes() {
        let (_dir, db) = file_database().await;

        let tx = db.begin_transaction(deadline()).await.unwrap();
        tx.execute("INSERT INTO accounts (id, owner, balance) VALUES (3, 'cy', 7)")
            .await
            .unwrap();
        let result = tx
            .query("SELECT owner FROM accounts WHERE id = 3")
            .await
            .unwrap();
        tx.rollback().await.unwrap();

        assert_eq!(result.row_count(), 1);
        assert_eq!(balance(&db, 3).await, None);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_transactions_use_separate_connections() {
        let (_dir, db) = file_database().await;
        let db = std::sync::Arc::new(db);

        let mut handles = Vec::new();
        for id in 10..20 {
            let db = db.clone();
            handles.push(tokio::spawn(async move {
                let tx = db.begin_transaction(deadline()).await?;
                tx.execute(&format!(
                    "INSERT INTO accounts (id, owner, balance) VALUES ({}, 'worker', {})",
                    id, id
                ))
                .await?;
                tx.commit().await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let result = db
            .query("SELECT COUNT(*) AS n FROM accounts WHERE owner = 'worker'")
            .await
            .unwrap();
        assert_eq!(result.rows[0].get_by_name("n"), Some(&Value::Int64(10)));
    }
}

mod memory_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_in_memory_transactions_take_turns() {
        let db = SqliteDatabase::open(":memory:").unwrap();
        db.execute_batch("CREATE TABLE t (v INTEGER)").await.unwrap();

        let first = db.begin_transaction(deadline()).await.unwrap();
        first.execute("INSERT INTO t VALUES (1)").await.unwrap();

        // The single connection is held by `first`
        let blocked = db
            .begin_transaction(Instant::now() + Duration::from_millis(50))
            .await;
        assert!(matches!(blocked, Err(SqlExecError::Timeout(_))));

        first.commit().await.unwrap();

        let second = db.begin_transaction(deadline()).await.unwrap();
        second.execute("INSERT INTO t VALUES (2)").await.unwrap();
        second.commit().await.unwrap();

        let result = db.query("SELECT v FROM t ORDER BY v").await.unwrap();
        assert_eq!(result.row_count(), 2);
    }

    #[test]
    fn test_begin_queued_past_its_deadline_never_runs() {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .max_blocking_threads(1)
            .build()
            .unwrap();

        runtime.block_on(async {
            let db = SqliteDatabase::open(":memory:").unwrap();
            db.execute_batch("CREATE TABLE t (v INTEGER)").await.unwrap();

            // Occupy the only blocking thread well past the first deadline
            let busy = tokio::task::spawn_blocking(|| std::thread::sleep(Duration::from_millis(300)));
            let late = db
                .begin_transaction(Instant::now() + Duration::from_millis(50))
                .await;
            assert!(matches!(late, Err(SqlExecError::Timeout(_))));
            busy.await.unwrap();

            for v in 1..=2 {
                let tx = db.begin_transaction(deadline()).await.unwrap();
                tx.execute(&format!("INSERT INTO t VALUES ({})", v)).await.unwrap();
                tx.commit().await.unwrap();
            }

            let result = db.query("SELECT v FROM t").await.unwrap();
            assert_eq!(result.row_count(), 2);
        });
    }

    #[tokio::test]
    async fn test_dropped_transaction_releases_connection_after_rollback() {
        let db = SqliteDatabase::open(":memory:").unwrap();
        db.execute_batch("CREATE TABLE t (v INTEGER); INSERT INTO t VALUES (1);")
            .await
            .unwrap();

        {
            let tx = db.begin_transaction(deadline()).await.unwrap();
            tx.execute("DELETE FROM t").await.unwrap();
        }

        let tx = db.begin_transaction(deadline()).await.unwrap();
        tx.execute("INSERT INTO t VALUES (2)").await.unwrap();
        tx.commit().await.unwrap();

        let result = db.query("SELECT v FROM t ORDER BY v").await.unwrap();
        assert_eq!(result.row_count(), 2);
    }

    #[tokio::test]
    async fn test_raw_execute_reports_count() {
        let db = SqliteDatabase::open(":memory:").unwrap();
        db.execute_batch("CREATE TABLE t (v INTEGER); INSERT INTO t VALUES (1), (2), (3);")
            .await
            .unwrap();

        let result = db.execute("DELETE FROM t WHERE v > 1").await.unwrap();

        assert_eq!(result.rows_affected.count(), 2);
        assert_eq!(db.driver_name(), "sqlite");
    }
}

mod open_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_open_fails_for_missing_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("db.sqlite");

        let result = SqliteDatabase::open_with_options(
            path.to_str().unwrap(),
            SqliteOptions {
                busy_timeout: Duration::from_millis(100),
            },
        );

        assert!(matches!(result, Err(SqlExecError::Connection(_))));
    }

    #[test]
    fn test_expand_path_makes_relative_paths_absolute() {
        let expanded = SqliteDatabase::expand_path("data/app.db").unwrap();
        assert!(std::path::Path::new(&expanded).is_absolute());
        assert!(expanded.ends_with("app.db"));

        assert_eq!(
            SqliteDatabase::expand_path("file:test.db?mode=memory").unwrap(),
            "file:test.db?mode=memory"
        );
        assert!(SqliteDatabase::expand_path("~other/db").is_err());
    }
}
