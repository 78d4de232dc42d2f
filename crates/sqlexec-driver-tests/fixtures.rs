//! Test fixtures shared by the end-to-end suites.
//!
//! Every test gets a freshly seeded SQLite database, either file-backed in a
//! temporary directory or in memory, selected with an rstest case:
//!
//! ```rust,ignore
//! use sqlexec_driver_tests::fixtures::{TestStore, test_database};
//! use rstest::rstest;
//!
//! #[rstest]
//! #[case::file(TestStore::File)]
//! #[case::memory(TestStore::Memory)]
//! #[tokio::test]
//! async fn test_something(#[case] store: TestStore) -> anyhow::Result<()> {
//!     let db = test_database(store).await?;
//!     assert_eq!(db.count("SELECT COUNT(*) FROM accounts").await?, 5);
//!     Ok(())
//! }
//! ```

use anyhow::{Context, Result};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use sqlexec_core::{Database, QueryResult, SqlExecError, StatementResult, Transaction};
use sqlexec_driver_sqlite::{SqliteDatabase, SqliteOptions};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tempfile::TempDir;
use tokio::time::Instant;

/// Schema and seed data loaded into every test database
pub const SEED_SQL: &str = indoc::indoc! {"
    CREATE TABLE accounts (
        id INTEGER PRIMARY KEY,
        owner TEXT NOT NULL,
        balance INTEGER NOT NULL CHECK (balance >= 0)
    );
    CREATE TABLE audit_log (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        account_id INTEGER NOT NULL,
        note TEXT NOT NULL
    );
    INSERT INTO accounts (id, owner, balance) VALUES
        (1, 'ana', 100),
        (2, 'bo', 100),
        (3, 'cy', 100),
        (4, 'dee', 100),
        (5, 'eli', 100);
"};

/// Where the test database lives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestStore {
    /// SQLite file in a temporary directory; one connection per transaction
    File,
    /// `:memory:` database; transactions take turns on a single connection
    Memory,
}

/// A seeded database, removed when dropped
pub struct TestDatabase {
    /// The database under test
    pub database: Arc<SqliteDatabase>,
    _dir: Option<TempDir>,
}

impl TestDatabase {
    /// The database as the capability trait the executor consumes
    pub fn shared(&self) -> Arc<dyn Database> {
        self.database.clone()
    }

    /// Run a single-value query such as `SELECT COUNT(*) ...`
    pub async fn count(&self, sql: &str) -> Result<i64> {
        let result = self.database.query(sql).await?;
        result
            .rows
            .first()
            .and_then(|row| row.get(0))
            .and_then(|value| value.as_i64())
            .with_context(|| format!("no integer result for: {}", sql))
    }

    /// Balance of one account
    pub async fn balance(&self, id: i64) -> Result<i64> {
        self.count(&format!("SELECT balance FROM accounts WHERE id = {}", id))
            .await
    }
}

/// Create and seed a database for `store`
pub async fn test_database(store: TestStore) -> Result<TestDatabase> {
    test_database_with_options(store, SqliteOptions::default()).await
}

/// Create and seed a database for `store` with custom driver options
pub async fn test_database_with_options(
    store: TestStore,
    options: SqliteOptions,
) -> Result<TestDatabase> {
    init_tracing();

    let (database, dir) = match store {
        TestStore::File => {
            let dir = tempfile::tempdir().context("failed to create temp dir")?;
            let path = dir.path().join("sqlexec-test.db");
            let path = path.to_str().context("temp path is not UTF-8")?;
            (SqliteDatabase::open_with_options(path, options)?, Some(dir))
        }
        TestStore::Memory => (SqliteDatabase::open_with_options(":memory:", options)?, None),
    };
    database
        .execute_batch(SEED_SQL)
        .await
        .context("failed to seed test database")?;

    Ok(TestDatabase {
        database: Arc::new(database),
        _dir: dir,
    })
}

static TRACING: Lazy<()> = Lazy::new(|| {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
});

/// Install a test log subscriber once per process; honors `RUST_LOG`
pub fn init_tracing() {
    Lazy::force(&TRACING);
}

/// Wraps a real database and fails the first few transaction opens
pub struct FlakyDatabase {
    inner: Arc<dyn Database>,
    open_failures: AtomicU32,
    open_attempts: AtomicU32,
}

impl FlakyDatabase {
    /// Fail the next `open_failures` calls to `begin_transaction`
    pub fn new(inner: Arc<dyn Database>, open_failures: u32) -> Self {
        Self {
            inner,
            open_failures: AtomicU32::new(open_failures),
            open_attempts: AtomicU32::new(0),
        }
    }

    /// Number of `begin_transaction` calls so far
    pub fn open_attempts(&self) -> u32 {
        self.open_attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Database for FlakyDatabase {
    fn driver_name(&self) -> &str {
        self.inner.driver_name()
    }

    async fn begin_transaction(&self, deadline: Instant) -> sqlexec_core::Result<Box<dyn Transaction>> {
        self.open_attempts.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .open_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(SqlExecError::Connection("database is restarting".into()));
        }
        self.inner.begin_transaction(deadline).await
    }

    async fn execute(&self, sql: &str) -> sqlexec_core::Result<StatementResult> {
        self.inner.execute(sql).await
    }

    async fn query(&self, sql: &str) -> sqlexec_core::Result<QueryResult> {
        self.inner.query(sql).await
    }
}

/// Short busy timeout so lock contention surfaces quickly
pub fn impatient_options() -> SqliteOptions {
    SqliteOptions {
        busy_timeout: Duration::from_millis(50),
    }
}
