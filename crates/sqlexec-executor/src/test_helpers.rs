//! Test doubles implementing the database capability traits

use async_trait::async_trait;
use parking_lot::Mutex;
use sqlexec_core::{
    Database, QueryResult, Result, Row, SqlExecError, StatementResult, Transaction, Value,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio::time::Instant;

/// Counter that fails the first `n` calls
pub(crate) struct FailureCounter {
    remaining: AtomicU32,
}

impl FailureCounter {
    fn new(failures: u32) -> Self {
        Self {
            remaining: AtomicU32::new(failures),
        }
    }

    fn should_fail(&self) -> bool {
        self.remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[derive(Default)]
pub(crate) struct MockState {
    pub open_attempts: AtomicU32,
    pub commits: AtomicU32,
    pub rollbacks: AtomicU32,
    pub query_attempts: AtomicU32,
    pub executed: Mutex<Vec<String>>,
}

/// Scriptable in-process database
pub(crate) struct MockDatabase {
    state: Arc<MockState>,
    open_failures: FailureCounter,
    query_failures: FailureCounter,
    failing_sql: Option<String>,
    unavailable_sql: Option<String>,
    rollback_fails: bool,
    commit_fails: bool,
    panic_on_sql: Option<String>,
    statement_delay: Option<Duration>,
}

impl MockDatabase {
    pub fn new() -> Self {
        Self {
            state: Arc::new(MockState::default()),
            open_failures: FailureCounter::new(0),
            query_failures: FailureCounter::new(0),
            failing_sql: None,
            unavailable_sql: None,
            rollback_fails: false,
            commit_fails: false,
            panic_on_sql: None,
            statement_delay: None,
        }
    }

    /// The first `n` BEGINs fail with a connection error
    pub fn with_open_failures(mut self, n: u32) -> Self {
        self.open_failures = FailureCounter::new(n);
        self
    }

    /// The first `n` raw queries fail
    pub fn with_query_failures(mut self, n: u32) -> Self {
        self.query_failures = FailureCounter::new(n);
        self
    }

    /// Statements with exactly this SQL fail
    pub fn with_failing_sql(mut self, sql: &str) -> Self {
        self.failing_sql = Some(sql.to_string());
        self
    }

    /// Statements with exactly this SQL cannot report a row count
    pub fn with_unavailable_count(mut self, sql: &str) -> Self {
        self.unavailable_sql = Some(sql.to_string());
        self
    }

    pub fn with_rollback_failure(mut self) -> Self {
        self.rollback_fails = true;
        self
    }

    pub fn with_commit_failure(mut self) -> Self {
        self.commit_fails = true;
        self
    }

    /// Executing exactly this SQL panics the calling task
    pub fn with_panic_on_sql(mut self, sql: &str) -> Self {
        self.panic_on_sql = Some(sql.to_string());
        self
    }

    /// Every statement takes this long
    pub fn with_statement_delay(mut self, delay: Duration) -> Self {
        self.statement_delay = Some(delay);
        self
    }

    pub fn into_shared(self) -> (Arc<dyn Database>, Arc<MockState>) {
        let state = self.state.clone();
        (Arc::new(self), state)
    }
}

struct MockTransaction {
    state: Arc<MockState>,
    failing_sql: Option<String>,
    unavailable_sql: Option<String>,
    panic_on_sql: Option<String>,
    rollback_fails: bool,
    commit_fails: bool,
    statement_delay: Option<Duration>,
}

#[async_trait]
impl Database for MockDatabase {
    fn driver_name(&self) -> &str {
        "mock"
    }

    async fn begin_transaction(&self, _deadline: Instant) -> Result<Box<dyn Transaction>> {
        self.state.open_attempts.fetch_add(1, Ordering::SeqCst);
        if self.open_failures.should_fail() {
            return Err(SqlExecError::Connection("mock open failure".into()));
        }
        Ok(Box::new(MockTransaction {
            state: self.state.clone(),
            failing_sql: self.failing_sql.clone(),
            unavailable_sql: self.unavailable_sql.clone(),
            panic_on_sql: self.panic_on_sql.clone(),
            rollback_fails: self.rollback_fails,
            commit_fails: self.commit_fails,
            statement_delay: self.statement_delay,
        }))
    }

    async fn execute(&self, _sql: &str) -> Result<StatementResult> {
        Err(SqlExecError::NotSupported(
            "raw statements are not supported by the mock".into(),
        ))
    }

    async fn query(&self, _sql: &str) -> Result<QueryResult> {
        self.state.query_attempts.fetch_add(1, Ordering::SeqCst);
        if self.query_failures.should_fail() {
            return Err(SqlExecError::Connection("mock query failure".into()));
        }
        let columns = vec!["id".to_string(), "name".to_string()];
        Ok(QueryResult {
            rows: vec![
                Row::new(
                    columns.clone(),
                    vec![Value::Int64(1), Value::String("ana".into())],
                ),
                Row::new(
                    columns.clone(),
                    vec![Value::Int64(2), Value::String("bo".into())],
                ),
            ],
            columns,
            execution_time_ms: 0,
        })
    }
}

#[async_trait]
impl Transaction for MockTransaction {
    async fn execute(&self, sql: &str) -> Result<StatementResult> {
        if self.panic_on_sql.as_deref() == Some(sql) {
            panic!("mock worker panic");
        }
        if let Some(delay) = self.statement_delay {
            tokio::time::sleep(delay).await;
        }
        self.state.executed.lock().push(sql.to_string());
        if self.failing_sql.as_deref() == Some(sql) {
            return Err(SqlExecError::Query(format!("mock statement failure: {}", sql)));
        }
        if self.unavailable_sql.as_deref() == Some(sql) {
            return Ok(StatementResult::unavailable("driver reports no count"));
        }
        Ok(StatementResult::with_count(1))
    }

    async fn query(&self, _sql: &str) -> Result<QueryResult> {
        Err(SqlExecError::NotSupported(
            "queries inside mock transactions are not supported".into(),
        ))
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        if self.commit_fails {
            return Err(SqlExecError::Query("mock commit failure".into()));
        }
        self.state.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.state.rollbacks.fetch_add(1, Ordering::SeqCst);
        if self.rollback_fails {
            return Err(SqlExecError::Connection("mock rollback failure".into()));
        }
        Ok(())
    }
}
