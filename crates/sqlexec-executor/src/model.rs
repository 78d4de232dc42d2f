//! Transaction definitions and execution outcomes

use indexmap::IndexMap;
use serde::Serialize;
use sqlexec_core::Value;
use std::time::Duration;

/// Timeout applied when a transaction does not set a positive one
pub const DEFAULT_TRANSACTION_TIMEOUT: Duration = Duration::from_secs(300);

/// Outcome message for a statement that ran and is waiting for commit
pub const STATEMENT_AWAITING_COMMIT: &str = "statement executed successfully, awaiting commit";

/// Outcome message for a committed transaction
pub const TRANSACTION_COMMITTED: &str = "transaction committed successfully";

/// Batch message when every transaction committed
pub const ALL_TRANSACTIONS_COMMITTED: &str = "all transactions committed";

/// One SQL statement of a transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatementSpec {
    pub id: i64,
    pub name: String,
    pub sql: String,
}

impl StatementSpec {
    pub fn new(id: i64, name: impl Into<String>, sql: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            sql: sql.into(),
        }
    }
}

/// A named, ordered list of statements that must commit atomically
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionSpec {
    pub id: i64,
    pub name: String,
    /// How many times opening the transaction may be retried
    pub max_retry: u32,
    /// Bound on opening, every statement and the commit
    pub timeout: Duration,
    pub statements: Vec<StatementSpec>,
}

impl TransactionSpec {
    /// Create an empty transaction with no retries and the default timeout
    pub fn new(id: i64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            max_retry: 0,
            timeout: DEFAULT_TRANSACTION_TIMEOUT,
            statements: Vec::new(),
        }
    }

    /// Set the retry bound
    pub fn with_max_retry(mut self, max_retry: u32) -> Self {
        self.max_retry = max_retry;
        self
    }

    /// Set the timeout; a zero duration selects the default
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = if timeout.is_zero() {
            DEFAULT_TRANSACTION_TIMEOUT
        } else {
            timeout
        };
        self
    }

    /// Append a statement
    pub fn with_statement(mut self, id: i64, name: impl Into<String>, sql: impl Into<String>) -> Self {
        self.statements.push(StatementSpec::new(id, name, sql));
        self
    }
}

/// Where a transaction attempt ended up
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransactionState {
    #[default]
    Idle,
    Opening,
    OpenFailed,
    Open,
    Running,
    StatementFailed,
    AllStatementsOk,
    RolledBack,
    RollbackFailed,
    CommitFailed,
    Committed,
}

impl TransactionState {
    /// Whether no further transition can happen in this attempt
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransactionState::OpenFailed
                | TransactionState::RolledBack
                | TransactionState::RollbackFailed
                | TransactionState::CommitFailed
                | TransactionState::Committed
        )
    }
}

/// Record of one executed (or failed) statement
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatementOutcome {
    pub id: i64,
    pub name: String,
    pub sql: String,
    #[serde(rename = "err_msg")]
    pub message: String,
    pub count: u64,
}

impl StatementOutcome {
    pub(crate) fn for_statement(spec: &StatementSpec) -> Self {
        Self {
            id: spec.id,
            name: spec.name.clone(),
            sql: spec.sql.clone(),
            message: String::new(),
            count: 0,
        }
    }
}

/// Per-transaction execution record
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionOutcome {
    pub id: i64,
    /// Open attempts made minus one; -1 before the first attempt
    pub retry: i32,
    /// Number of statements submitted
    pub count: i64,
    pub name: String,
    #[serde(rename = "err_msg")]
    pub message: String,
    #[serde(rename = "items")]
    pub statements: Vec<StatementOutcome>,
    /// Effective timeout in seconds
    pub timeout: u64,
    #[serde(skip)]
    pub state: TransactionState,
}

impl ExecutionOutcome {
    /// Outcome seeded from a transaction before any attempt
    pub fn seeded(spec: &TransactionSpec) -> Self {
        Self {
            id: spec.id,
            retry: -1,
            count: spec.statements.len() as i64,
            name: spec.name.clone(),
            message: String::new(),
            statements: Vec::new(),
            timeout: spec.timeout.as_secs(),
            state: TransactionState::Idle,
        }
    }

    pub fn is_committed(&self) -> bool {
        self.state == TransactionState::Committed
    }
}

/// Overall status of a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchStatus {
    Success,
    PartialFailure,
}

/// Aggregate of every transaction outcome in a batch
#[derive(Debug, Clone)]
pub struct BatchResult {
    pub status: BatchStatus,
    /// Number of transactions submitted
    pub count: usize,
    /// Outcomes in completion order
    pub outcomes: Vec<ExecutionOutcome>,
    pub message: String,
}

impl BatchResult {
    pub fn is_success(&self) -> bool {
        self.status == BatchStatus::Success
    }

    /// Outcomes that did not commit
    pub fn failed_outcomes(&self) -> Vec<&ExecutionOutcome> {
        self.outcomes.iter().filter(|o| !o.is_committed()).collect()
    }

    /// Outcome for a transaction id
    pub fn outcome(&self, id: i64) -> Option<&ExecutionOutcome> {
        self.outcomes.iter().find(|o| o.id == id)
    }
}

/// Rows returned by the read path
#[derive(Debug, Clone, PartialEq)]
pub struct QueryOutcome {
    pub count: u64,
    /// Failed attempts before the one that succeeded
    pub retry: u32,
    pub rows: Vec<IndexMap<String, Value>>,
}
