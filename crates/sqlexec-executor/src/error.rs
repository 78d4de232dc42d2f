//! Error types for transaction and read execution

use sqlexec_core::SqlExecError;
use thiserror::Error;

/// Why a transaction did not commit.
///
/// The display text of each variant is what ends up as the outcome message,
/// so it reads as a sentence about the transaction.
#[derive(Error, Debug)]
pub enum TransactionError {
    /// Opening the transaction failed; the only retryable kind
    #[error("failed to open transaction: {0}")]
    Open(#[source] SqlExecError),

    /// A statement failed and the transaction was rolled back (or the
    /// rollback itself failed)
    #[error("{}", statement_failure_message(.error, .rollback_error.as_ref()))]
    Statement {
        statement_id: i64,
        #[source]
        error: SqlExecError,
        rollback_error: Option<SqlExecError>,
    },

    /// Every statement ran but COMMIT failed
    #[error("commit failed, transaction rolled back: {0}")]
    Commit(#[source] SqlExecError),

    /// The retry bound was reached; never retried again
    #[error("retry limit of {max_retry} exhausted: {}", last_error_message(.last_error.as_deref()))]
    RetryExhausted {
        max_retry: u32,
        last_error: Option<Box<TransactionError>>,
    },

    /// The worker running the transaction failed in an unanticipated way
    #[error("unexpected worker fault: {0}")]
    WorkerFault(String),
}

impl TransactionError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, TransactionError::Open(_))
    }

    pub fn is_retry_exhausted(&self) -> bool {
        matches!(self, TransactionError::RetryExhausted { .. })
    }

    /// Whether the transaction's changes are known to be discarded by an explicit rollback
    pub fn rolled_back(&self) -> bool {
        match self {
            TransactionError::Statement { rollback_error, .. } => rollback_error.is_none(),
            _ => false,
        }
    }
}

fn statement_failure_message(error: &SqlExecError, rollback_error: Option<&SqlExecError>) -> String {
    match rollback_error {
        None => format!("transaction failed, rolled back: {}", error),
        Some(rollback_error) => format!(
            "rollback failed, automatic rollback pending: {}; statement error: {}",
            rollback_error, error
        ),
    }
}

fn last_error_message(last_error: Option<&TransactionError>) -> String {
    match last_error {
        Some(e) => e.to_string(),
        None => "no attempt was made".to_string(),
    }
}

/// Read path failure
#[derive(Error, Debug)]
pub enum ReadError {
    #[error("query failed after {retry} retries: {last_error}")]
    RetryExhausted {
        /// Retries consumed, equal to the requested bound
        retry: u32,
        #[source]
        last_error: SqlExecError,
    },
}

impl ReadError {
    /// Retries consumed before giving up
    pub fn retry(&self) -> u32 {
        match self {
            ReadError::RetryExhausted { retry, .. } => *retry,
        }
    }
}
