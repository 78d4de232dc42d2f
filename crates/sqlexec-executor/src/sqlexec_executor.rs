//! sqlexec executor - concurrent, retry-aware transaction execution
//!
//! Layers, from the bottom up:
//!
//! - [`run_statement`] executes one statement inside an open transaction
//! - [`TransactionExecutor`] runs one attempt of a transaction: open, statements, commit or rollback
//! - [`RetryController`] repeats attempts while opening the transaction fails
//! - [`BatchOrchestrator`] runs every transaction of a batch concurrently
//!
//! [`ReadExecutor`] is the independent read path and [`SqlValidator`] rejects
//! malformed SQL before any of the above runs.

mod batch;
mod error;
mod model;
mod read;
mod retry;
mod statement;
mod transaction;
mod validate;

#[cfg(test)]
mod test_helpers;

pub use batch::{BatchOptions, BatchOrchestrator, WorkerReport};
pub use error::{ReadError, TransactionError};
pub use model::*;
pub use read::ReadExecutor;
pub use retry::{BackoffStrategy, RetryController};
pub use statement::run_statement;
pub use transaction::TransactionExecutor;
pub use validate::{
    BatchRejection, DEFAULT_DIALECT, SqlValidator, StatementRejection, SyntaxError,
    TransactionRejection,
};
