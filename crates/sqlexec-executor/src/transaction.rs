//! Transaction executor: one attempt at running a transaction atomically

use sqlexec_core::{Database, SqlExecError, Transaction};
use std::sync::Arc;
use tokio::time::Instant;

use crate::error::TransactionError;
use crate::model::{ExecutionOutcome, TRANSACTION_COMMITTED, TransactionSpec, TransactionState};
use crate::statement::run_statement;


/// Runs a single attempt of a transaction against a database
#[derive(Clone)]
pub struct TransactionExecutor {
    database: Arc<dyn Database>,
}

impl TransactionExecutor {
    pub fn new(database: Arc<dyn Database>) -> Self {
        Self { database }
    }

    /// Open the transaction, run every statement in order and commit.
    ///
    /// The first failing statement stops the attempt and triggers a rollback;
    /// later statements are never attempted. Statement outcomes are appended
    /// to `outcome` and its message and final state are set before returning.
    #[tracing::instrument(skip_all, fields(transaction_id = spec.id, name = %spec.name))]
    pub async fn execute(
        &self,
        spec: &TransactionSpec,
        outcome: &mut ExecutionOutcome,
    ) -> Result<(), TransactionError> {
        let deadline = Instant::now() + spec.timeout;

        outcome.state = TransactionState::Opening;
        let tx = match self.open(deadline).await {
            Ok(tx) => tx,
            Err(e) => {
                let err = TransactionError::Open(e);
                outcome.state = TransactionState::OpenFailed;
                outcome.message = err.to_string();
                return Err(err);
            }
        };
        outcome.state = TransactionState::Open;
        tracing::debug!("transaction opened");

        outcome.state = TransactionState::Running;
        for statement in &spec.statements {
            if let Err(error) =
                run_statement(tx.as_ref(), statement, deadline, &mut outcome.statements).await
            {
                outcome.state = TransactionState::StatementFailed;
                let err = self.abort(tx, statement.id, error, outcome).await;
                outcome.message = err.to_string();
                return Err(err);
            }
        }
        outcome.state = TransactionState::AllStatementsOk;

        let committed = match tokio::time::timeout_at(deadline, tx.commit()).await {
            Ok(result) => result,
            Err(_) => Err(SqlExecError::Timeout(
                "commit exceeded the transaction deadline".into(),
            )),
        };
        if let Err(e) = committed {
            tracing::error!(error = %e, "commit failed");
            let err = TransactionError::Commit(e);
            outcome.state = TransactionState::CommitFailed;
            outcome.message = err.to_string();
            return Err(err);
        }

        outcome.state = TransactionState::Committed;
        outcome.message = TRANSACTION_COMMITTED.to_string();
        tracing::debug!("transaction committed");
        Ok(())
    }

    async fn open(&self, deadline: Instant) -> sqlexec_core::Result<Box<dyn Transaction>> {
        match tokio::time::timeout_at(deadline, self.database.begin_transaction(deadline)).await {
            Ok(result) => result,
            Err(_) => Err(SqlExecError::Timeout(
                "opening the transaction exceeded the deadline".into(),
            )),
        }
    }

    /// Roll back after a failed statement
    async fn abort(
        &self,
        tx: Box<dyn Transaction>,
        statement_id: i64,
        error: SqlExecError,
        outcome: &mut ExecutionOutcome,
    ) -> TransactionError {
        match tx.rollback().await {
            Ok(()) => {
                tracing::warn!(statement_id, error = %error, "statement failed, transaction rolled back");
                outcome.state = TransactionState::RolledBack;
                TransactionError::Statement {
                    statement_id,
                    error,
                    rollback_error: None,
                }
            }
            Err(rollback_error) => {
                // The driver discards the transaction when its handle is dropped
                tracing::error!(
                    statement_id,
                    error = %error,
                    rollback_error = %rollback_error,
                    "rollback failed"
                );
                outcome.state = TransactionState::RollbackFailed;
                TransactionError::Statement {
                    statement_id,
                    error,
                    rollback_error: Some(rollback_error),
                }
            }
        }
    }
}
