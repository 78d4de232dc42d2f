//! Statement runner: executes one statement inside an open transaction

use sqlexec_core::{RowsAffected, SqlExecError, Transaction};
use tokio::time::Instant;

use crate::model::{STATEMENT_AWAITING_COMMIT, StatementOutcome, StatementSpec};

/// Execute `spec` inside `tx` and append exactly one outcome to `outcomes`.
///
/// Returns the affected-row count. An unavailable count is not a failure: it
/// is recorded with a zero count. A driver error, or the deadline elapsing,
/// is returned after its outcome has been recorded.
#[tracing::instrument(skip_all, fields(statement_id = spec.id, sql_preview = %spec.sql.chars().take(100).collect::<String>()))]
pub async fn run_statement(
    tx: &dyn Transaction,
    spec: &StatementSpec,
    deadline: Instant,
    outcomes: &mut Vec<StatementOutcome>,
) -> Result<u64, SqlExecError> {
    let mut outcome = StatementOutcome::for_statement(spec);

    let result = match tokio::time::timeout_at(deadline, tx.execute(&spec.sql)).await {
        Ok(result) => result,
        Err(_) => Err(SqlExecError::Timeout(format!(
            "statement {} exceeded the transaction deadline",
            spec.id
        ))),
    };

    match result {
        Ok(result) => {
            let count = match result.rows_affected {
                RowsAffected::Count(count) => {
                    outcome.message = STATEMENT_AWAITING_COMMIT.to_string();
                    count
                }
                RowsAffected::Unavailable(reason) => {
                    outcome.message = format!("no rows affected: {}", reason);
                    0
                }
            };
            tracing::debug!(count, "statement executed");
            outcome.count = count;
            outcomes.push(outcome);
            Ok(count)
        }
        Err(e) => {
            tracing::warn!(error = %e, "statement failed");
            outcome.message = format!("statement failed, rollback pending: {}", e);
            outcomes.push(outcome);
            Err(e)
        }
    }
}
