//! Transaction Tests
//!
//! Single transactions run through the executor and the retry controller
//! against real SQLite databases: commits, rollbacks, lock contention and
//! deadlines.

use crate::fixtures::{TestStore, impatient_options, test_database, test_database_with_options};
use anyhow::Result;
use pretty_assertions::assert_eq;
use rstest::rstest;
use sqlexec_core::Database;
use sqlexec_executor::{
    ExecutionOutcome, RetryController, STATEMENT_AWAITING_COMMIT, TRANSACTION_COMMITTED,
    TransactionError, TransactionExecutor, TransactionSpec, TransactionState,
};
use std::time::Duration;

fn transfer(from: i64, to: i64, amount: i64) -> TransactionSpec {
    TransactionSpec::new(1, "transfer")
        .with_statement(
            1,
            "debit",
            format!("UPDATE accounts SET balance = balance - {} WHERE id = {}", amount, from),
        )
        .with_statement(
            2,
            "credit",
            format!("UPDATE accounts SET balance = balance + {} WHERE id = {}", amount, to),
        )
}

/// Committed statements persist and every outcome is recorded
#[rstest]
#[case::file(TestStore::File)]
#[case::memory(TestStore::Memory)]
#[tokio::test]
async fn test_transfer_commits(#[case] store: TestStore) -> Result<()> {
    let db = test_database(store).await?;
    let executor = TransactionExecutor::new(db.shared());
    let spec = transfer(1, 2, 40);
    let mut outcome = ExecutionOutcome::seeded(&spec);

    executor.execute(&spec, &mut outcome).await?;

    assert_eq!(outcome.state, TransactionState::Committed);
    assert_eq!(outcome.message, TRANSACTION_COMMITTED);
    assert_eq!(outcome.statements.len(), 2);
    assert!(outcome.statements.iter().all(|s| s.message == STATEMENT_AWAITING_COMMIT && s.count == 1));
    assert_eq!(db.balance(1).await?, 60);
    assert_eq!(db.balance(2).await?, 140);
    Ok(())
}

/// A failing second statement undoes the first one
#[rstest]
#[case::file(TestStore::File)]
#[case::memory(TestStore::Memory)]
#[tokio::test]
async fn test_constraint_violation_rolls_back(#[case] store: TestStore) -> Result<()> {
    let db = test_database(store).await?;
    let executor = TransactionExecutor::new(db.shared());
    // Credit first, then a debit that violates the balance check
    let spec = transfer(1, 2, 500);
    let spec = TransactionSpec {
        statements: spec.statements.into_iter().rev().collect(),
        ..spec
    };
    let mut outcome = ExecutionOutcome::seeded(&spec);

    let err = executor.execute(&spec, &mut outcome).await.unwrap_err();

    assert!(matches!(err, TransactionError::Statement { statement_id: 1, .. }));
    assert_eq!(outcome.state, TransactionState::RolledBack);
    assert_eq!(outcome.statements.len(), 2);
    assert_eq!(outcome.statements[0].message, STATEMENT_AWAITING_COMMIT);
    assert!(outcome.statements[1].message.starts_with("statement failed, rollback pending"));
    assert!(outcome.message.starts_with("transaction failed, rolled back"));
    assert_eq!(db.balance(1).await?, 100);
    assert_eq!(db.balance(2).await?, 100);
    Ok(())
}

/// Statements after the failing one are never attempted
#[rstest]
#[case::file(TestStore::File)]
#[case::memory(TestStore::Memory)]
#[tokio::test]
async fn test_statements_after_failure_are_skipped(#[case] store: TestStore) -> Result<()> {
    let db = test_database(store).await?;
    let executor = TransactionExecutor::new(db.shared());
    let spec = TransactionSpec::new(3, "audit")
        .with_statement(1, "bad", "INSERT INTO missing_table (x) VALUES (1)")
        .with_statement(2, "log", "INSERT INTO audit_log (account_id, note) VALUES (1, 'never')");
    let mut outcome = ExecutionOutcome::seeded(&spec);

    executor.execute(&spec, &mut outcome).await.unwrap_err();

    assert_eq!(outcome.statements.len(), 1);
    assert_eq!(db.count("SELECT COUNT(*) FROM audit_log").await?, 0);
    Ok(())
}

/// A held write lock makes every open attempt fail until the bound is reached
#[tokio::test]
async fn test_lock_contention_exhausts_retries() -> Result<()> {
    let db = test_database_with_options(TestStore::File, impatient_options()).await?;
    let blocker = db
        .database
        .begin_transaction(tokio::time::Instant::now() + Duration::from_secs(30))
        .await?;

    let controller = RetryController::new(TransactionExecutor::new(db.shared()));
    let spec = TransactionSpec::new(7, "blocked")
        .with_max_retry(1)
        .with_timeout(Duration::from_secs(5))
        .with_statement(1, "delete", "DELETE FROM accounts WHERE id = 5");
    let mut outcome = ExecutionOutcome::seeded(&spec);

    let err = controller.run(&spec, &mut outcome).await.unwrap_err();

    assert!(err.is_retry_exhausted());
    assert_eq!(outcome.retry, 1);
    assert_eq!(outcome.state, TransactionState::OpenFailed);

    blocker.rollback().await?;
    let mut outcome = ExecutionOutcome::seeded(&spec);
    controller.run(&spec, &mut outcome).await?;
    assert_eq!(outcome.retry, 0);
    assert_eq!(db.count("SELECT COUNT(*) FROM accounts").await?, 4);
    Ok(())
}

/// A transaction that outlives its deadline is not committed
#[rstest]
#[case::file(TestStore::File)]
#[case::memory(TestStore::Memory)]
#[tokio::test]
async fn test_deadline_prevents_commit(#[case] store: TestStore) -> Result<()> {
    let db = test_database(store).await?;
    let executor = TransactionExecutor::new(db.shared());
    // A recursive CTE slow enough to outlast a short deadline
    let spec = TransactionSpec::new(9, "slow")
        .with_timeout(Duration::from_millis(250))
        .with_statement(1, "log", "INSERT INTO audit_log (account_id, note) VALUES (1, 'slow')")
        .with_statement(
            2,
            "spin",
            "UPDATE accounts SET balance = balance + (WITH RECURSIVE c(x) AS \
             (SELECT 1 UNION ALL SELECT x + 1 FROM c WHERE x < 50000000) SELECT COUNT(*) FROM c) * 0",
        );
    let mut outcome = ExecutionOutcome::seeded(&spec);

    let err = executor.execute(&spec, &mut outcome).await.unwrap_err();

    assert!(!outcome.is_committed());
    assert!(matches!(err, TransactionError::Statement { statement_id: 2, .. }));
    assert_eq!(db.count("SELECT COUNT(*) FROM audit_log").await?, 0);
    Ok(())
}
