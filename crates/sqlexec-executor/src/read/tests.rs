//! Tests for the read executor

use super::*;
use crate::test_helpers::MockDatabase;
use pretty_assertions::assert_eq;
use sqlexec_core::Value;
use std::sync::atomic::Ordering;

const SQL: &str = "SELECT id, name FROM users";

#[tokio::test]
async fn test_query_returns_ordered_rows() {
    let (db, state) = MockDatabase::new().into_shared();
    let executor = ReadExecutor::new(db);

    let outcome = executor.query(SQL, 0).await.unwrap();

    assert_eq!(outcome.count, 2);
    assert_eq!(outcome.retry, 0);
    let keys: Vec<&str> = outcome.rows[0].keys().map(String::as_str).collect();
    assert_eq!(keys, vec!["id", "name"]);
    assert_eq!(outcome.rows[1].get("name"), Some(&Value::String("bo".into())));
    assert_eq!(state.query_attempts.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_success_after_failures_reports_failed_attempts() {
    let (db, state) = MockDatabase::new().with_query_failures(2).into_shared();
    let executor = ReadExecutor::new(db);

    let outcome = executor.query(SQL, 3).await.unwrap();

    assert_eq!(outcome.retry, 2);
    assert_eq!(state.query_attempts.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_all_attempts_failing_consumes_every_retry() {
    let (db, state) = MockDatabase::new().with_query_failures(10).into_shared();
    let executor = ReadExecutor::new(db);

    let err = executor.query(SQL, 2).await.unwrap_err();

    assert_eq!(err.retry(), 2);
    assert_eq!(state.query_attempts.load(Ordering::SeqCst), 3);
    assert!(err.to_string().contains("mock query failure"));
}

#[tokio::test]
async fn test_negative_retry_is_clamped_to_zero() {
    let (db, state) = MockDatabase::new().with_query_failures(1).into_shared();
    let executor = ReadExecutor::new(db);

    let err = executor.query(SQL, -5).await.unwrap_err();

    assert_eq!(err.retry(), 0);
    assert_eq!(state.query_attempts.load(Ordering::SeqCst), 1);
}
