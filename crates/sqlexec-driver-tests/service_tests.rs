//! Service Tests
//!
//! JSON requests routed through the service against real SQLite databases.

use crate::fixtures::{TestStore, test_database};
use anyhow::Result;
use pretty_assertions::assert_eq;
use rstest::rstest;
use serde_json::json;
use sqlexec_services::{
    LifeManager, MODIFY_ROUTE, QUERY_ROUTE, Router, ServiceConfig, SqlExecutorService,
};
use std::sync::Arc;
use std::time::Duration;

async fn router(store: TestStore) -> Result<(crate::fixtures::TestDatabase, Router)> {
    let db = test_database(store).await?;
    let service = SqlExecutorService::new(
        db.shared(),
        &ServiceConfig::default(),
        Arc::new(LifeManager::new(Duration::ZERO)),
    )?;
    Ok((db, Router::new(service)))
}

#[rstest]
#[case::file(TestStore::File)]
#[case::memory(TestStore::Memory)]
#[tokio::test]
async fn test_modify_then_query(#[case] store: TestStore) -> Result<()> {
    let (_db, router) = router(store).await?;

    let modify = router
        .dispatch(
            MODIFY_ROUTE,
            json!({"transactions": [
                {"id": 1, "name": "close 1", "retry": 2, "timeout": 60, "sqls": [
                    {"id": 1, "name": "log", "sql": "INSERT INTO audit_log (account_id, note) VALUES (1, 'closed')"},
                    {"id": 2, "name": "delete", "sql": "DELETE FROM accounts WHERE id = 1"}
                ]},
                {"id": 2, "name": "close 2", "sqls": [
                    {"id": 1, "name": "delete", "sql": "DELETE FROM accounts WHERE id = 2"}
                ]}
            ]}),
        )
        .await;

    assert_eq!(modify["code"], json!(2));
    assert_eq!(modify["count"], json!(2));
    assert_eq!(modify["err_msg"], json!("all transactions committed"));
    let items = modify["items"].as_array().unwrap();
    assert_eq!(items.len(), 2);
    let first = items.iter().find(|i| i["id"] == json!(1)).unwrap();
    assert_eq!(first["count"], json!(2));
    assert_eq!(first["timeout"], json!(60));
    assert_eq!(first["items"].as_array().unwrap().len(), 2);

    let query = router
        .dispatch(QUERY_ROUTE, json!({"sql": "SELECT id, owner FROM accounts ORDER BY id"}))
        .await;

    assert_eq!(query["code"], json!(0));
    assert_eq!(query["count"], json!(3));
    assert_eq!(query["items"][0], json!({"id": 3, "owner": "cy"}));
    Ok(())
}

#[tokio::test]
async fn test_syntax_error_rejects_whole_batch() -> Result<()> {
    let (db, router) = router(TestStore::File).await?;

    let response = router
        .dispatch(
            MODIFY_ROUTE,
            json!({"transactions": [
                {"id": 1, "sqls": [{"id": 1, "sql": "DELETE FROM accounts WHERE id = 1"}]},
                {"id": 2, "name": "broken", "sqls": [
                    {"id": 1, "sql": "UPDATE accounts SET balance = 0 WHERE id = 2"},
                    {"id": 2, "name": "typo", "sql": "UPDTE accounts SET balance = 0"}
                ]}
            ]}),
        )
        .await;

    assert_eq!(response["code"], json!(4));
    assert_eq!(
        response["err_msg"],
        json!("transaction has no SQL or contains SQL syntax errors")
    );
    assert_eq!(response["items"][0]["id"], json!(2));
    assert_eq!(response["items"][0]["count"], json!(1));
    assert_eq!(response["items"][0]["items"][0]["name"], json!("typo"));
    assert_eq!(db.count("SELECT COUNT(*) FROM accounts").await?, 5);
    Ok(())
}

#[tokio::test]
async fn test_empty_batch_is_a_parameter_error() -> Result<()> {
    let (_db, router) = router(TestStore::Memory).await?;

    let response = router.dispatch(MODIFY_ROUTE, json!({"transactions": []})).await;

    assert_eq!(response["code"], json!(4));
    assert_eq!(response["err_msg"], json!("no transactions submitted"));
    Ok(())
}

#[tokio::test]
async fn test_failed_query_reports_retry() -> Result<()> {
    let (_db, router) = router(TestStore::File).await?;

    let response = router
        .dispatch(QUERY_ROUTE, json!({"sql": "SELECT * FROM ghosts", "retry": 1}))
        .await;

    assert_eq!(response["code"], json!(1));
    assert_eq!(response["retry"], json!(1));
    assert_eq!(response["sql"], json!("SELECT * FROM ghosts"));
    Ok(())
}
