//! SQLite transaction implementation

use async_trait::async_trait;
use sqlexec_core::{QueryResult, Result, SqlExecError, StatementResult, Transaction};
use std::time::Duration;
use tokio::sync::OwnedSemaphorePermit;
use tokio::time::Instant;

use crate::connection::{SharedConnection, execute_statement, run_query};

/// How long `Drop` waits for the connection before giving up on its rollback
const DROP_ROLLBACK_WAIT: Duration = Duration::from_millis(250);

/// SQLite transaction wrapper.
///
/// Issues raw `BEGIN IMMEDIATE` / `COMMIT` / `ROLLBACK` SQL on a connection it
/// owns exclusively. Every call is bounded by the deadline given at `BEGIN`.
pub struct SqliteTransaction {
    conn: SharedConnection,
    deadline: Instant,
    committed: bool,
    rolled_back: bool,
    /// Held for in-memory databases, whose single connection is taken in turns
    permit: Option<OwnedSemaphorePermit>,
}

impl SqliteTransaction {
    pub(crate) fn new(
        conn: SharedConnection,
        deadline: Instant,
        permit: Option<OwnedSemaphorePermit>,
    ) -> Self {
        Self {
            conn,
            deadline,
            committed: false,
            rolled_back: false,
            permit,
        }
    }
}

impl Drop for SqliteTransaction {
    fn drop(&mut self) {
        // An abandoned transaction gets a best-effort rollback so the
        // connection is left clean. File-backed connections are closed right
        // after this, which makes SQLite discard the transaction regardless.
        if self.committed || self.rolled_back {
            return;
        }
        tracing::warn!(
            "SQLite transaction dropped without commit or rollback, issuing automatic rollback"
        );

        // The in-memory gate stays held until the rollback has run
        let conn = self.conn.clone();
        let permit = self.permit.take();
        let rollback = move || {
            if let Err(e) = conn.execute_now("ROLLBACK", DROP_ROLLBACK_WAIT) {
                tracing::error!(error = %e, "automatic rollback on drop failed");
            }
            drop(permit);
        };

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(rollback);
            }
            Err(_) => rollback(),
        }
    }
}

#[async_trait]
impl Transaction for SqliteTransaction {
    async fn execute(&self, sql: &str) -> Result<StatementResult> {
        tracing::debug!(sql_preview = %sql.chars().take(100).collect::<String>(), "executing statement in SQLite transaction");
        let sql = sql.to_string();
        self.conn
            .run(Some(self.deadline), "statement", move |conn| {
                execute_statement(conn, &sql)
            })
            .await
    }

    async fn query(&self, sql: &str) -> Result<QueryResult> {
        tracing::debug!(sql_preview = %sql.chars().take(100).collect::<String>(), "executing query in SQLite transaction");
        let sql = sql.to_string();
        self.conn
            .run(Some(self.deadline), "query", move |conn| run_query(conn, &sql))
            .await
    }

    async fn commit(mut self: Box<Self>) -> Result<()> {
        tracing::debug!("committing SQLite transaction");

        if self.rolled_back {
            return Err(SqlExecError::Query("Transaction already rolled back".into()));
        }
        if self.committed {
            return Err(SqlExecError::Query("Transaction already committed".into()));
        }

        self.conn
            .run(Some(self.deadline), "commit", |conn| {
                conn.execute_batch("COMMIT").map_err(|e| {
                    SqlExecError::Query(format!("Failed to commit transaction: {}", e))
                })
            })
            .await?;

        self.committed = true;
        tracing::debug!("SQLite transaction committed successfully");
        Ok(())
    }

    async fn rollback(mut self: Box<Self>) -> Result<()> {
        tracing::debug!("rolling back SQLite transaction");

        if self.committed {
            return Err(SqlExecError::Query("Transaction already committed".into()));
        }
        if self.rolled_back {
            return Ok(());
        }

        // Rollback is not bounded by the deadline: it must run even after
        // the deadline interrupted a statement.
        self.conn
            .run(None, "rollback", |conn| {
                conn.execute_batch("ROLLBACK").map_err(|e| {
                    SqlExecError::Query(format!("Failed to rollback transaction: {}", e))
                })
            })
            .await?;

        self.rolled_back = true;
        tracing::debug!("SQLite transaction rolled back successfully");
        Ok(())
    }
}
