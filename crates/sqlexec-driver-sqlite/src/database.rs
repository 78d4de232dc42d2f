//! SQLite database handle

use async_trait::async_trait;
use sqlexec_core::{
    Database, QueryResult, Result, SqlExecError, StatementResult, Transaction,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;

use crate::SqliteTransaction;
use crate::connection::{SharedConnection, execute_statement, open_connection, run_query};

/// Options applied to every connection the database opens
#[derive(Debug, Clone)]
pub struct SqliteOptions {
    /// Longest time a connection waits on a locked database file.
    /// Capped by the remaining transaction deadline when opening a transaction.
    pub busy_timeout: Duration,
}

impl Default for SqliteOptions {
    fn default() -> Self {
        Self {
            busy_timeout: Duration::from_secs(5),
        }
    }
}

enum Backing {
    /// File database: every transaction opens its own connection
    File { path: String },
    /// In-memory database: a single connection that transactions take in turns
    Memory { gate: Arc<Semaphore> },
}

/// SQLite implementation of [`Database`]
pub struct SqliteDatabase {
    backing: Backing,
    /// Connection for raw statements; the only connection for `:memory:`
    shared: SharedConnection,
    options: SqliteOptions,
}

impl SqliteDatabase {
    /// Open a SQLite database with default options
    pub fn open(path: &str) -> Result<Self> {
        Self::open_with_options(path, SqliteOptions::default())
    }

    /// Open a SQLite database
    pub fn open_with_options(path: &str, options: SqliteOptions) -> Result<Self> {
        tracing::info!(path = %path, "opening SQLite database");

        if path == ":memory:" {
            let conn = open_connection(path, options.busy_timeout)?;
            return Ok(Self {
                backing: Backing::Memory {
                    gate: Arc::new(Semaphore::new(1)),
                },
                shared: SharedConnection::new(conn),
                options,
            });
        }

        let expanded_path = Self::expand_path(path)?;
        if !expanded_path.starts_with("file:") {
            let file_path = std::path::Path::new(&expanded_path);
            if let Some(parent) = file_path.parent()
                && !parent.exists()
            {
                return Err(SqlExecError::Connection(format!(
                    "Parent directory does not exist: {}",
                    parent.display()
                )));
            }
        }

        let conn = open_connection(&expanded_path, options.busy_timeout)?;
        tracing::info!(path = %expanded_path, "SQLite database connection established");
        Ok(Self {
            backing: Backing::File {
                path: expanded_path,
            },
            shared: SharedConnection::new(conn),
            options,
        })
    }

    /// Run a batch of setup SQL (schema creation, fixtures) on the shared connection
    pub async fn execute_batch(&self, sql: &str) -> Result<()> {
        tracing::debug!("executing SQL batch");
        let (conn, _permit) = self.raw_connection().await?;
        let sql = sql.to_string();
        conn.run(None, "batch", move |conn| {
            conn.execute_batch(&sql)
                .map_err(|e| SqlExecError::Query(format!("Failed to execute batch: {}", e)))
        })
        .await
    }

    /// Expand path to handle ~ (home directory) and relative paths
    pub(crate) fn expand_path(path: &str) -> Result<String> {
        if path.starts_with("file:") {
            return Ok(path.to_string());
        }

        let expanded = if let Some(rest) = path.strip_prefix("~/") {
            if let Some(home) = std::env::var_os("HOME") {
                let home_path = std::path::PathBuf::from(home);
                home_path.join(rest).to_string_lossy().to_string()
            } else {
                return Err(SqlExecError::Configuration(
                    "Unable to determine HOME directory".into(),
                ));
            }
        } else if path.starts_with('~') {
            return Err(SqlExecError::Configuration(
                "User-specific home directories (~user) are not supported".into(),
            ));
        } else {
            path.to_string()
        };

        let path_buf = std::path::PathBuf::from(&expanded);
        let result = if path_buf.is_relative() {
            std::env::current_dir()
                .map_err(SqlExecError::Io)?
                .join(path_buf)
                .to_string_lossy()
                .to_string()
        } else {
            expanded
        };

        Ok(result)
    }

    /// Connection for raw statements, waiting for any in-memory transaction to finish
    async fn raw_connection(&self) -> Result<(SharedConnection, Option<OwnedSemaphorePermit>)> {
        match &self.backing {
            Backing::File { .. } => Ok((self.shared.clone(), None)),
            Backing::Memory { gate } => {
                let permit = gate
                    .clone()
                    .acquire_owned()
                    .await
                    .map_err(|_| SqlExecError::Connection("Database is closed".into()))?;
                Ok((self.shared.clone(), Some(permit)))
            }
        }
    }
}

/// Roll back whatever transaction the connection is still inside, if any
async fn discard_open_transaction(conn: &SharedConnection) {
    let result = conn
        .run(None, "discard", |conn| {
            if conn.is_autocommit() {
                return Ok(false);
            }
            conn.execute_batch("ROLLBACK")
                .map(|_| true)
                .map_err(|e| SqlExecError::Query(format!("Failed to rollback transaction: {}", e)))
        })
        .await;
    match result {
        Ok(true) => tracing::warn!("rolled back a transaction begun after its deadline"),
        Ok(false) => {}
        Err(e) => tracing::error!(error = %e, "failed to discard late transaction"),
    }
}

#[async_trait]
impl Database for SqliteDatabase {
    fn driver_name(&self) -> &str {
        "sqlite"
    }

    async fn begin_transaction(&self, deadline: Instant) -> Result<Box<dyn Transaction>> {
        tracing::debug!("beginning SQLite transaction");
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(SqlExecError::Timeout(
                "transaction deadline elapsed before BEGIN".into(),
            ));
        }

        let (conn, permit) = match &self.backing {
            Backing::File { path } => {
                let path = path.clone();
                let busy_timeout = self.options.busy_timeout.min(remaining);
                let conn = tokio::task::spawn_blocking(move || open_connection(&path, busy_timeout))
                    .await
                    .map_err(|e| {
                        SqlExecError::Driver(format!("SQLite worker task failed: {}", e))
                    })??;
                (SharedConnection::new(conn), None)
            }
            Backing::Memory { gate } => {
                let permit = tokio::time::timeout_at(deadline, gate.clone().acquire_owned())
                    .await
                    .map_err(|_| {
                        SqlExecError::Timeout(
                            "timed out waiting for the in-memory database".into(),
                        )
                    })?
                    .map_err(|_| SqlExecError::Connection("Database is closed".into()))?;
                (self.shared.clone(), Some(permit))
            }
        };

        // IMMEDIATE takes the write lock up front, so concurrent writers queue
        // on the busy timeout instead of failing on lock upgrade mid-transaction.
        let begun = conn
            .run(Some(deadline), "begin", |conn| {
                conn.execute_batch("BEGIN IMMEDIATE").map_err(|e| {
                    SqlExecError::Connection(format!("Failed to begin transaction: {}", e))
                })
            })
            .await;
        if let Err(e) = begun {
            // A BEGIN that completed after its deadline must not leave the
            // shared in-memory connection inside a transaction nobody owns.
            if matches!(e, SqlExecError::Timeout(_)) && permit.is_some() {
                discard_open_transaction(&conn).await;
            }
            return Err(e);
        }

        tracing::debug!("SQLite transaction started");
        Ok(Box::new(SqliteTransaction::new(conn, deadline, permit)))
    }

    #[tracing::instrument(skip(self, sql), fields(sql_preview = %sql.chars().take(100).collect::<String>()))]
    async fn execute(&self, sql: &str) -> Result<StatementResult> {
        let (conn, _permit) = self.raw_connection().await?;
        let sql = sql.to_string();
        conn.run(None, "statement", move |conn| execute_statement(conn, &sql))
            .await
    }

    #[tracing::instrument(skip(self, sql), fields(sql_preview = %sql.chars().take(100).collect::<String>()))]
    async fn query(&self, sql: &str) -> Result<QueryResult> {
        let (conn, _permit) = self.raw_connection().await?;
        let sql = sql.to_string();
        conn.run(None, "query", move |conn| run_query(conn, &sql)).await
    }
}
