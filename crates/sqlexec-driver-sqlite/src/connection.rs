//! Blocking rusqlite connection shared with the async side

use parking_lot::Mutex;
use rusqlite::{Connection as RusqliteConnection, InterruptHandle, OpenFlags};
use sqlexec_core::{QueryResult, Result, Row, SqlExecError, StatementResult};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::time::Instant;

use crate::convert::rusqlite_to_value;

/// A rusqlite connection plus the handle that interrupts it.
///
/// All statement work runs on the blocking pool; the async side only holds
/// the `InterruptHandle` so an elapsed deadline can abort the running call.
#[derive(Clone)]
pub(crate) struct SharedConnection {
    conn: Arc<Mutex<RusqliteConnection>>,
    interrupt_handle: Arc<InterruptHandle>,
}

impl SharedConnection {
    pub(crate) fn new(conn: RusqliteConnection) -> Self {
        // Get interrupt handle before wrapping connection in Mutex
        let interrupt_handle = Arc::new(conn.get_interrupt_handle());
        Self {
            conn: Arc::new(Mutex::new(conn)),
            interrupt_handle,
        }
    }

    /// Run `f` against the connection on the blocking pool.
    ///
    /// With a deadline, the call is abandoned once the deadline passes and a
    /// `Timeout` error is returned for `op`. A call still queued on the pool
    /// never runs; a running one is interrupted. Either way the blocking task
    /// has finished with the connection before this returns.
    pub(crate) async fn run<T, F>(&self, deadline: Option<Instant>, op: &'static str, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&RusqliteConnection) -> Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        let cancelled = Arc::new(AtomicBool::new(false));
        let mut task = tokio::task::spawn_blocking({
            let cancelled = Arc::clone(&cancelled);
            move || {
                let guard = conn.lock();
                if cancelled.load(Ordering::SeqCst) {
                    return Err(SqlExecError::Timeout(format!(
                        "{} cancelled before it started",
                        op
                    )));
                }
                f(&guard)
            }
        });

        let joined = match deadline {
            Some(deadline) => match tokio::time::timeout_at(deadline, &mut task).await {
                Ok(joined) => joined,
                Err(_) => {
                    tracing::warn!(op, "deadline elapsed, interrupting SQLite call");
                    cancelled.store(true, Ordering::SeqCst);
                    self.interrupt_handle.interrupt();
                    if let Err(e) = task.await {
                        tracing::error!(op, error = %e, "SQLite worker task failed after interrupt");
                    }
                    return Err(SqlExecError::Timeout(format!(
                        "{} exceeded the transaction deadline",
                        op
                    )));
                }
            },
            None => task.await,
        };

        joined.map_err(|e| SqlExecError::Driver(format!("SQLite worker task failed: {}", e)))?
    }

    /// Issue a statement synchronously, for use from `Drop`
    pub(crate) fn execute_now(&self, sql: &str, wait: Duration) -> Result<()> {
        let guard = self
            .conn
            .try_lock_for(wait)
            .ok_or_else(|| SqlExecError::Driver("SQLite connection is busy".into()))?;
        guard
            .execute_batch(sql)
            .map_err(|e| SqlExecError::Query(e.to_string()))
    }
}

/// Open a rusqlite connection configured for concurrent transactional use
pub(crate) fn open_connection(path: &str, busy_timeout: Duration) -> Result<RusqliteConnection> {
    let conn = if path == ":memory:" {
        RusqliteConnection::open_in_memory().map_err(|e| {
            SqlExecError::Connection(format!("Failed to open in-memory database: {}", e))
        })?
    } else {
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_URI
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;

        RusqliteConnection::open_with_flags(path, flags).map_err(|e| {
            SqlExecError::Connection(format!(
                "Failed to open SQLite database at '{}': {}",
                path, e
            ))
        })?
    };

    conn.pragma_update(None, "foreign_keys", "ON")
        .map_err(|e| SqlExecError::Connection(format!("Failed to enable foreign keys: {}", e)))?;

    if path != ":memory:" {
        // journal_mode reports the resulting mode as a row
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))
            .map_err(|e| SqlExecError::Connection(format!("Failed to set journal mode: {}", e)))?;
        conn.pragma_update(None, "synchronous", "NORMAL").map_err(|e| {
            SqlExecError::Connection(format!("Failed to set synchronous mode: {}", e))
        })?;
    }

    conn.busy_timeout(busy_timeout)
        .map_err(|e| SqlExecError::Connection(format!("Failed to set busy timeout: {}", e)))?;

    Ok(conn)
}

/// Execute one write statement and report the affected-row count
pub(crate) fn execute_statement(conn: &RusqliteConnection, sql: &str) -> Result<StatementResult> {
    match conn.execute(sql, []) {
        Ok(rows_affected) => {
            tracing::debug!(affected_rows = rows_affected, "statement executed");
            Ok(StatementResult::with_count(rows_affected as u64))
        }
        // The statement produced rows, so SQLite has no change count to report.
        Err(rusqlite::Error::ExecuteReturnedResults) => {
            tracing::debug!("statement returned rows, affected-row count unavailable");
            Ok(StatementResult::unavailable(
                "statement returned rows instead of a change count",
            ))
        }
        Err(e) => Err(SqlExecError::Query(format!(
            "Failed to execute statement: {}",
            e
        ))),
    }
}

/// Run a query and collect every row
pub(crate) fn run_query(conn: &RusqliteConnection, sql: &str) -> Result<QueryResult> {
    let start_time = std::time::Instant::now();

    let mut stmt = conn
        .prepare(sql)
        .map_err(|e| SqlExecError::Query(format!("Failed to prepare query: {}", e)))?;

    let columns: Vec<String> = stmt
        .column_names()
        .into_iter()
        .map(|name| name.to_string())
        .collect();

    let mut rows = Vec::new();
    let mut query_rows = stmt
        .query([])
        .map_err(|e| SqlExecError::Query(format!("Failed to execute query: {}", e)))?;

    while let Some(row) = query_rows
        .next()
        .map_err(|e| SqlExecError::Query(format!("Failed to fetch row: {}", e)))?
    {
        let mut values = Vec::with_capacity(columns.len());
        for i in 0..columns.len() {
            values.push(rusqlite_to_value(row, i)?);
        }
        rows.push(Row::new(columns.clone(), values));
    }

    let execution_time_ms = start_time.elapsed().as_millis() as u64;
    tracing::debug!(
        row_count = rows.len(),
        execution_time_ms,
        "query executed successfully"
    );
    Ok(QueryResult {
        columns,
        rows,
        execution_time_ms,
    })
}
