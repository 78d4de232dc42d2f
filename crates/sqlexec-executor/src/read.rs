//! Read executor: retried single-query path

use sqlexec_core::{Database, SqlExecError};
use std::sync::Arc;

use crate::error::ReadError;
use crate::model::QueryOutcome;
use crate::retry::BackoffStrategy;

#[cfg(test)]
mod tests;

/// Runs read-only queries with a bounded number of retries
#[derive(Clone)]
pub struct ReadExecutor {
    database: Arc<dyn Database>,
    backoff: Option<BackoffStrategy>,
}

impl ReadExecutor {
    pub fn new(database: Arc<dyn Database>) -> Self {
        Self {
            database,
            backoff: None,
        }
    }

    pub fn with_backoff(mut self, backoff: Option<BackoffStrategy>) -> Self {
        self.backoff = backoff;
        self
    }

    /// Run `sql`, making up to `retry + 1` attempts.
    ///
    /// A negative `retry` is treated as zero. On success the outcome's
    /// `retry` is the number of failed attempts before it; when every attempt
    /// fails the error carries the full retry count and the last driver error.
    #[tracing::instrument(skip(self, sql), fields(sql_preview = %sql.chars().take(100).collect::<String>()))]
    pub async fn query(&self, sql: &str, retry: i64) -> Result<QueryOutcome, ReadError> {
        let retry = u32::try_from(retry.max(0)).unwrap_or(u32::MAX);
        let mut last_error: Option<SqlExecError> = None;

        for attempt in 0..=retry {
            if attempt > 0
                && let Some(backoff) = &self.backoff
            {
                tokio::time::sleep(backoff.calculate_delay(attempt - 1)).await;
            }

            match self.database.query(sql).await {
                Ok(result) => {
                    let rows = result.into_maps();
                    tracing::debug!(rows = rows.len(), attempt, "query succeeded");
                    return Ok(QueryOutcome {
                        count: rows.len() as u64,
                        retry: attempt,
                        rows,
                    });
                }
                Err(e) => {
                    tracing::warn!(attempt, error = %e, "query attempt failed");
                    last_error = Some(e);
                }
            }
        }

        Err(ReadError::RetryExhausted {
            retry,
            last_error: last_error
                .unwrap_or_else(|| SqlExecError::Other("query was never attempted".into())),
        })
    }
}
