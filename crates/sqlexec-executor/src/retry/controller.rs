//! Retry controller wrapping the transaction executor

use crate::error::TransactionError;
use crate::model::{ExecutionOutcome, TransactionSpec};
use crate::transaction::TransactionExecutor;

use super::BackoffStrategy;

/// Re-runs a transaction attempt while opening it keeps failing
#[derive(Clone)]
pub struct RetryController {
    executor: TransactionExecutor,
    backoff: Option<BackoffStrategy>,
}

impl RetryController {
    /// Controller that retries immediately
    pub fn new(executor: TransactionExecutor) -> Self {
        Self {
            executor,
            backoff: None,
        }
    }

    /// Wait between attempts according to `backoff`
    pub fn with_backoff(mut self, backoff: Option<BackoffStrategy>) -> Self {
        self.backoff = backoff;
        self
    }

    /// Run attempts until one commits, fails terminally or the bound is hit.
    ///
    /// `outcome.retry` counts attempts from -1: before each attempt it is
    /// checked against `spec.max_retry` and then incremented, so it never
    /// exceeds the bound. Statement outcomes from a failed attempt are
    /// discarded before the next one.
    pub async fn run(
        &self,
        spec: &TransactionSpec,
        outcome: &mut ExecutionOutcome,
    ) -> Result<(), TransactionError> {
        let mut last_error: Option<TransactionError> = None;

        loop {
            if i64::from(outcome.retry) + 1 > i64::from(spec.max_retry) {
                tracing::warn!(
                    transaction_id = spec.id,
                    max_retry = spec.max_retry,
                    "retry limit exhausted"
                );
                return Err(TransactionError::RetryExhausted {
                    max_retry: spec.max_retry,
                    last_error: last_error.map(Box::new),
                });
            }

            if outcome.retry >= 0
                && let Some(backoff) = &self.backoff
            {
                let delay = backoff.calculate_delay(outcome.retry as u32);
                tracing::debug!(transaction_id = spec.id, delay_ms = delay.as_millis() as u64, "waiting before retry");
                tokio::time::sleep(delay).await;
            }

            outcome.retry += 1;
            outcome.statements.clear();

            match self.executor.execute(spec, outcome).await {
                Ok(()) => return Ok(()),
                Err(e) if e.is_retryable() => {
                    tracing::warn!(
                        transaction_id = spec.id,
                        attempt = outcome.retry,
                        error = %e,
                        "transaction attempt failed, will retry if allowed"
                    );
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }
    }
}
