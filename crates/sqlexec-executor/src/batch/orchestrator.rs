//! Batch orchestrator implementation

use parking_lot::Mutex;
use sqlexec_core::Database;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinError;

use crate::error::TransactionError;
use crate::model::{
    ALL_TRANSACTIONS_COMMITTED, BatchResult, BatchStatus, ExecutionOutcome, TransactionSpec,
};
use crate::retry::{BackoffStrategy, RetryController};
use crate::transaction::TransactionExecutor;

/// Configuration options for batch execution
#[derive(Debug, Clone, Default)]
pub struct BatchOptions {
    /// Maximum number of transactions running at once (None = unbounded)
    pub max_concurrency: Option<usize>,
    /// Delay between open retries (None = retry immediately)
    pub backoff: Option<BackoffStrategy>,
}

impl BatchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Limit concurrently running transactions; clamped to at least 1
    pub fn with_max_concurrency(mut self, max: usize) -> Self {
        self.max_concurrency = Some(max.max(1));
        self
    }

    pub fn with_backoff(mut self, backoff: BackoffStrategy) -> Self {
        self.backoff = Some(backoff);
        self
    }
}

/// What a worker task reports back once its outcome is in the sink
#[derive(Debug)]
pub enum WorkerReport {
    Committed { id: i64 },
    Failed { id: i64, error: TransactionError },
}

impl WorkerReport {
    pub fn is_committed(&self) -> bool {
        matches!(self, WorkerReport::Committed { .. })
    }
}

type OutcomeSink = Arc<Mutex<Vec<ExecutionOutcome>>>;

/// Fans a batch of transactions out to concurrent workers
#[derive(Clone)]
pub struct BatchOrchestrator {
    controller: RetryController,
    options: BatchOptions,
}

impl BatchOrchestrator {
    pub fn new(database: Arc<dyn Database>, options: BatchOptions) -> Self {
        let controller = RetryController::new(TransactionExecutor::new(database))
            .with_backoff(options.backoff.clone());
        Self {
            controller,
            options,
        }
    }

    pub fn with_defaults(database: Arc<dyn Database>) -> Self {
        Self::new(database, BatchOptions::default())
    }

    pub fn options(&self) -> &BatchOptions {
        &self.options
    }

    /// Execute every transaction concurrently and wait for all of them.
    ///
    /// Never fails as a whole: each transaction's fate is in its outcome and
    /// any failure makes the status `PartialFailure`.
    #[tracing::instrument(skip_all, fields(transactions = specs.len()))]
    pub async fn execute(&self, specs: Vec<TransactionSpec>) -> BatchResult {
        let count = specs.len();
        tracing::info!(count, "executing transaction batch");

        let sink: OutcomeSink = Arc::new(Mutex::new(Vec::with_capacity(count)));
        let semaphore = self
            .options
            .max_concurrency
            .map(|max| Arc::new(Semaphore::new(max)));

        let mut handles = Vec::with_capacity(count);
        for spec in specs {
            let seed = ExecutionOutcome::seeded(&spec);
            let controller = self.controller.clone();
            let sink = sink.clone();
            let semaphore = semaphore.clone();

            let handle = tokio::spawn(async move {
                // The semaphore is never closed, so a failed acquire cannot happen
                let _permit = match semaphore {
                    Some(semaphore) => semaphore.acquire_owned().await.ok(),
                    None => None,
                };
                run_worker(controller, spec, sink).await
            });
            handles.push((seed, handle));
        }

        let mut failed = 0usize;
        for (seed, handle) in handles {
            match handle.await {
                Ok(report) => {
                    if !report.is_committed() {
                        failed += 1;
                    }
                }
                Err(e) => {
                    failed += 1;
                    let fault = worker_fault(e);
                    tracing::error!(transaction_id = seed.id, error = %fault, "transaction worker faulted");
                    let mut outcome = seed;
                    outcome.message = fault.to_string();
                    sink.lock().push(outcome);
                }
            }
        }

        let outcomes = std::mem::take(&mut *sink.lock());
        let (status, message) = if failed == 0 {
            (BatchStatus::Success, ALL_TRANSACTIONS_COMMITTED.to_string())
        } else {
            (
                BatchStatus::PartialFailure,
                format!("{} of {} transactions failed", failed, count),
            )
        };
        tracing::info!(count, failed, "transaction batch finished");

        BatchResult {
            status,
            count,
            outcomes,
            message,
        }
    }
}

async fn run_worker(
    controller: RetryController,
    spec: TransactionSpec,
    sink: OutcomeSink,
) -> WorkerReport {
    let mut outcome = ExecutionOutcome::seeded(&spec);
    let result = controller.run(&spec, &mut outcome).await;

    let report = match result {
        Ok(()) => WorkerReport::Committed { id: spec.id },
        Err(error) => {
            outcome.message = error.to_string();
            WorkerReport::Failed { id: spec.id, error }
        }
    };

    sink.lock().push(outcome);
    report
}

fn worker_fault(error: JoinError) -> TransactionError {
    let detail = match error.try_into_panic() {
        Ok(payload) => match payload.downcast::<String>() {
            Ok(message) => format!("worker panicked: {}", message),
            Err(payload) => match payload.downcast::<&'static str>() {
                Ok(message) => format!("worker panicked: {}", message),
                Err(_) => "worker panicked".to_string(),
            },
        },
        Err(error) if error.is_cancelled() => "worker was cancelled".to_string(),
        Err(error) => error.to_string(),
    };
    TransactionError::WorkerFault(detail)
}
