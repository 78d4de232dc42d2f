//! Query and modify request handling
//!
//! Ties request validation, the read executor and the batch orchestrator
//! together under the service lifecycle.

use sqlexec_core::Database;
use sqlexec_executor::{BatchOptions, BatchOrchestrator, ReadExecutor, SqlValidator};
use std::sync::Arc;
use std::time::Duration;

use crate::config::ServiceConfig;
use crate::error::{ServiceError, ServiceResult};
use crate::lifecycle::{LifeManager, RequestGuard};
use crate::request::{ModifyRequest, QueryRequest};
use crate::response::{ModifyResponse, QueryResponse};
use crate::status::StatusCode;

/// Service for the read and modify operations
///
/// Every call holds a [`RequestGuard`] for its whole duration, so shutdown
/// waits for it to finish. `query` and `modify` take the guard themselves;
/// the `*_guarded` variants accept one taken earlier by the caller.
#[derive(Clone)]
pub struct SqlExecutorService {
    reader: ReadExecutor,
    orchestrator: BatchOrchestrator,
    validator: SqlValidator,
    lifecycle: Arc<LifeManager>,
    default_timeout: Duration,
}

impl SqlExecutorService {
    pub fn new(
        database: Arc<dyn Database>,
        config: &ServiceConfig,
        lifecycle: Arc<LifeManager>,
    ) -> ServiceResult<Self> {
        let validator = SqlValidator::new(&config.validation.dialect)
            .map_err(|e| ServiceError::Configuration(e.to_string()))?;

        let mut options = BatchOptions::new();
        if let Some(max) = config.executor.max_concurrency {
            options = options.with_max_concurrency(max);
        }
        if let Some(backoff) = config.retry_backoff() {
            options = options.with_backoff(backoff);
        }

        Ok(Self {
            reader: ReadExecutor::new(database.clone()).with_backoff(config.retry_backoff()),
            orchestrator: BatchOrchestrator::new(database, options),
            validator,
            lifecycle,
            default_timeout: config.default_timeout(),
        })
    }

    pub fn lifecycle(&self) -> &Arc<LifeManager> {
        &self.lifecycle
    }

    /// Validate and run a single SELECT
    pub async fn query(&self, request: QueryRequest) -> QueryResponse {
        match self.lifecycle.enter() {
            Ok(guard) => self.query_guarded(guard, request).await,
            Err(e) => QueryResponse::failure(StatusCode::FailQuery, request.sql, None, e.to_string()),
        }
    }

    /// [`Self::query`] for a request already registered with the lifecycle
    #[tracing::instrument(skip(self, _guard, request), fields(retry = request.retry))]
    pub async fn query_guarded(&self, _guard: RequestGuard, request: QueryRequest) -> QueryResponse {
        if let Err(e) = self.validator.validate_query(&request.sql) {
            tracing::warn!(error = %e, "query rejected");
            return QueryResponse::failure(StatusCode::FailQuery, request.sql, None, e.message);
        }

        match self.reader.query(&request.sql, request.retry).await {
            Ok(outcome) => QueryResponse::success(request.sql, outcome),
            Err(e) => {
                tracing::error!(error = %e, "query failed");
                QueryResponse::failure(StatusCode::FailQuery, request.sql, Some(e.retry()), e.to_string())
            }
        }
    }

    /// Validate and run a batch of write transactions
    pub async fn modify(&self, request: ModifyRequest) -> ModifyResponse {
        match self.lifecycle.enter() {
            Ok(guard) => self.modify_guarded(guard, request).await,
            Err(e) => ModifyResponse::shutting_down(e.to_string()),
        }
    }

    /// [`Self::modify`] for a request already registered with the lifecycle
    #[tracing::instrument(skip(self, _guard, request), fields(transactions = request.transactions.len()))]
    pub async fn modify_guarded(&self, _guard: RequestGuard, request: ModifyRequest) -> ModifyResponse {
        let specs = request.into_specs(self.default_timeout);
        if let Err(rejection) = self.validator.validate_batch(&specs) {
            tracing::warn!(
                rejected = rejection.transactions.len(),
                "batch rejected: {}",
                rejection.message
            );
            return ModifyResponse::rejected(rejection);
        }

        let result = self.orchestrator.execute(specs).await;
        tracing::info!(
            count = result.count,
            failed = result.failed_outcomes().len(),
            "batch finished"
        );
        ModifyResponse::executed(result)
    }
}
