//! Response bodies produced by the service

use indexmap::IndexMap;
use serde::Serialize;
use sqlexec_core::Value;
use sqlexec_executor::{BatchRejection, BatchResult, ExecutionOutcome, QueryOutcome, TransactionRejection};
use std::collections::BTreeMap;

use crate::StatusCode;

/// Rows are returned with their columns in select-list order
pub type Item = IndexMap<String, Value>;

/// Successful read
#[derive(Debug, Clone, Serialize)]
pub struct QuerySuccess {
    pub code: StatusCode,
    pub sql: String,
    pub count: u64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub items: Vec<Item>,
    pub retry: u32,
    pub err_msg: String,
}

/// Rejected or failed read
#[derive(Debug, Clone, Serialize)]
pub struct QueryFailure {
    pub code: StatusCode,
    pub sql: String,
    /// Present when the query was attempted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry: Option<u32>,
    pub err_msg: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum QueryResponse {
    Success(QuerySuccess),
    Failure(QueryFailure),
}

impl QueryResponse {
    pub fn success(sql: String, outcome: QueryOutcome) -> Self {
        QueryResponse::Success(QuerySuccess {
            code: StatusCode::SuccessQuery,
            sql,
            count: outcome.count,
            items: outcome.rows,
            retry: outcome.retry,
            err_msg: "query executed successfully".to_string(),
        })
    }

    pub fn failure(code: StatusCode, sql: String, retry: Option<u32>, err_msg: impl Into<String>) -> Self {
        QueryResponse::Failure(QueryFailure {
            code,
            sql,
            retry,
            err_msg: err_msg.into(),
        })
    }

    pub fn code(&self) -> StatusCode {
        match self {
            QueryResponse::Success(s) => s.code,
            QueryResponse::Failure(f) => f.code,
        }
    }
}

/// Result of an executed batch
#[derive(Debug, Clone, Serialize)]
pub struct ModifyExecuted {
    pub code: StatusCode,
    pub count: usize,
    pub items: Vec<ExecutionOutcome>,
    pub err_msg: String,
}

/// A batch refused before execution
#[derive(Debug, Clone, Serialize)]
pub struct ModifyRejected {
    pub code: StatusCode,
    pub count: usize,
    pub items: Vec<TransactionRejection>,
    pub err_msg: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ModifyResponse {
    Executed(ModifyExecuted),
    Rejected(ModifyRejected),
}

impl ModifyResponse {
    pub fn executed(result: BatchResult) -> Self {
        let code = if result.is_success() {
            StatusCode::SuccessModify
        } else {
            StatusCode::FailModifyExist
        };
        ModifyResponse::Executed(ModifyExecuted {
            code,
            count: result.count,
            items: result.outcomes,
            err_msg: result.message,
        })
    }

    /// Refused while the service is shutting down
    pub fn shutting_down(err_msg: impl Into<String>) -> Self {
        ModifyResponse::Executed(ModifyExecuted {
            code: StatusCode::FailModifyExist,
            count: 0,
            items: Vec::new(),
            err_msg: err_msg.into(),
        })
    }

    pub fn rejected(rejection: BatchRejection) -> Self {
        ModifyResponse::Rejected(ModifyRejected {
            code: StatusCode::ParameterError,
            count: rejection.transactions.len(),
            items: rejection.transactions,
            err_msg: rejection.message,
        })
    }

    pub fn code(&self) -> StatusCode {
        match self {
            ModifyResponse::Executed(e) => e.code,
            ModifyResponse::Rejected(r) => r.code,
        }
    }
}

/// Response for requests that could not be decoded or routed
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub code: StatusCode,
    pub err_msg: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub details: BTreeMap<String, String>,
}

impl ErrorResponse {
    pub fn parameter_error(err_msg: impl Into<String>) -> Self {
        Self {
            code: StatusCode::ParameterError,
            err_msg: err_msg.into(),
            details: BTreeMap::new(),
        }
    }

    pub fn with_detail(mut self, key: &str, value: impl Into<String>) -> Self {
        self.details.insert(key.to_string(), value.into());
        self
    }
}
