//! sqlexec Services Layer
//!
//! This crate sits between the transport (the CLI) and the executor. It owns
//! request decoding, validation, response shaping and the service lifecycle.
//!
//! # Architecture
//!
//! ```text
//! Transport (sqlexec-cli)
//!     ↓
//! Service Layer (sqlexec-services) ← This crate
//!     ↓
//! Executor (sqlexec-executor)
//!     ↓
//! Infrastructure (sqlexec-core, sqlexec-driver-sqlite)
//! ```
//!
//! # Components
//!
//! - [`Router`] - Maps route paths to service operations
//! - [`SqlExecutorService`] - Query and modify operations
//! - [`LifeManager`] - In-flight tracking and graceful shutdown
//! - [`ServiceConfig`] - TOML configuration with environment overrides

mod config;
mod error;
mod handler;
mod lifecycle;
mod request;
mod response;
mod router;
mod status;

pub use config::{
    DATABASE_PATH_ENV, DatabaseConfig, ExecutorConfig, LOG_FILTER_ENV, LifecycleConfig,
    LoggingConfig, ServiceConfig, ValidationConfig,
};
pub use error::{ServiceError, ServiceResult};
pub use handler::SqlExecutorService;
pub use lifecycle::{DEFAULT_SHUTDOWN_GRACE, LifeManager, MAX_IN_FLIGHT, RequestGuard};
pub use request::{ModifyRequest, QueryRequest, SqlParam, TransactionParam};
pub use response::{
    ErrorResponse, Item, ModifyExecuted, ModifyRejected, ModifyResponse, QueryFailure,
    QueryResponse, QuerySuccess,
};
pub use router::{MODIFY_ROUTE, QUERY_ROUTE, Route, Router};
pub use status::StatusCode;
