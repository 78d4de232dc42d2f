//! Database capability traits

use crate::{QueryResult, Result, StatementResult};
use async_trait::async_trait;
use tokio::time::Instant;

/// Handle to a relational database.
///
/// Implementations hand out transactions that are exclusively owned by the
/// caller: two transactions obtained from the same `Database` never share a
/// connection.
#[async_trait]
pub trait Database: Send + Sync {
    /// Get the driver name (e.g., "sqlite")
    fn driver_name(&self) -> &str;

    /// Begin a transaction whose work must finish before `deadline`.
    ///
    /// The deadline bounds opening the transaction as well as every
    /// statement and the final commit issued through the returned handle.
    async fn begin_transaction(&self, deadline: Instant) -> Result<Box<dyn Transaction>>;

    /// Execute a single write statement outside of any explicit transaction
    async fn execute(&self, sql: &str) -> Result<StatementResult>;

    /// Execute a single read-only query outside of any explicit transaction
    async fn query(&self, sql: &str) -> Result<QueryResult>;
}

/// An open database transaction
#[async_trait]
pub trait Transaction: Send + Sync {
    /// Execute a write statement within the transaction
    async fn execute(&self, sql: &str) -> Result<StatementResult>;

    /// Execute a query within the transaction
    async fn query(&self, sql: &str) -> Result<QueryResult>;

    /// Commit the transaction
    async fn commit(self: Box<Self>) -> Result<()>;

    /// Rollback the transaction
    async fn rollback(self: Box<Self>) -> Result<()>;
}
