//! sqlexec core - shared abstractions for the transaction executor
//!
//! This crate provides the fundamental traits and types that every other
//! sqlexec crate depends on:
//!
//! - `Database` - capability handle for opening transactions and running raw statements
//! - `Transaction` - an exclusively owned open transaction
//! - `SqlExecError` - the error type drivers report
//! - Common types like `Value`, `Row`, `QueryResult`, `StatementResult`

mod database;
mod error;
mod types;

pub use database::*;
pub use error::*;
pub use types::*;
