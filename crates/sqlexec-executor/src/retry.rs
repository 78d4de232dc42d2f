//! Bounded retry of transaction attempts
//!
//! Only a failure to open the transaction is retried. Once a statement has
//! run, a failure is reported as-is so the same writes are never replayed.

mod backoff;
mod controller;


pub use backoff::BackoffStrategy;
pub use controller::RetryController;
