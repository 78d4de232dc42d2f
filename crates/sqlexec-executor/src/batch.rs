//! Concurrent batch execution
//!
//! Every transaction of a batch runs on its own task. Outcomes are collected
//! into a shared sink in completion order and the batch waits for every task
//! before reporting.

mod orchestrator;

pub use orchestrator::{BatchOptions, BatchOrchestrator, WorkerReport};
