//! SQLite database driver implementation

mod connection;
mod convert;
mod database;
mod transaction;

#[cfg(test)]
mod tests;

pub use database::{SqliteDatabase, SqliteOptions};
pub use transaction::SqliteTransaction;
