//! SQL validation ahead of execution
//!
//! Statements are parsed with `sqlparser` before any database work so that a
//! batch containing a syntax error is rejected as a whole.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use sqlexec_core::SqlExecError;
use sqlparser::ast::Statement;
use sqlparser::dialect::{Dialect, dialect_from_str};
use sqlparser::parser::Parser;
use thiserror::Error;

use crate::model::TransactionSpec;


/// Dialect used when none is configured
pub const DEFAULT_DIALECT: &str = "mysql";

static POSITION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"at Line: (\d+), Column:? (\d+)").expect("position regex is valid"));

/// A statement that failed validation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct SyntaxError {
    pub message: String,
    pub line: Option<u64>,
    pub column: Option<u64>,
}

impl SyntaxError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            line: None,
            column: None,
        }
    }

    fn from_parser(message: String) -> Self {
        let position = POSITION_RE.captures(&message).and_then(|caps| {
            let line = caps.get(1)?.as_str().parse().ok()?;
            let column = caps.get(2)?.as_str().parse().ok()?;
            Some((line, column))
        });
        Self {
            line: position.map(|(line, _)| line),
            column: position.map(|(_, column)| column),
            message,
        }
    }
}

/// A statement rejected inside a transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatementRejection {
    pub id: i64,
    pub name: String,
    pub sql: String,
    #[serde(rename = "err_msg")]
    pub message: String,
}

/// A transaction with no statements or with invalid statements
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransactionRejection {
    pub id: i64,
    /// Number of rejected statements
    pub count: usize,
    pub timeout: u64,
    pub name: String,
    #[serde(rename = "err_msg")]
    pub message: String,
    #[serde(rename = "items")]
    pub statements: Vec<StatementRejection>,
}

/// Why a batch was refused before execution
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct BatchRejection {
    pub message: String,
    pub transactions: Vec<TransactionRejection>,
}

/// Parses SQL to decide whether it may be executed
#[derive(Debug, Clone)]
pub struct SqlValidator {
    dialect: String,
}

impl SqlValidator {
    /// Validator for a `sqlparser` dialect name ("mysql", "sqlite", "postgresql", ...)
    pub fn new(dialect: &str) -> Result<Self, SqlExecError> {
        if dialect_from_str(dialect).is_none() {
            return Err(SqlExecError::Configuration(format!(
                "unknown SQL dialect: {}",
                dialect
            )));
        }
        Ok(Self {
            dialect: dialect.to_string(),
        })
    }

    pub fn dialect(&self) -> &str {
        &self.dialect
    }

    /// Accept exactly one SELECT statement
    pub fn validate_query(&self, sql: &str) -> Result<(), SyntaxError> {
        let statement = self.parse_single(sql)?;
        match statement {
            Statement::Query(_) => Ok(()),
            other => Err(SyntaxError::new(format!(
                "expected a SELECT statement, found: {}",
                statement_kind(&other)
            ))),
        }
    }

    /// Accept exactly one INSERT, UPDATE or DELETE statement
    pub fn validate_modify(&self, sql: &str) -> Result<(), SyntaxError> {
        let statement = self.parse_single(sql)?;
        match statement {
            Statement::Insert { .. } | Statement::Update { .. } | Statement::Delete { .. } => {
                Ok(())
            }
            other => Err(SyntaxError::new(format!(
                "expected an INSERT, UPDATE or DELETE statement, found: {}",
                statement_kind(&other)
            ))),
        }
    }

    /// Check every transaction of a batch, collecting all problems at once
    pub fn validate_batch(&self, specs: &[TransactionSpec]) -> Result<(), BatchRejection> {
        if specs.is_empty() {
            return Err(BatchRejection {
                message: "no transactions submitted".to_string(),
                transactions: Vec::new(),
            });
        }

        let mut rejected = Vec::new();
        for spec in specs {
            if spec.statements.is_empty() {
                rejected.push(TransactionRejection {
                    id: spec.id,
                    count: 0,
                    timeout: spec.timeout.as_secs(),
                    name: spec.name.clone(),
                    message: "transaction contains no SQL statements".to_string(),
                    statements: Vec::new(),
                });
                continue;
            }

            let statements: Vec<StatementRejection> = spec
                .statements
                .iter()
                .filter_map(|statement| {
                    self.validate_modify(&statement.sql)
                        .err()
                        .map(|e| StatementRejection {
                            id: statement.id,
                            name: statement.name.clone(),
                            sql: statement.sql.clone(),
                            message: e.message,
                        })
                })
                .collect();

            if !statements.is_empty() {
                tracing::warn!(
                    transaction_id = spec.id,
                    invalid = statements.len(),
                    "transaction contains invalid SQL"
                );
                rejected.push(TransactionRejection {
                    id: spec.id,
                    count: statements.len(),
                    timeout: spec.timeout.as_secs(),
                    name: spec.name.clone(),
                    message: "transaction contains SQL syntax errors".to_string(),
                    statements,
                });
            }
        }

        if rejected.is_empty() {
            Ok(())
        } else {
            Err(BatchRejection {
                message: "transaction has no SQL or contains SQL syntax errors".to_string(),
                transactions: rejected,
            })
        }
    }

    fn parse_single(&self, sql: &str) -> Result<Statement, SyntaxError> {
        if sql.trim().is_empty() {
            return Err(SyntaxError::new("sql is empty"));
        }

        let dialect: Box<dyn Dialect> = dialect_from_str(&self.dialect)
            .ok_or_else(|| SyntaxError::new(format!("unknown SQL dialect: {}", self.dialect)))?;
        let mut statements = Parser::parse_sql(dialect.as_ref(), sql)
            .map_err(|e| SyntaxError::from_parser(e.to_string()))?;

        match statements.len() {
            1 => Ok(statements.remove(0)),
            0 => Err(SyntaxError::new("sql is empty")),
            n => Err(SyntaxError::new(format!(
                "expected a single statement, found {}",
                n
            ))),
        }
    }
}

impl Default for SqlValidator {
    fn default() -> Self {
        Self {
            dialect: DEFAULT_DIALECT.to_string(),
        }
    }
}

/// Leading keyword of a statement, for error messages
fn statement_kind(statement: &Statement) -> String {
    statement
        .to_string()
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .to_uppercase()
}
