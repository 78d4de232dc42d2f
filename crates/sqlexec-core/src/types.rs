//! Core types for sqlexec

use base64::Engine as _;
use indexmap::IndexMap;
use serde::{Serialize, Serializer};

/// A database value as returned by a driver
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// NULL value
    Null,
    /// Boolean
    Bool(bool),
    /// 64-bit signed integer
    Int64(i64),
    /// 64-bit floating point
    Float64(f64),
    /// UTF-8 string
    String(String),
    /// Binary data
    Bytes(Vec<u8>),
}

impl Value {
    /// Try to get as i64
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int64(v) => Some(*v),
            Value::Bool(v) => Some(*v as i64),
            Value::String(s) => s.parse::<i64>().ok(),
            _ => None,
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Bool(v) => write!(f, "{}", v),
            Value::Int64(v) => write!(f, "{}", v),
            Value::Float64(v) => write!(f, "{}", v),
            Value::String(v) => write!(f, "{}", v),
            Value::Bytes(v) => write!(f, "<{} bytes>", v.len()),
        }
    }
}

/// Values serialize as plain JSON scalars; binary data is base64 encoded.
impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_none(),
            Value::Bool(v) => serializer.serialize_bool(*v),
            Value::Int64(v) => serializer.serialize_i64(*v),
            Value::Float64(v) => serializer.serialize_f64(*v),
            Value::String(v) => serializer.serialize_str(v),
            Value::Bytes(v) => {
                serializer.serialize_str(&base64::engine::general_purpose::STANDARD.encode(v))
            }
        }
    }
}

/// A row from a query result
#[derive(Debug, Clone)]
pub struct Row {
    /// Column values
    pub values: Vec<Value>,
    /// Column names
    columns: Vec<String>,
}

impl Row {
    /// Create a new row
    pub fn new(columns: Vec<String>, values: Vec<Value>) -> Self {
        Self { values, columns }
    }

    /// Get a value by column index
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Get a value by column name
    pub fn get_by_name(&self, name: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|c| c == name)
            .and_then(|idx| self.values.get(idx))
    }

    /// Convert to a column-name keyed map, keeping column order
    pub fn to_map(&self) -> IndexMap<String, Value> {
        self.columns
            .iter()
            .zip(self.values.iter())
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

/// Query result
#[derive(Debug, Clone, Default)]
pub struct QueryResult {
    /// Column names in select-list order
    pub columns: Vec<String>,
    /// Result rows
    pub rows: Vec<Row>,
    /// Execution time in milliseconds
    pub execution_time_ms: u64,
}

impl QueryResult {
    /// Get the number of rows
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Convert every row into a column-name keyed map
    pub fn into_maps(self) -> Vec<IndexMap<String, Value>> {
        self.rows.iter().map(Row::to_map).collect()
    }
}

/// Rows-affected report for a write statement.
///
/// Drivers distinguish "the statement touched `n` rows" (including zero) from
/// "the driver could not tell"; neither is an execution failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowsAffected {
    /// Number of rows the statement changed
    Count(u64),
    /// The driver could not report a count
    Unavailable(String),
}

impl RowsAffected {
    /// Count, treating an unavailable report as zero
    pub fn count(&self) -> u64 {
        match self {
            RowsAffected::Count(n) => *n,
            RowsAffected::Unavailable(_) => 0,
        }
    }
}

/// Result of a single write statement
#[derive(Debug, Clone)]
pub struct StatementResult {
    /// Rows affected by the statement
    pub rows_affected: RowsAffected,
}

impl StatementResult {
    /// Result with a known affected-row count
    pub fn with_count(count: u64) -> Self {
        Self {
            rows_affected: RowsAffected::Count(count),
        }
    }

    /// Result whose affected-row count could not be determined
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            rows_affected: RowsAffected::Unavailable(reason.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_value_serializes_as_plain_json() {
        let json = serde_json::to_value(vec![
            Value::Null,
            Value::Bool(true),
            Value::Int64(7),
            Value::String("abc".into()),
            Value::Bytes(vec![0xff, 0x00]),
        ])
        .unwrap();

        assert_eq!(json, serde_json::json!([null, true, 7, "abc", "/wA="]));
    }

    #[test]
    fn test_row_to_map_keeps_column_order() {
        let row = Row::new(
            vec!["z".into(), "a".into()],
            vec![Value::Int64(1), Value::Int64(2)],
        );
        let keys: Vec<_> = row.to_map().keys().cloned().collect();

        assert_eq!(keys, vec!["z".to_string(), "a".to_string()]);
        assert_eq!(row.get_by_name("a"), Some(&Value::Int64(2)));
        assert_eq!(row.get_by_name("missing"), None);
    }

    #[test]
    fn test_rows_affected_count() {
        assert_eq!(RowsAffected::Count(3).count(), 3);
        assert_eq!(RowsAffected::Unavailable("no rows".into()).count(), 0);
    }
}
