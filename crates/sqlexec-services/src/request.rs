//! Request bodies accepted by the service

use serde::Deserialize;
use sqlexec_executor::TransactionSpec;
use std::time::Duration;

/// Body of a query request
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct QueryRequest {
    pub sql: String,
    /// Retries allowed after the first attempt; negative means none
    #[serde(default)]
    pub retry: i64,
}

/// Body of a modify request
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct ModifyRequest {
    #[serde(default)]
    pub transactions: Vec<TransactionParam>,
}

/// One transaction of a modify request
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct TransactionParam {
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub retry: i64,
    /// Seconds; zero or negative selects the configured default
    #[serde(default)]
    pub timeout: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub sqls: Vec<SqlParam>,
}

/// One statement of a transaction
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct SqlParam {
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub name: String,
    pub sql: String,
}

impl ModifyRequest {
    /// Convert into executable transactions
    pub fn into_specs(self, default_timeout: Duration) -> Vec<TransactionSpec> {
        self.transactions
            .into_iter()
            .map(|t| t.into_spec(default_timeout))
            .collect()
    }
}

impl TransactionParam {
    fn into_spec(self, default_timeout: Duration) -> TransactionSpec {
        let timeout = if self.timeout > 0 {
            Duration::from_secs(self.timeout as u64)
        } else {
            default_timeout
        };
        let max_retry = u32::try_from(self.retry.max(0)).unwrap_or(u32::MAX);

        self.sqls.into_iter().fold(
            TransactionSpec::new(self.id, self.name)
                .with_max_retry(max_retry)
                .with_timeout(timeout),
            |spec, sql| spec.with_statement(sql.id, sql.name, sql.sql),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_modify_request_into_specs() {
        let body = indoc! {r#"
            {
                "transactions": [
                    {
                        "id": 1,
                        "retry": 2,
                        "timeout": 30,
                        "name": "transfer",
                        "sqls": [
                            {"id": 1, "name": "debit", "sql": "UPDATE a SET b = b - 1"},
                            {"id": 2, "name": "credit", "sql": "UPDATE a SET b = b + 1"}
                        ]
                    },
                    {"id": 2, "retry": -3, "sqls": [{"sql": "DELETE FROM a"}]}
                ]
            }
        "#};
        let request: ModifyRequest = serde_json::from_str(body).unwrap();

        let specs = request.into_specs(Duration::from_secs(300));

        assert_eq!(specs.len(), 2);
        assert_eq!(specs[0].max_retry, 2);
        assert_eq!(specs[0].timeout, Duration::from_secs(30));
        assert_eq!(specs[0].statements.len(), 2);
        assert_eq!(specs[0].statements[1].name, "credit");
        assert_eq!(specs[1].max_retry, 0);
        assert_eq!(specs[1].timeout, Duration::from_secs(300));
        assert_eq!(specs[1].name, "");
    }

    #[test]
    fn test_query_request_retry_defaults_to_zero() {
        let request: QueryRequest = serde_json::from_str(r#"{"sql": "SELECT 1"}"#).unwrap();

        assert_eq!(request.retry, 0);
    }
}
