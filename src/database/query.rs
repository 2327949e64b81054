//! Read-only query execution.

use super::connection::Database;
use crate::config::QueryConfig;
use crate::constants::LOG_QUERY_TRUNCATE_LENGTH;
use crate::error::ServerError;
use crate::security::{QueryValidator, ValidatedQuery};
use serde::Serialize;
use serde_json::{Map, Value};
use sqlx::postgres::PgRow;
use sqlx::{Column, Connection, Row};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Result of a query execution.
#[derive(Debug, Clone, Serialize)]
pub struct QueryResult {
    /// Rows as JSON objects keyed by column name.
    pub rows: Vec<Value>,

    /// Number of rows returned.
    pub row_count: usize,

    /// Whether rows beyond the limit were dropped.
    pub truncated: bool,

    /// Execution time in milliseconds.
    pub execution_time_ms: u64,
}

impl QueryResult {
    /// Column names in first-row order.
    pub fn column_names(&self) -> Vec<&str> {
        match self.rows.first() {
            Some(Value::Object(map)) => map.keys().map(String::as_str).collect(),
            _ => Vec::new(),
        }
    }

    /// Format the result as a markdown table.
    pub fn to_markdown_table(&self) -> String {
        let headers = self.column_names();
        if headers.is_empty() {
            return "Query executed successfully. No rows returned.".to_string();
        }

        let mut output = String::new();

        output.push_str("| ");
        output.push_str(&headers.join(" | "));
        output.push_str(" |\n");

        output.push_str("| ");
        output.push_str(
            &headers
                .iter()
                .map(|h| "-".repeat(h.len().max(3)))
                .collect::<Vec<_>>()
                .join(" | "),
        );
        output.push_str(" |\n");

        for row in &self.rows {
            let values: Vec<String> = headers
                .iter()
                .map(|col| display_value(row.get(*col)).replace('|', "\\|"))
                .collect();
            output.push_str("| ");
            output.push_str(&values.join(" | "));
            output.push_str(" |\n");
        }

        output.push_str(&format!("\n_{} row(s)_", self.row_count));
        if self.truncated {
            output.push_str(" _(truncated)_");
        }
        output.push_str(&format!(" _({} ms)_", self.execution_time_ms));

        output
    }

    /// Format the result as CSV.
    pub fn to_csv(&self) -> String {
        let headers = self.column_names();
        if headers.is_empty() {
            return String::new();
        }

        let mut output = headers.join(",");
        output.push('\n');

        for row in &self.rows {
            let values: Vec<String> = headers
                .iter()
                .map(|col| {
                    let value = match row.get(*col) {
                        None | Some(Value::Null) => String::new(),
                        other => display_value(other),
                    };
                    if value.contains(',') || value.contains('"') || value.contains('\n') {
                        format!("\"{}\"", value.replace('"', "\"\""))
                    } else {
                        value
                    }
                })
                .collect();
            output.push_str(&values.join(","));
            output.push('\n');
        }

        output
    }
}

fn display_value(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => "NULL".to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// Executes validated statements inside rolled-back read-only transactions.
#[derive(Debug, Clone)]
pub struct QueryExecutor {
    db: Arc<Database>,
    config: QueryConfig,
    validator: QueryValidator,
}

impl QueryExecutor {
    /// Create a new query executor.
    pub fn new(db: Arc<Database>, config: QueryConfig) -> Self {
        let validator = QueryValidator::new(config.max_query_length);
        Self {
            db,
            config,
            validator,
        }
    }

    /// Validate and run a statement.
    ///
    /// `max_rows` is clamped to the configured maximum.
    pub async fn execute(
        &self,
        sql: &str,
        max_rows: Option<usize>,
    ) -> Result<QueryResult, ServerError> {
        let query = self.validator.validate(sql)?;
        let limit = max_rows
            .unwrap_or(self.config.max_rows)
            .clamp(1, self.config.max_rows);

        debug!(
            kind = %query.kind,
            limit,
            sql = %truncate_for_log(&query.sql, LOG_QUERY_TRUNCATE_LENGTH),
            "Executing query"
        );

        let start = Instant::now();
        let rows = self
            .run_read_only(&query, limit)
            .await
            .map_err(|e| self.with_timeout(e))?;

        let result = limit_rows(rows, limit, start.elapsed().as_millis() as u64);
        debug!(
            rows = result.row_count,
            truncated = result.truncated,
            ms = result.execution_time_ms,
            "Query completed"
        );
        Ok(result)
    }

    async fn run_read_only(
        &self,
        query: &ValidatedQuery,
        limit: usize,
    ) -> Result<Vec<Value>, ServerError> {
        let mut conn = self.db.acquire().await?;
        let mut tx = conn.begin().await?;

        sqlx::query("SET TRANSACTION READ ONLY")
            .execute(&mut *tx)
            .await?;

        let outcome = if query.kind.is_wrappable() {
            // One extra row tells us whether the result was cut.
            let fetch = i64::try_from(limit.saturating_add(1)).unwrap_or(i64::MAX);
            let wrapped = wrap_with_limit(&query.sql);
            sqlx::query_scalar::<_, Value>(&wrapped)
                .bind(fetch)
                .fetch_one(&mut *tx)
                .await
                .map(|value| match value {
                    Value::Array(rows) => rows,
                    other => vec![other],
                })
        } else {
            sqlx::query(&query.sql)
                .fetch_all(&mut *tx)
                .await
                .map(|rows| rows.iter().map(row_to_json).collect())
        };

        let rollback = tx.rollback().await;
        settle(outcome, rollback)
    }

    fn with_timeout(&self, e: ServerError) -> ServerError {
        match e {
            ServerError::Timeout { .. } => ServerError::timeout(self.config.timeout.as_secs()),
            other => other,
        }
    }
}

/// Combine the statement outcome with the rollback that follows it.
///
/// A statement failure is reported even when the rollback fails too.
fn settle<T>(
    outcome: Result<T, sqlx::Error>,
    rollback: Result<(), sqlx::Error>,
) -> Result<T, ServerError> {
    match (outcome, rollback) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(e)) => Err(e.into()),
        (Err(e), Ok(())) => Err(e.into()),
        (Err(e), Err(rollback_err)) => {
            warn!(error = %rollback_err, "Rollback failed after statement error");
            Err(e.into())
        }
    }
}

/// Wrap a statement so rows are limited and aggregated server-side.
///
/// Newlines keep a trailing line comment from swallowing the closing paren.
fn wrap_with_limit(sql: &str) -> String {
    format!(
        "SELECT COALESCE(json_agg(t), '[]'::json) FROM (SELECT * FROM (\n{sql}\n) AS q LIMIT $1) AS t"
    )
}

fn limit_rows(mut rows: Vec<Value>, limit: usize, execution_time_ms: u64) -> QueryResult {
    let truncated = rows.len() > limit;
    rows.truncate(limit);
    QueryResult {
        row_count: rows.len(),
        rows,
        truncated,
        execution_time_ms,
    }
}

/// Convert a row of a utility statement (`SHOW`, `EXPLAIN`) to JSON.
fn row_to_json(row: &PgRow) -> Value {
    let mut object = Map::new();
    for (idx, column) in row.columns().iter().enumerate() {
        let value = row
            .try_get::<Option<String>, _>(idx)
            .map(|v| v.map(Value::String).unwrap_or(Value::Null))
            .or_else(|_| row.try_get::<Option<Value>, _>(idx).map(Option::unwrap_or_default))
            .unwrap_or(Value::Null);
        object.insert(column.name().to_string(), value);
    }
    Value::Object(object)
}

/// Truncate a string for logging purposes.
fn truncate_for_log(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}
