//! Tool input types with JSON Schema generation.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Output format for query results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Markdown table format (default).
    #[default]
    Table,
    /// JSON format.
    Json,
    /// CSV format.
    Csv,
}

impl OutputFormat {
    /// Get the format name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Table => "table",
            OutputFormat::Json => "json",
            OutputFormat::Csv => "csv",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutputFormat {
    type Err = InvalidOutputFormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "table" | "markdown" => Ok(OutputFormat::Table),
            "json" => Ok(OutputFormat::Json),
            "csv" => Ok(OutputFormat::Csv),
            _ => Err(InvalidOutputFormatError(s.to_string())),
        }
    }
}

/// Error returned when parsing an invalid output format string.
#[derive(Debug, Clone)]
pub struct InvalidOutputFormatError(String);

impl fmt::Display for InvalidOutputFormatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Invalid output format '{}'. Valid formats: table, json, csv",
            self.0
        )
    }
}

impl std::error::Error for InvalidOutputFormatError {}

/// Input for the `query` tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct QueryInput {
    /// The SQL statement to run.
    #[schemars(description = "Read-only SQL statement (SELECT, WITH, VALUES, TABLE, SHOW or EXPLAIN)")]
    pub sql: String,

    /// Maximum number of rows to return.
    #[serde(default)]
    #[schemars(description = "Maximum number of rows to return (default and cap: server configured limit)")]
    pub max_rows: Option<usize>,

    /// Output format for query results.
    #[serde(default)]
    #[schemars(description = "Output format: 'table' (markdown), 'json', or 'csv' (default: table)")]
    pub format: OutputFormat,
}

/// Input for the `list_tables` tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ListTablesInput {
    /// Schema to list.
    #[serde(default = "default_schema")]
    #[schemars(description = "Schema name (default: public)")]
    pub schema: String,
}

/// Input for tools that address a single table.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct TableInput {
    /// Schema containing the table.
    #[serde(default = "default_schema")]
    #[schemars(description = "Schema name (default: public)")]
    pub schema: String,

    /// Table name.
    #[schemars(description = "Table name (case-sensitive, as stored in the catalog)")]
    pub table: String,
}

fn default_schema() -> String {
    "public".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_output_format_parsing() {
        assert_eq!("markdown".parse::<OutputFormat>().unwrap(), OutputFormat::Table);
        assert_eq!("JSON".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
        assert_eq!("csv".parse::<OutputFormat>().unwrap(), OutputFormat::Csv);
        assert!("xml".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn test_query_input_defaults() {
        let input: QueryInput = serde_json::from_value(json!({"sql": "SELECT 1"})).unwrap();
        assert_eq!(input.max_rows, None);
        assert_eq!(input.format, OutputFormat::Table);

        let input: QueryInput =
            serde_json::from_value(json!({"sql": "SELECT 1", "max_rows": 5, "format": "csv"}))
                .unwrap();
        assert_eq!(input.max_rows, Some(5));
        assert_eq!(input.format, OutputFormat::Csv);
    }

    #[test]
    fn test_schema_defaults_to_public() {
        let input: TableInput = serde_json::from_value(json!({"table": "users"})).unwrap();
        assert_eq!(input.schema, "public");

        let input: ListTablesInput = serde_json::from_value(json!({})).unwrap();
        assert_eq!(input.schema, "public");
    }

    #[test]
    fn test_table_is_required() {
        assert!(serde_json::from_value::<TableInput>(json!({"schema": "public"})).is_err());
    }
}
