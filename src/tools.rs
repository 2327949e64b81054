//! MCP tools for read-only PostgreSQL access.
//!
//! - `query`: Run a validated read-only statement
//! - `list_schemas`: List non-system schemas
//! - `list_tables`: List tables and views in a schema
//! - `describe_table`: Column definitions of a table
//! - `list_indexes`: Indexes of a table
//! - `list_constraints`: Constraints of a table
//! - `database_info`: Server version, database size and session TLS state
//! - `trust_bundle_status`: State of the cached RDS certificate bundle
//! - `health_check`: Test database connectivity

mod inputs;

pub use inputs::*;

use crate::error::{McpError, ServerError};
use crate::server::PostgresMcpServer;
use rmcp::handler::server::router::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::{CallToolResult, Content};
use rmcp::{tool, tool_router};
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info, warn};

/// Render a value as pretty JSON tool output.
fn json_output<T: Serialize>(value: &T) -> Result<CallToolResult, McpError> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| McpError::internal_error(format!("Serialization failed: {e}"), None))?;
    Ok(CallToolResult::success(vec![Content::text(text)]))
}

/// Report a domain failure as a tool error the client can read.
fn tool_error(tool: &str, e: ServerError) -> CallToolResult {
    warn!(tool, error = %e, "Tool call failed");
    let mut message = e.to_string();
    if let Some(hint) = e.suggestion() {
        message.push_str("\nHint: ");
        message.push_str(hint);
    }
    CallToolResult::error(vec![Content::text(message)])
}

fn respond<T: Serialize>(
    tool: &str,
    result: Result<T, ServerError>,
) -> Result<CallToolResult, McpError> {
    match result {
        Ok(value) => json_output(&value),
        Err(e) => Ok(tool_error(tool, e)),
    }
}

#[tool_router]
impl PostgresMcpServer {
    /// Build the tool router.
    pub(crate) fn create_tool_router() -> ToolRouter<Self> {
        Self::tool_router()
    }

    // =========================================================================
    // Query Execution
    // =========================================================================

    /// Run a read-only statement.
    ///
    /// The statement runs inside a `READ ONLY` transaction that is always
    /// rolled back, with a row limit applied server-side.
    #[tool(
        description = "Run a read-only SQL statement (SELECT, WITH, VALUES, TABLE, SHOW or EXPLAIN) and return the rows. Writes are rejected."
    )]
    async fn query(
        &self,
        Parameters(input): Parameters<QueryInput>,
    ) -> Result<CallToolResult, McpError> {
        let result = match self.executor.execute(&input.sql, input.max_rows).await {
            Ok(result) => result,
            Err(e) => return Ok(tool_error("query", e)),
        };

        debug!(rows = result.row_count, format = %input.format, "Rendering query result");

        match input.format {
            OutputFormat::Table => Ok(CallToolResult::success(vec![Content::text(
                result.to_markdown_table(),
            )])),
            OutputFormat::Csv => Ok(CallToolResult::success(vec![Content::text(
                result.to_csv(),
            )])),
            OutputFormat::Json => json_output(&result),
        }
    }

    // =========================================================================
    // Schema Introspection
    // =========================================================================

    #[tool(description = "List the non-system schemas of the current database with their owners.")]
    async fn list_schemas(&self) -> Result<CallToolResult, McpError> {
        respond("list_schemas", self.metadata.list_schemas().await)
    }

    #[tool(
        description = "List tables, views, materialized views and foreign tables in a schema (default: public) with estimated row counts."
    )]
    async fn list_tables(
        &self,
        Parameters(input): Parameters<ListTablesInput>,
    ) -> Result<CallToolResult, McpError> {
        respond("list_tables", self.metadata.list_tables(&input.schema).await)
    }

    #[tool(description = "Describe the columns of a table: name, type, nullability, default and position.")]
    async fn describe_table(
        &self,
        Parameters(input): Parameters<TableInput>,
    ) -> Result<CallToolResult, McpError> {
        respond(
            "describe_table",
            self.metadata
                .describe_table(&input.schema, &input.table)
                .await,
        )
    }

    #[tool(description = "List the indexes of a table with their definitions.")]
    async fn list_indexes(
        &self,
        Parameters(input): Parameters<TableInput>,
    ) -> Result<CallToolResult, McpError> {
        respond(
            "list_indexes",
            self.metadata.list_indexes(&input.schema, &input.table).await,
        )
    }

    #[tool(description = "List the constraints of a table (primary key, foreign keys, unique, check).")]
    async fn list_constraints(
        &self,
        Parameters(input): Parameters<TableInput>,
    ) -> Result<CallToolResult, McpError> {
        respond(
            "list_constraints",
            self.metadata
                .list_constraints(&input.schema, &input.table)
                .await,
        )
    }

    // =========================================================================
    // Diagnostics
    // =========================================================================

    #[tool(description = "Show server version, current database and user, database size and whether the session uses TLS.")]
    async fn database_info(&self) -> Result<CallToolResult, McpError> {
        let info = match self.metadata.database_info().await {
            Ok(info) => info,
            Err(e) => return Ok(tool_error("database_info", e)),
        };

        json_output(&json!({
            "endpoint": self.endpoint,
            "tls_mode": self.db.tls_mode().as_str(),
            "server_version": info.server_version,
            "database": info.database,
            "current_user": info.current_user,
            "size_bytes": info.size_bytes,
            "size_pretty": info.size_pretty,
            "ssl": info.ssl,
        }))
    }

    /// Report the cached RDS bundle without downloading anything.
    #[tool(description = "Report the state of the cached Amazon RDS certificate bundle: location, age and days until it is refreshed.")]
    async fn trust_bundle_status(&self) -> Result<CallToolResult, McpError> {
        json_output(&self.bundles.status().await)
    }

    #[tool(description = "Test database connectivity and return health status with round-trip latency.")]
    async fn health_check(&self) -> Result<CallToolResult, McpError> {
        let outcome = self.metadata.health_check().await;

        let mut response = json!({
            "endpoint": self.endpoint,
            "tls_mode": self.db.tls_mode().as_str(),
            "timestamp": chrono::Utc::now().to_rfc3339(),
        });

        match outcome {
            Ok(status) => {
                response["healthy"] = json!(status.healthy);
                response["latency_ms"] = json!(status.latency_ms);
                info!(latency_ms = status.latency_ms, "Health check completed: healthy");
            }
            Err(e) => {
                response["healthy"] = json!(false);
                response["error"] = json!(e.to_string());
                warn!(error = %e, "Health check completed: unhealthy");
            }
        }

        json_output(&response)
    }
}
