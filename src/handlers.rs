//! ServerHandler implementation for the PostgreSQL MCP Server.
//!
//! This module implements the rmcp `ServerHandler` trait which defines how
//! the server responds to MCP protocol requests.

use crate::server::PostgresMcpServer;
use rmcp::handler::server::ServerHandler;
use rmcp::model::{Implementation, ProtocolVersion, ServerCapabilities, ServerInfo};
use rmcp::tool_handler;
use tracing::info;

/// The `#[tool_handler]` macro generates `list_tools` and `call_tool`.
#[tool_handler]
impl ServerHandler for PostgresMcpServer {
    /// Server identification - called during initialization handshake.
    fn get_info(&self) -> ServerInfo {
        info!("MCP client requesting server info");

        ServerInfo {
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: env!("CARGO_PKG_NAME").to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                title: Some("PostgreSQL MCP Server".to_string()),
                description: Some(env!("CARGO_PKG_DESCRIPTION").to_string()),
                icons: None,
                website_url: None,
            },
            instructions: Some(build_instructions(self)),
        }
    }
}

/// Build server instructions based on current state.
fn build_instructions(server: &PostgresMcpServer) -> String {
    let mut instructions = String::new();

    instructions.push_str("# PostgreSQL MCP Server\n\n");
    instructions.push_str("Read-only access to a PostgreSQL database.\n\n");
    instructions.push_str(&format!("**Connected to:** `{}`\n", server.endpoint()));
    instructions.push_str(&format!(
        "**TLS:** {}\n\n",
        server.database().tls_mode().as_str()
    ));

    instructions.push_str("## Available Operations\n\n");
    instructions.push_str("### Schema introspection\n");
    instructions.push_str("- `list_schemas`, `list_tables`, `describe_table`\n");
    instructions.push_str("- `list_indexes`, `list_constraints`\n\n");

    instructions.push_str("### Queries\n");
    instructions.push_str(
        "- `query` accepts a single SELECT, WITH, VALUES, TABLE, SHOW or EXPLAIN statement\n",
    );
    instructions.push_str(&format!(
        "- At most {} rows are returned; statements time out after {} seconds\n",
        server.config().query.max_rows,
        server.config().query.timeout.as_secs()
    ));
    instructions.push_str("- Every statement runs in a read-only transaction that is rolled back\n\n");

    instructions.push_str("### Diagnostics\n");
    instructions.push_str("- `database_info`, `health_check`, `trust_bundle_status`\n\n");

    instructions.push_str("### Best Practices\n");
    instructions.push_str("1. Explore the schema before writing queries\n");
    instructions.push_str("2. Pass `max_rows` to keep results small\n");
    instructions.push_str("3. Use `EXPLAIN` to check expensive queries before running them\n");

    instructions
}
