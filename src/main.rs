//! PostgreSQL MCP Server entry point.
//!
//! This binary resolves the connection settings, connects once and serves
//! MCP tools over stdio for Claude Desktop, Cursor and other MCP clients.
//!
//! Configuration and connectivity failures exit non-zero before the MCP
//! handshake. Trust bundle failures only downgrade the TLS mode.

use anyhow::Result;
use postgres_mcp_server::database::{self, Database};
use postgres_mcp_server::shutdown::{install_signal_handlers, new_shutdown_controller};
use postgres_mcp_server::{ConfigResolver, PostgresMcpServer, ServerConfig, TrustBundleCache};
use rmcp::ServiceExt;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging to stderr (stdout is reserved for JSON-RPC)
    init_logging();

    let version = env!("CARGO_PKG_VERSION");
    eprintln!("PostgreSQL MCP Server v{version} starting...");
    eprintln!("Transport: stdio");

    std::panic::set_hook(Box::new(|info| {
        eprintln!("[PANIC] {}", info);
    }));

    let config = ServerConfig::from_env();
    let options = config.resolver_options()?;

    let bundles = Arc::new(TrustBundleCache::rds(
        options.base_dir(),
        config.cert_timeout,
    )?);
    let descriptor = ConfigResolver::new(options).resolve(&bundles).await?;
    eprintln!(
        "Configuration resolved: {} (tls: {})",
        descriptor.display_target(),
        descriptor.tls_mode
    );

    let conn = database::connect(&descriptor, &config).await?;
    let db = Arc::new(Database::new(conn, descriptor.tls_mode.clone()));

    let shutdown_controller = new_shutdown_controller();
    install_signal_handlers(shutdown_controller.clone()).await;

    let server = PostgresMcpServer::new(db.clone(), bundles, config, &descriptor);
    eprintln!("Server initialized. Ready to accept requests...");

    let service = server.serve(rmcp::transport::stdio()).await?;

    let mut shutdown_signal = shutdown_controller.signal();

    tokio::select! {
        quit_reason = service.waiting() => {
            match quit_reason {
                Ok(reason) => eprintln!("Service stopped: {reason:?}"),
                Err(e) => eprintln!("Service error: {e}"),
            }
        }
        _ = shutdown_signal.recv() => {
            eprintln!("Shutdown signal received");
        }
    }

    eprintln!("Initiating graceful shutdown...");
    shutdown_controller.graceful_shutdown(&db).await;
    eprintln!("Server shutdown complete");

    Ok(())
}

/// Initialize tracing subscriber with stderr output.
///
/// Logs MUST go to stderr because stdout is used for JSON-RPC communication.
fn init_logging() {
    let filter = std::env::var("RUST_LOG")
        .map(EnvFilter::new)
        .unwrap_or_else(|_| EnvFilter::new("warn,postgres_mcp_server=info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();
}
