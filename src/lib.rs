//! # PostgreSQL MCP Server
//!
//! A read-only Model Context Protocol (MCP) server for PostgreSQL.
//!
//! This crate provides:
//! - **Configuration resolution**: connection settings from per-field
//!   environment variables, `DATABASE_URL`, `config.json` or defaults
//! - **RDS trust bundle caching**: the Amazon RDS certificate bundle is
//!   downloaded on demand and reused for 30 days
//! - **Tools**: schema introspection and validated read-only queries
//!
//! ## Architecture
//!
//! Startup resolves a [`config::ConnectionDescriptor`], opens a single
//! connection and serves MCP tools over stdio. Every statement runs in a
//! read-only transaction that is rolled back.

pub mod config;
pub mod constants;
pub mod database;
pub mod error;
pub mod handlers;
pub mod resilience;
pub mod security;
pub mod server;
pub mod shutdown;
pub mod tools;
pub mod trust_bundle;

pub use config::{ConfigResolver, ConnectionDescriptor, ServerConfig, TlsMode};
pub use error::{McpError, ServerError};
pub use server::PostgresMcpServer;
pub use trust_bundle::TrustBundleCache;
