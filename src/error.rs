//! Error types for the PostgreSQL MCP Server.
//!
//! This module defines semantic error types with PostgreSQL SQLSTATE mapping
//! for user-friendly error messages.

pub use rmcp::ErrorData as McpError;
use std::path::PathBuf;
use thiserror::Error;

/// Domain-specific errors for the PostgreSQL MCP Server.
///
/// Named `ServerError` to avoid collision with `rmcp::ErrorData`.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Configuration error (malformed config file or connection URI)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Connection error
    #[error("Connection error: {message}")]
    Connection {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Authentication error
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Database not found
    #[error("Database not found: {0}")]
    DatabaseNotFound(String),

    /// Object not found (table, schema, etc.)
    #[error("{object_type} not found: {name}")]
    ObjectNotFound { object_type: String, name: String },

    /// Permission denied
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Query validation error
    #[error("Query validation failed: {0}")]
    ValidationFailed(String),

    /// Query execution error
    #[error("Query execution error: {message}")]
    QueryExecution {
        message: String,
        sql_state: Option<String>,
    },

    /// Query timeout
    #[error("Query timeout: operation exceeded {timeout_seconds} seconds")]
    Timeout { timeout_seconds: u64 },

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ServerError {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a connection error.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection {
            message: msg.into(),
            source: None,
        }
    }

    /// Create a connection error with a source.
    pub fn connection_with_source(
        msg: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Connection {
            message: msg.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create an authentication error.
    pub fn auth(msg: impl Into<String>) -> Self {
        Self::Authentication(msg.into())
    }

    /// Create an object not found error.
    pub fn object_not_found(object_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self::ObjectNotFound {
            object_type: object_type.into(),
            name: name.into(),
        }
    }

    /// Create a permission denied error.
    pub fn permission_denied(msg: impl Into<String>) -> Self {
        Self::PermissionDenied(msg.into())
    }

    /// Create a validation error.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::ValidationFailed(msg.into())
    }

    /// Create a query execution error.
    pub fn query_error(msg: impl Into<String>) -> Self {
        Self::QueryExecution {
            message: msg.into(),
            sql_state: None,
        }
    }

    /// Create a query execution error carrying its SQLSTATE.
    pub fn query_error_with_state(msg: impl Into<String>, state: impl Into<String>) -> Self {
        Self::QueryExecution {
            message: msg.into(),
            sql_state: Some(state.into()),
        }
    }

    /// Create a timeout error.
    pub fn timeout(seconds: u64) -> Self {
        Self::Timeout {
            timeout_seconds: seconds,
        }
    }

    /// Create an invalid input error.
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create an internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Check if this error is transient and may succeed on retry.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Connection { .. } => true,
            Self::Timeout { .. } => true,
            Self::QueryExecution {
                sql_state: Some(state),
                ..
            } => is_transient_sql_state(state),
            _ => false,
        }
    }

    /// Get a user-friendly suggestion for how to fix this error.
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            Self::Config(_) => {
                Some("Check DB_*/PG* environment variables, DATABASE_URL, or config.json")
            }
            Self::Connection { .. } => {
                Some("Check server hostname, port, TLS mode, and network connectivity")
            }
            Self::Authentication(_) => Some("Verify your username and password are correct"),
            Self::DatabaseNotFound(_) => Some("Check the database name and ensure it exists"),
            Self::ObjectNotFound { .. } => Some("Check the object name and schema"),
            Self::PermissionDenied(_) => {
                Some("Request appropriate privileges from your database administrator")
            }
            Self::ValidationFailed(_) => {
                Some("Only single read-only statements (SELECT, WITH, VALUES, TABLE, SHOW, EXPLAIN) are accepted")
            }
            Self::Timeout { .. } => Some("Try a simpler query or increase PG_MCP_QUERY_TIMEOUT_SECS"),
            _ => None,
        }
    }
}

/// Map PostgreSQL SQLSTATE codes to semantic ServerError types.
pub fn from_sql_state(state: &str, message: &str) -> ServerError {
    match state {
        // invalid_password, invalid_authorization_specification
        "28P01" | "28000" => ServerError::auth(message),

        // invalid_catalog_name
        "3D000" => ServerError::DatabaseNotFound(message.to_string()),

        // undefined_table, undefined_schema
        "42P01" => ServerError::object_not_found("Relation", message),
        "3F000" => ServerError::object_not_found("Schema", message),

        // insufficient_privilege
        "42501" => ServerError::permission_denied(message),

        // query_canceled (statement_timeout)
        "57014" => ServerError::timeout(0),

        // read_only_sql_transaction
        "25006" => ServerError::validation(format!("Write rejected by read-only transaction: {message}")),

        // connection_exception class
        s if s.starts_with("08") => ServerError::connection(message),

        _ => ServerError::query_error_with_state(message, state),
    }
}

/// Check if a SQLSTATE indicates a transient error.
fn is_transient_sql_state(state: &str) -> bool {
    state.starts_with("08")
        || matches!(
            state,
            "40001"     // serialization_failure
            | "40P01"   // deadlock_detected
            | "53300"   // too_many_connections
            | "57P01"   // admin_shutdown
            | "57P03"   // cannot_connect_now
        )
}

/// Failures of the trust bundle cache.
///
/// These never abort startup; the resolver degrades the TLS mode instead.
#[derive(Debug, Error)]
pub enum TrustBundleError {
    /// Filesystem failure while reading or writing the cache
    #[error("trust bundle I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Network failure while downloading the bundle
    #[error("trust bundle download failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Download answered with a non-200 status
    #[error("trust bundle download returned HTTP {0}")]
    Status(u16),

    /// Download exceeded the configured timeout
    #[error("trust bundle download timed out after {0} seconds")]
    Timeout(u64),

    /// Cached file lacks a complete PEM certificate
    #[error("cached trust bundle at {} is corrupted", .0.display())]
    Corrupted(PathBuf),
}

/// Convert ServerError to rmcp's ErrorData for protocol responses.
///
/// Tool failures are normally returned as `CallToolResult::error` instead;
/// this covers protocol-level failures.
impl From<ServerError> for McpError {
    fn from(e: ServerError) -> Self {
        match e {
            ServerError::Config(msg) => McpError::invalid_request(msg, None),
            ServerError::InvalidInput(msg) | ServerError::ValidationFailed(msg) => {
                McpError::invalid_params(msg, None)
            }
            ServerError::ObjectNotFound { object_type, name } => {
                McpError::invalid_params(format!("{object_type} not found: {name}"), None)
            }
            ServerError::Timeout { timeout_seconds } => McpError::internal_error(
                format!("Query timeout after {timeout_seconds} seconds"),
                None,
            ),
            other => McpError::internal_error(other.to_string(), None),
        }
    }
}

impl From<sqlx::Error> for ServerError {
    fn from(e: sqlx::Error) -> Self {
        use sqlx::Error;

        match &e {
            Error::Database(db) => match db.code() {
                Some(code) => from_sql_state(&code, db.message()),
                None => ServerError::query_error(db.message()),
            },
            Error::Io(_) => ServerError::connection_with_source(format!("IO error: {e}"), e),
            Error::Tls(_) => ServerError::connection_with_source(format!("TLS error: {e}"), e),
            Error::Protocol(_) => ServerError::connection(format!("Protocol error: {e}")),
            Error::PoolTimedOut => ServerError::timeout(0),
            Error::Configuration(_) => ServerError::config(e.to_string()),
            Error::RowNotFound => ServerError::query_error("Query returned no rows"),
            Error::ColumnDecode { .. } | Error::Decode(_) => {
                ServerError::query_error(format!("Type conversion error: {e}"))
            }
            _ => ServerError::internal(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sql_state_mapping() {
        let err = from_sql_state("28P01", "password authentication failed for user \"x\"");
        assert!(matches!(err, ServerError::Authentication(_)));

        let err = from_sql_state("42P01", "relation \"foo\" does not exist");
        assert!(matches!(err, ServerError::ObjectNotFound { .. }));

        let err = from_sql_state("42501", "permission denied for table foo");
        assert!(matches!(err, ServerError::PermissionDenied(_)));

        let err = from_sql_state("08006", "connection failure");
        assert!(matches!(err, ServerError::Connection { .. }));

        let err = from_sql_state("22012", "division by zero");
        assert!(matches!(
            err,
            ServerError::QueryExecution { sql_state: Some(ref s), .. } if s == "22012"
        ));
    }

    #[test]
    fn test_io_failure_keeps_driver_error_as_source() {
        use std::error::Error as _;

        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let err = ServerError::from(sqlx::Error::Io(io));

        assert!(matches!(err, ServerError::Connection { .. }));
        assert!(err.is_transient());
        assert!(err.to_string().contains("refused"));
        assert!(err.source().is_some());
    }

    #[test]
    fn test_transient_errors() {
        assert!(ServerError::timeout(30).is_transient());
        assert!(ServerError::connection("refused").is_transient());
        assert!(ServerError::query_error_with_state("busy", "57P03").is_transient());

        assert!(!ServerError::auth("bad password").is_transient());
        assert!(!ServerError::config("bad url").is_transient());
        assert!(!ServerError::query_error_with_state("division by zero", "22012").is_transient());
    }

    #[test]
    fn test_error_suggestions() {
        assert!(ServerError::auth("Login failed").suggestion().is_some());
        assert!(ServerError::Internal("unknown".to_string()).suggestion().is_none());
    }

    #[test]
    fn test_trust_bundle_error_display() {
        let err = TrustBundleError::Status(404);
        assert_eq!(err.to_string(), "trust bundle download returned HTTP 404");

        let err = TrustBundleError::Corrupted(PathBuf::from(".rds-certs/global-bundle.pem"));
        assert!(err.to_string().contains(".rds-certs/global-bundle.pem"));
    }
}
