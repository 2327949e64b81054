//! Centralized constants for the PostgreSQL MCP Server.
//!
//! This module contains all magic numbers and default values used throughout
//! the codebase, making them easy to find, understand, and modify.

use std::time::Duration;

// =============================================================================
// Connection Defaults
// =============================================================================

/// Default PostgreSQL port.
pub const DEFAULT_PORT: u16 = 5432;

/// Host used when no source names one.
pub const DEFAULT_HOST: &str = "localhost";

/// User, password and database used by the hard-coded fallback source.
pub const DEFAULT_CREDENTIAL: &str = "postgres";

/// Configuration file read from the working directory.
pub const CONFIG_FILE_NAME: &str = "config.json";

// =============================================================================
// Retry Constants
// =============================================================================

/// Default number of initial connection attempts.
pub const DEFAULT_CONNECT_ATTEMPTS: u32 = 3;

/// Default delay between connection attempts in milliseconds.
pub const DEFAULT_CONNECT_RETRY_DELAY_MS: u64 = 2000;

/// Default delay between connection attempts as Duration.
pub const DEFAULT_CONNECT_RETRY_DELAY: Duration =
    Duration::from_millis(DEFAULT_CONNECT_RETRY_DELAY_MS);

// =============================================================================
// Trust Bundle Constants
// =============================================================================

/// Substring identifying an Amazon RDS endpoint.
pub const RDS_HOST_PATTERN: &str = ".rds.amazonaws.com";

/// Global certificate bundle published for all RDS regions.
pub const RDS_BUNDLE_URL: &str = "https://truststore.pki.rds.amazonaws.com/global/global-bundle.pem";

/// Cache directory, relative to the working directory.
pub const RDS_CERT_DIR: &str = ".rds-certs";

/// Cached bundle file name.
pub const RDS_BUNDLE_FILE: &str = "global-bundle.pem";

/// Days a cached bundle stays valid.
pub const BUNDLE_VALIDITY_DAYS: i64 = 30;

/// Default download timeout in seconds.
pub const DEFAULT_CERT_TIMEOUT_SECS: u64 = 30;

/// Default download timeout as Duration.
pub const DEFAULT_CERT_TIMEOUT: Duration = Duration::from_secs(DEFAULT_CERT_TIMEOUT_SECS);

/// PEM certificate begin marker.
pub const PEM_BEGIN_MARKER: &str = "-----BEGIN CERTIFICATE-----";

/// PEM certificate end marker.
pub const PEM_END_MARKER: &str = "-----END CERTIFICATE-----";

// =============================================================================
// Query Constants
// =============================================================================

/// Default query timeout in seconds.
pub const DEFAULT_QUERY_TIMEOUT_SECS: u64 = 30;

/// Default maximum result rows.
pub const DEFAULT_MAX_RESULT_ROWS: usize = 1_000;

/// Default maximum query length in bytes.
pub const DEFAULT_MAX_QUERY_LENGTH: usize = 100_000;

// =============================================================================
// Shutdown Constants
// =============================================================================

/// Default time allowed for closing the database connection.
pub const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Default time allowed for an in-flight tool call to finish on shutdown.
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

// =============================================================================
// Logging Constants
// =============================================================================

/// Default truncation length for query logging.
pub const LOG_QUERY_TRUNCATE_LENGTH: usize = 100;
