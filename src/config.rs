//! Configuration management for the PostgreSQL MCP Server.
//!
//! Two layers live here:
//!
//! - [`ConfigResolver`] decides *where* to connect, from per-field variables,
//!   `DATABASE_URL`, `config.json` or defaults.
//! - [`ServerConfig`] holds the operational knobs (retries, row limits,
//!   timeouts), loaded from `PG_MCP_*` variables following the 12-factor
//!   app pattern.

mod descriptor;
mod resolver;

pub use descriptor::{ConnectionDescriptor, TlsMode};
pub use resolver::{
    is_rds_host, ConfigResolver, ConfigSource, EnvPair, ResolverOptions, DATABASE_VARS,
    HOST_VARS, PASSWORD_VARS, PORT_VARS, SSLMODE_VARS, URL_VAR, USER_VARS,
};

use crate::constants::{
    DEFAULT_CERT_TIMEOUT_SECS, DEFAULT_CONNECT_ATTEMPTS, DEFAULT_CONNECT_RETRY_DELAY_MS,
    DEFAULT_MAX_QUERY_LENGTH, DEFAULT_MAX_RESULT_ROWS, DEFAULT_QUERY_TIMEOUT_SECS,
};
use crate::error::ServerError;
use crate::resilience::RetryConfig;
use serde::Serialize;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

/// Operational settings loaded from environment variables.
#[derive(Debug, Clone, Serialize)]
pub struct ServerConfig {
    /// Initial connection retry policy
    #[serde(skip)]
    pub connect_retry: RetryConfig,

    /// Query execution limits
    pub query: QueryConfig,

    /// Trust bundle download timeout
    pub cert_timeout: Duration,

    /// Refuse to connect to RDS without a verified bundle
    pub strict_tls: bool,
}

/// Query execution limits.
#[derive(Debug, Clone, Serialize)]
pub struct QueryConfig {
    /// Rows returned when the caller does not ask for fewer
    pub max_rows: usize,

    /// Server-side `statement_timeout`
    pub timeout: Duration,

    /// Maximum accepted statement length (bytes)
    pub max_query_length: usize,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            max_rows: DEFAULT_MAX_RESULT_ROWS,
            timeout: Duration::from_secs(DEFAULT_QUERY_TIMEOUT_SECS),
            max_query_length: DEFAULT_MAX_QUERY_LENGTH,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            connect_retry: RetryConfig::fixed(
                DEFAULT_CONNECT_ATTEMPTS,
                Duration::from_millis(DEFAULT_CONNECT_RETRY_DELAY_MS),
            ),
            query: QueryConfig::default(),
            cert_timeout: Duration::from_secs(DEFAULT_CERT_TIMEOUT_SECS),
            strict_tls: false,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// All optional:
    /// - `PG_MCP_CONNECT_RETRIES`: Initial connection attempts (default: 3)
    /// - `PG_MCP_CONNECT_RETRY_DELAY_MS`: Delay between attempts (default: 2000)
    /// - `PG_MCP_CERT_TIMEOUT_SECS`: Trust bundle download timeout (default: 30)
    /// - `PG_MCP_MAX_ROWS`: Maximum result rows (default: 1000)
    /// - `PG_MCP_QUERY_TIMEOUT_SECS`: Statement timeout (default: 30)
    /// - `PG_MCP_MAX_QUERY_LENGTH`: Maximum query length (default: 100000)
    /// - `PG_MCP_STRICT_TLS`: Fail when the RDS bundle is unavailable (default: false)
    ///
    /// Unparseable values fall back to the default with a warning.
    pub fn from_env() -> Self {
        let attempts: u32 = env_or("PG_MCP_CONNECT_RETRIES", DEFAULT_CONNECT_ATTEMPTS).max(1);
        let delay_ms = env_or("PG_MCP_CONNECT_RETRY_DELAY_MS", DEFAULT_CONNECT_RETRY_DELAY_MS);
        let cert_timeout_secs = env_or("PG_MCP_CERT_TIMEOUT_SECS", DEFAULT_CERT_TIMEOUT_SECS);
        let max_rows = env_or("PG_MCP_MAX_ROWS", DEFAULT_MAX_RESULT_ROWS).max(1);
        let timeout_secs = env_or("PG_MCP_QUERY_TIMEOUT_SECS", DEFAULT_QUERY_TIMEOUT_SECS);
        let max_query_length = env_or("PG_MCP_MAX_QUERY_LENGTH", DEFAULT_MAX_QUERY_LENGTH);

        let strict_tls = std::env::var("PG_MCP_STRICT_TLS")
            .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
            .unwrap_or(false);

        Self {
            connect_retry: RetryConfig::fixed(attempts, Duration::from_millis(delay_ms)),
            query: QueryConfig {
                max_rows,
                timeout: Duration::from_secs(timeout_secs),
                max_query_length,
            },
            cert_timeout: Duration::from_secs(cert_timeout_secs),
            strict_tls,
        }
    }

    /// Resolver inputs for the current process, carrying the TLS policy.
    pub fn resolver_options(&self) -> Result<ResolverOptions, ServerError> {
        Ok(ResolverOptions::from_process()?.strict_tls(self.strict_tls))
    }
}

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    match std::env::var(name) {
        Ok(raw) if !raw.is_empty() => raw.trim().parse().unwrap_or_else(|_| {
            warn!(variable = name, value = %raw, "Ignoring unparseable setting");
            default
        }),
        _ => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const VARS: &[&str] = &[
        "PG_MCP_CONNECT_RETRIES",
        "PG_MCP_CONNECT_RETRY_DELAY_MS",
        "PG_MCP_CERT_TIMEOUT_SECS",
        "PG_MCP_MAX_ROWS",
        "PG_MCP_QUERY_TIMEOUT_SECS",
        "PG_MCP_MAX_QUERY_LENGTH",
        "PG_MCP_STRICT_TLS",
    ];

    fn clear_env() {
        for var in VARS {
            std::env::remove_var(var);
        }
    }

    #[test]
    #[serial]
    fn test_defaults_from_empty_env() {
        clear_env();
        let config = ServerConfig::from_env();

        assert_eq!(config.connect_retry.max_attempts, 3);
        assert_eq!(config.connect_retry.initial_delay, Duration::from_secs(2));
        assert_eq!(config.query.max_rows, 1000);
        assert_eq!(config.query.timeout, Duration::from_secs(30));
        assert_eq!(config.query.max_query_length, 100_000);
        assert_eq!(config.cert_timeout, Duration::from_secs(30));
        assert!(!config.strict_tls);
    }

    #[test]
    #[serial]
    fn test_overrides_from_env() {
        clear_env();
        std::env::set_var("PG_MCP_CONNECT_RETRIES", "5");
        std::env::set_var("PG_MCP_CONNECT_RETRY_DELAY_MS", "250");
        std::env::set_var("PG_MCP_MAX_ROWS", "50");
        std::env::set_var("PG_MCP_STRICT_TLS", "TRUE");

        let config = ServerConfig::from_env();
        clear_env();

        assert_eq!(config.connect_retry.max_attempts, 5);
        assert_eq!(config.connect_retry.initial_delay, Duration::from_millis(250));
        assert_eq!(config.query.max_rows, 50);
        assert!(config.strict_tls);
    }

    #[test]
    #[serial]
    fn test_unparseable_values_fall_back() {
        clear_env();
        std::env::set_var("PG_MCP_MAX_ROWS", "lots");
        std::env::set_var("PG_MCP_CONNECT_RETRIES", "0");

        let config = ServerConfig::from_env();
        clear_env();

        assert_eq!(config.query.max_rows, 1000);
        assert_eq!(config.connect_retry.max_attempts, 1);
    }

    #[test]
    fn test_default_matches_empty_env_shape() {
        let config = ServerConfig::default();
        assert_eq!(config.query.max_rows, DEFAULT_MAX_RESULT_ROWS);
        assert_eq!(config.connect_retry.max_attempts, DEFAULT_CONNECT_ATTEMPTS);
    }
}
