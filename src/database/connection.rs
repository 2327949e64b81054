//! Connection bootstrap and the shared connection handle.

use crate::config::{ConnectionDescriptor, ServerConfig, TlsMode};
use crate::constants::{DEFAULT_CLOSE_TIMEOUT, DEFAULT_CREDENTIAL};
use crate::error::ServerError;
use crate::resilience::with_retry;
use sqlx::postgres::{PgConnectOptions, PgConnection, PgSslMode};
use sqlx::Connection;
use std::time::Duration;
use tokio::sync::{MappedMutexGuard, Mutex, MutexGuard};
use tracing::{debug, info, warn};

/// Translate a descriptor into driver options.
///
/// The driver seeds its options from `PG*` variables, so every descriptor
/// field is written back explicitly, including empty ones. An empty user
/// becomes `postgres`; an empty database becomes the user name, which is
/// the server's own default.
pub fn connect_options(
    descriptor: &ConnectionDescriptor,
    statement_timeout: Duration,
) -> PgConnectOptions {
    let user = if descriptor.user.is_empty() {
        DEFAULT_CREDENTIAL
    } else {
        descriptor.user.as_str()
    };
    let database = if descriptor.database.is_empty() {
        user
    } else {
        descriptor.database.as_str()
    };

    let options = PgConnectOptions::new_without_pgpass()
        .host(&descriptor.host)
        .port(descriptor.port)
        .username(user)
        .password(&descriptor.password)
        .database(database)
        .application_name(env!("CARGO_PKG_NAME"))
        .options([
            ("statement_timeout", statement_timeout.as_millis().to_string()),
            ("default_transaction_read_only", "on".to_string()),
        ]);

    match &descriptor.tls_mode {
        TlsMode::Disabled => options.ssl_mode(PgSslMode::Disable),
        TlsMode::Opportunistic | TlsMode::InsecureNoVerify => {
            options.ssl_mode(PgSslMode::Require)
        }
        TlsMode::VerifyFull { ca_bundle } => {
            let options = options.ssl_mode(PgSslMode::VerifyFull);
            // An empty PEM adds no anchors and displaces `PGSSLROOTCERT`.
            let pem = ca_bundle.clone().unwrap_or_default();
            options.ssl_root_cert_from_pem(pem)
        }
        TlsMode::Unset => options.ssl_mode(PgSslMode::Prefer),
    }
}

/// Open the connection, retrying transient failures.
pub async fn connect(
    descriptor: &ConnectionDescriptor,
    config: &ServerConfig,
) -> Result<PgConnection, ServerError> {
    let options = connect_options(descriptor, config.query.timeout);

    info!(
        endpoint = %descriptor.display_target(),
        tls = %descriptor.tls_mode,
        attempts = config.connect_retry.max_attempts,
        "Connecting to PostgreSQL"
    );

    let conn = with_retry(&config.connect_retry, || async {
        PgConnection::connect_with(&options)
            .await
            .map_err(ServerError::from)
    })
    .await?;

    info!(endpoint = %descriptor.display_target(), "Connected to PostgreSQL");
    Ok(conn)
}

/// The single connection shared by all tool calls.
///
/// Calls are serialized on the mutex. After [`close`](Self::close) every
/// acquisition fails with a connection error.
pub struct Database {
    conn: Mutex<Option<PgConnection>>,
    tls_mode: TlsMode,
}

impl Database {
    /// Wrap an open connection.
    pub fn new(conn: PgConnection, tls_mode: TlsMode) -> Self {
        Self {
            conn: Mutex::new(Some(conn)),
            tls_mode,
        }
    }

    /// A handle with no connection behind it.
    #[cfg(test)]
    pub(crate) fn disconnected(tls_mode: TlsMode) -> Self {
        Self {
            conn: Mutex::new(None),
            tls_mode,
        }
    }

    /// TLS mode the connection was opened with.
    pub fn tls_mode(&self) -> &TlsMode {
        &self.tls_mode
    }

    /// Take exclusive use of the connection.
    pub async fn acquire(&self) -> Result<MappedMutexGuard<'_, PgConnection>, ServerError> {
        let guard = self.conn.lock().await;
        MutexGuard::try_map(guard, Option::as_mut)
            .map_err(|_| ServerError::connection("Database connection is closed"))
    }

    /// Run a statement that yields a single JSON value, binding `params` as text.
    pub async fn fetch_json(
        &self,
        sql: &str,
        params: &[&str],
    ) -> Result<serde_json::Value, ServerError> {
        let mut query = sqlx::query_scalar::<_, serde_json::Value>(sql);
        for param in params {
            query = query.bind(param.to_string());
        }

        let mut conn = self.acquire().await?;
        Ok(query.fetch_one(&mut *conn).await?)
    }

    /// Close the connection gracefully, bounded by a timeout.
    pub async fn close(&self) {
        let Some(conn) = self.conn.lock().await.take() else {
            debug!("Database connection already closed");
            return;
        };

        match tokio::time::timeout(DEFAULT_CLOSE_TIMEOUT, conn.close()).await {
            Ok(Ok(())) => info!("Database connection closed"),
            Ok(Err(e)) => warn!(error = %e, "Error while closing database connection"),
            Err(_) => warn!(
                timeout_secs = DEFAULT_CLOSE_TIMEOUT.as_secs(),
                "Timed out closing database connection"
            ),
        }
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("tls_mode", &self.tls_mode)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn descriptor(tls_mode: TlsMode) -> ConnectionDescriptor {
        ConnectionDescriptor {
            host: "db.example.com".to_string(),
            port: 6432,
            user: "reader".to_string(),
            password: "secret".to_string(),
            database: "analytics".to_string(),
            tls_mode,
        }
    }

    #[test]
    fn test_options_carry_descriptor_fields() {
        let options = connect_options(&descriptor(TlsMode::Disabled), Duration::from_secs(30));

        assert_eq!(options.get_host(), "db.example.com");
        assert_eq!(options.get_port(), 6432);
        assert_eq!(options.get_username(), "reader");
        assert_eq!(options.get_database(), Some("analytics"));
        assert!(matches!(options.get_ssl_mode(), PgSslMode::Disable));
        let startup = options.get_options().unwrap_or_default();
        assert!(startup.contains("statement_timeout=30000"));
        assert!(startup.contains("default_transaction_read_only=on"));
    }

    const DRIVER_VARS: &[(&str, &str)] = &[
        ("PGUSER", "leaked_user"),
        ("PGPASSWORD", "leaked_password"),
        ("PGDATABASE", "leaked_db"),
        ("PGSSLROOTCERT", "/nonexistent/leaked-root.crt"),
    ];

    fn with_driver_vars<T>(f: impl FnOnce() -> T) -> T {
        for (key, value) in DRIVER_VARS {
            std::env::set_var(key, value);
        }
        let out = f();
        for (key, _) in DRIVER_VARS {
            std::env::remove_var(key);
        }
        out
    }

    #[test]
    #[serial]
    fn test_empty_fields_ignore_driver_environment() {
        let url_source = ConnectionDescriptor {
            host: "h".to_string(),
            port: 5432,
            user: "u".to_string(),
            password: String::new(),
            database: String::new(),
            tls_mode: TlsMode::Unset,
        };

        let options = with_driver_vars(|| connect_options(&url_source, Duration::from_secs(30)));

        assert_eq!(options.get_username(), "u");
        assert_eq!(options.get_database(), Some("u"));
        assert_ne!(options.get_database(), Some("leaked_db"));
    }

    #[test]
    #[serial]
    fn test_empty_user_falls_back_to_default() {
        let descriptor = ConnectionDescriptor {
            user: String::new(),
            database: String::new(),
            ..descriptor(TlsMode::VerifyFull { ca_bundle: None })
        };

        let options = with_driver_vars(|| connect_options(&descriptor, Duration::from_secs(30)));

        assert_eq!(options.get_username(), "postgres");
        assert_eq!(options.get_database(), Some("postgres"));
        assert!(matches!(options.get_ssl_mode(), PgSslMode::VerifyFull));
    }

    #[test]
    fn test_tls_mode_mapping() {
        let timeout = Duration::from_secs(30);
        let mode = |tls| connect_options(&descriptor(tls), timeout).get_ssl_mode();

        assert!(matches!(mode(TlsMode::Opportunistic), PgSslMode::Require));
        assert!(matches!(mode(TlsMode::InsecureNoVerify), PgSslMode::Require));
        assert!(matches!(mode(TlsMode::Unset), PgSslMode::Prefer));
        assert!(matches!(
            mode(TlsMode::VerifyFull { ca_bundle: None }),
            PgSslMode::VerifyFull
        ));
        assert!(matches!(
            mode(TlsMode::VerifyFull {
                ca_bundle: Some(b"-----BEGIN CERTIFICATE-----".to_vec())
            }),
            PgSslMode::VerifyFull
        ));
    }
}
