//! The resolved connection descriptor.

use std::fmt;

/// TLS behaviour requested for the database connection.
#[derive(Clone, PartialEq, Eq, Default)]
pub enum TlsMode {
    /// Plaintext connection.
    Disabled,
    /// Encrypted, any server certificate accepted.
    Opportunistic,
    /// Encrypted and verified. `None` verifies against the transport's own roots.
    VerifyFull { ca_bundle: Option<Vec<u8>> },
    /// Encrypted with verification explicitly switched off.
    InsecureNoVerify,
    /// Nothing requested; the connector applies its own default.
    #[default]
    Unset,
}

impl TlsMode {
    /// Translate an explicit `sslmode` value.
    ///
    /// `require` relaxes verification, `disable` turns TLS off and every
    /// other non-empty value asks for full verification.
    pub fn from_sslmode(value: &str) -> Self {
        match value {
            "require" => TlsMode::Opportunistic,
            "disable" => TlsMode::Disabled,
            _ => TlsMode::VerifyFull { ca_bundle: None },
        }
    }

    /// Short name used in logs and diagnostics.
    pub fn as_str(&self) -> &'static str {
        match self {
            TlsMode::Disabled => "disabled",
            TlsMode::Opportunistic => "opportunistic",
            TlsMode::VerifyFull { .. } => "verify-full",
            TlsMode::InsecureNoVerify => "insecure-no-verify",
            TlsMode::Unset => "unset",
        }
    }

    /// Whether the server certificate is checked.
    pub fn verifies_server(&self) -> bool {
        matches!(self, TlsMode::VerifyFull { .. })
    }

    /// Bundle to verify against, when one was provisioned.
    pub fn ca_bundle(&self) -> Option<&[u8]> {
        match self {
            TlsMode::VerifyFull {
                ca_bundle: Some(bundle),
            } => Some(bundle),
            _ => None,
        }
    }
}

impl fmt::Display for TlsMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Debug for TlsMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TlsMode::VerifyFull { ca_bundle } => f
                .debug_struct("VerifyFull")
                .field("ca_bundle_bytes", &ca_bundle.as_ref().map(Vec::len))
                .finish(),
            other => f.write_str(match other {
                TlsMode::Disabled => "Disabled",
                TlsMode::Opportunistic => "Opportunistic",
                TlsMode::InsecureNoVerify => "InsecureNoVerify",
                _ => "Unset",
            }),
        }
    }
}

/// Ready-to-use connection parameters.
///
/// Built once by [`ConfigResolver`](super::ConfigResolver) and handed to the
/// connection bootstrap.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionDescriptor {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    pub tls_mode: TlsMode,
}

impl ConnectionDescriptor {
    /// `host:port/database` without credentials, for logs.
    pub fn display_target(&self) -> String {
        format!("{}:{}/{}", self.host, self.port, self.database)
    }
}

impl fmt::Debug for ConnectionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionDescriptor")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &if self.password.is_empty() { "" } else { "***" })
            .field("database", &self.database)
            .field("tls_mode", &self.tls_mode)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sslmode_translation() {
        assert_eq!(TlsMode::from_sslmode("require"), TlsMode::Opportunistic);
        assert_eq!(TlsMode::from_sslmode("disable"), TlsMode::Disabled);
        assert_eq!(
            TlsMode::from_sslmode("verify-full"),
            TlsMode::VerifyFull { ca_bundle: None }
        );
        assert_eq!(
            TlsMode::from_sslmode("prefer"),
            TlsMode::VerifyFull { ca_bundle: None }
        );
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let descriptor = ConnectionDescriptor {
            host: "db.example.com".to_string(),
            port: 5432,
            user: "app".to_string(),
            password: "hunter2".to_string(),
            database: "app".to_string(),
            tls_mode: TlsMode::VerifyFull {
                ca_bundle: Some(b"-----BEGIN CERTIFICATE-----".to_vec()),
            },
        };

        let debug = format!("{descriptor:?}");
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("***"));
        assert!(!debug.contains("BEGIN CERTIFICATE"));
        assert_eq!(descriptor.display_target(), "db.example.com:5432/app");
    }

    #[test]
    fn test_ca_bundle_accessor() {
        let mode = TlsMode::VerifyFull {
            ca_bundle: Some(vec![1, 2, 3]),
        };
        assert_eq!(mode.ca_bundle(), Some(&[1u8, 2, 3][..]));
        assert!(mode.verifies_server());
        assert_eq!(TlsMode::Opportunistic.ca_bundle(), None);
        assert!(!TlsMode::Opportunistic.verifies_server());
    }
}
