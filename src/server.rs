//! MCP server struct definition and initialization.

use crate::config::{ConnectionDescriptor, ServerConfig};
use crate::database::{Database, MetadataQueries, QueryExecutor};
use crate::trust_bundle::TrustBundleCache;
use rmcp::handler::server::router::tool::ToolRouter;
use std::sync::Arc;

/// The PostgreSQL MCP Server instance.
///
/// This struct is cloned for each request, but the inner state is shared
/// via Arc. All tools run over one connection opened at startup.
#[derive(Clone)]
pub struct PostgresMcpServer {
    /// Shared database connection.
    pub(crate) db: Arc<Database>,

    /// Operational configuration.
    pub(crate) config: Arc<ServerConfig>,

    /// Read-only query executor.
    pub(crate) executor: Arc<QueryExecutor>,

    /// Catalog queries.
    pub(crate) metadata: Arc<MetadataQueries>,

    /// RDS trust bundle cache, for diagnostics.
    pub(crate) bundles: Arc<TrustBundleCache>,

    /// `host:port/database` of the connection, without credentials.
    pub(crate) endpoint: String,

    /// Tool router for dispatching tool calls.
    pub(crate) tool_router: ToolRouter<Self>,
}

impl PostgresMcpServer {
    /// Create a server over an established connection.
    pub fn new(
        db: Arc<Database>,
        bundles: Arc<TrustBundleCache>,
        config: ServerConfig,
        descriptor: &ConnectionDescriptor,
    ) -> Self {
        let executor = Arc::new(QueryExecutor::new(db.clone(), config.query.clone()));
        let metadata = Arc::new(MetadataQueries::new(db.clone()));

        Self {
            db,
            config: Arc::new(config),
            executor,
            metadata,
            bundles,
            endpoint: descriptor.display_target(),
            tool_router: Self::create_tool_router(),
        }
    }

    /// Get a reference to the configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Get a reference to the shared connection.
    pub fn database(&self) -> &Arc<Database> {
        &self.db
    }

    /// Connection target, safe for display.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::config::TlsMode;
    use crate::trust_bundle::{BundleSource, MemoryBundleStore};
    use async_trait::async_trait;
    use tokio::io::AsyncWrite;

    struct UnreachableSource;

    #[async_trait]
    impl BundleSource for UnreachableSource {
        async fn download(
            &self,
            _url: &str,
            _dest: &mut (dyn AsyncWrite + Send + Unpin),
        ) -> Result<u64, crate::error::TrustBundleError> {
            Err(crate::error::TrustBundleError::Status(503))
        }
    }

    /// A server whose connection is already closed, backed by an in-memory bundle store.
    pub(crate) fn disconnected_server(store: Arc<MemoryBundleStore>) -> PostgresMcpServer {
        let descriptor = ConnectionDescriptor {
            host: "localhost".to_string(),
            port: 5432,
            user: "postgres".to_string(),
            password: "postgres".to_string(),
            database: "postgres".to_string(),
            tls_mode: TlsMode::Disabled,
        };
        let bundles = TrustBundleCache::new("/work", store, Arc::new(UnreachableSource));

        PostgresMcpServer::new(
            Arc::new(Database::disconnected(TlsMode::Disabled)),
            Arc::new(bundles),
            ServerConfig::default(),
            &descriptor,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::disconnected_server;
    use crate::trust_bundle::MemoryBundleStore;
    use std::sync::Arc;

    #[test]
    fn test_endpoint_has_no_credentials() {
        let server = disconnected_server(Arc::new(MemoryBundleStore::new()));
        assert_eq!(server.endpoint(), "localhost:5432/postgres");
        assert!(!server.endpoint().contains("postgres@"));
    }

    #[tokio::test]
    async fn test_closed_database_rejects_acquire() {
        let server = disconnected_server(Arc::new(MemoryBundleStore::new()));
        assert!(server.database().acquire().await.is_err());
    }
}
