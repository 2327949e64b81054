//! Database connectivity and query execution.

mod connection;
pub mod metadata;
mod query;

pub use connection::{connect, connect_options, Database};
pub use metadata::{
    ColumnInfo, ConstraintInfo, DatabaseInfo, HealthStatus, IndexInfo, MetadataQueries,
    SchemaInfo, TableInfo,
};
pub use query::{QueryExecutor, QueryResult};
