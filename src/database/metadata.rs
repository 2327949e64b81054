//! PostgreSQL catalog queries for schema introspection.
//!
//! Every query aggregates its rows into a single JSON value server-side and
//! takes object names as bound parameters, never as interpolated text.

use super::connection::Database;
use crate::error::ServerError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

/// Schema metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaInfo {
    pub schema_name: String,
    pub owner: String,
}

/// Table or view metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableInfo {
    pub schema_name: String,
    pub table_name: String,
    pub table_type: String,
    /// Planner estimate; `None` until the table has been analyzed.
    pub estimated_rows: Option<i64>,
}

/// Column metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub column_name: String,
    pub data_type: String,
    pub is_nullable: bool,
    pub column_default: Option<String>,
    pub ordinal_position: i32,
}

/// Index metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexInfo {
    pub index_name: String,
    pub definition: String,
    pub is_unique: bool,
    pub is_primary: bool,
}

/// Constraint metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstraintInfo {
    pub constraint_name: String,
    pub constraint_type: String,
    pub definition: String,
}

/// Server and session information.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseInfo {
    pub server_version: String,
    pub database: String,
    pub current_user: String,
    pub size_bytes: i64,
    pub size_pretty: String,
    /// Whether the session is encrypted.
    pub ssl: bool,
}

/// Result of a health check.
#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    pub healthy: bool,
    pub latency_ms: u64,
}

const LIST_SCHEMAS: &str = r#"
    SELECT COALESCE(json_agg(s ORDER BY s.schema_name), '[]'::json)
    FROM (
        SELECT n.nspname AS schema_name,
               pg_catalog.pg_get_userbyid(n.nspowner) AS owner
        FROM pg_catalog.pg_namespace n
        WHERE n.nspname NOT LIKE 'pg\_%'
          AND n.nspname <> 'information_schema'
    ) s
"#;

const LIST_TABLES: &str = r#"
    SELECT COALESCE(json_agg(t ORDER BY t.table_name), '[]'::json)
    FROM (
        SELECT n.nspname AS schema_name,
               c.relname AS table_name,
               CASE c.relkind
                   WHEN 'r' THEN 'table'
                   WHEN 'p' THEN 'partitioned table'
                   WHEN 'v' THEN 'view'
                   WHEN 'm' THEN 'materialized view'
                   WHEN 'f' THEN 'foreign table'
               END AS table_type,
               CASE WHEN c.reltuples < 0 THEN NULL ELSE c.reltuples::bigint END AS estimated_rows
        FROM pg_catalog.pg_class c
        JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
        WHERE n.nspname = $1
          AND c.relkind IN ('r', 'p', 'v', 'm', 'f')
    ) t
"#;

const DESCRIBE_TABLE: &str = r#"
    SELECT COALESCE(json_agg(c ORDER BY c.ordinal_position), '[]'::json)
    FROM (
        SELECT a.attname AS column_name,
               pg_catalog.format_type(a.atttypid, a.atttypmod) AS data_type,
               NOT a.attnotnull AS is_nullable,
               pg_catalog.pg_get_expr(d.adbin, d.adrelid) AS column_default,
               a.attnum::int AS ordinal_position
        FROM pg_catalog.pg_attribute a
        JOIN pg_catalog.pg_class t ON t.oid = a.attrelid
        JOIN pg_catalog.pg_namespace n ON n.oid = t.relnamespace
        LEFT JOIN pg_catalog.pg_attrdef d ON d.adrelid = a.attrelid AND d.adnum = a.attnum
        WHERE n.nspname = $1
          AND t.relname = $2
          AND a.attnum > 0
          AND NOT a.attisdropped
    ) c
"#;

const LIST_INDEXES: &str = r#"
    SELECT COALESCE(json_agg(i ORDER BY i.index_name), '[]'::json)
    FROM (
        SELECT ic.relname AS index_name,
               pg_catalog.pg_get_indexdef(x.indexrelid) AS definition,
               x.indisunique AS is_unique,
               x.indisprimary AS is_primary
        FROM pg_catalog.pg_index x
        JOIN pg_catalog.pg_class tc ON tc.oid = x.indrelid
        JOIN pg_catalog.pg_class ic ON ic.oid = x.indexrelid
        JOIN pg_catalog.pg_namespace n ON n.oid = tc.relnamespace
        WHERE n.nspname = $1
          AND tc.relname = $2
    ) i
"#;

const LIST_CONSTRAINTS: &str = r#"
    SELECT COALESCE(json_agg(k ORDER BY k.constraint_name), '[]'::json)
    FROM (
        SELECT con.conname AS constraint_name,
               CASE con.contype
                   WHEN 'p' THEN 'PRIMARY KEY'
                   WHEN 'f' THEN 'FOREIGN KEY'
                   WHEN 'u' THEN 'UNIQUE'
                   WHEN 'c' THEN 'CHECK'
                   WHEN 'x' THEN 'EXCLUDE'
                   ELSE con.contype::text
               END AS constraint_type,
               pg_catalog.pg_get_constraintdef(con.oid, true) AS definition
        FROM pg_catalog.pg_constraint con
        JOIN pg_catalog.pg_class c ON c.oid = con.conrelid
        JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
        WHERE n.nspname = $1
          AND c.relname = $2
    ) k
"#;

const DATABASE_INFO: &str = r#"
    SELECT row_to_json(d)
    FROM (
        SELECT current_setting('server_version') AS server_version,
               current_database() AS database,
               current_user AS "current_user",
               pg_catalog.pg_database_size(current_database()) AS size_bytes,
               pg_catalog.pg_size_pretty(pg_catalog.pg_database_size(current_database())) AS size_pretty,
               COALESCE(
                   (SELECT s.ssl FROM pg_catalog.pg_stat_ssl s WHERE s.pid = pg_catalog.pg_backend_pid()),
                   false
               ) AS ssl
    ) d
"#;

const RELATION_EXISTS: &str = r#"
    SELECT to_json(EXISTS (
        SELECT 1
        FROM pg_catalog.pg_class c
        JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
        WHERE n.nspname = $1 AND c.relname = $2
    ))
"#;

/// Catalog queries over the shared connection.
#[derive(Debug, Clone)]
pub struct MetadataQueries {
    db: Arc<Database>,
}

impl MetadataQueries {
    /// Create a new metadata query runner.
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    async fn fetch<T: DeserializeOwned>(
        &self,
        sql: &str,
        params: &[&str],
    ) -> Result<T, ServerError> {
        let value = self.db.fetch_json(sql, params).await?;
        serde_json::from_value(value)
            .map_err(|e| ServerError::internal(format!("Unexpected catalog row shape: {e}")))
    }

    async fn ensure_relation(&self, schema: &str, table: &str) -> Result<(), ServerError> {
        let exists: bool = self.fetch(RELATION_EXISTS, &[schema, table]).await?;
        if exists {
            Ok(())
        } else {
            Err(ServerError::object_not_found(
                "Table",
                format!("{schema}.{table}"),
            ))
        }
    }

    /// List non-system schemas.
    pub async fn list_schemas(&self) -> Result<Vec<SchemaInfo>, ServerError> {
        self.fetch(LIST_SCHEMAS, &[]).await
    }

    /// List tables, views and similar relations in a schema.
    pub async fn list_tables(&self, schema: &str) -> Result<Vec<TableInfo>, ServerError> {
        self.fetch(LIST_TABLES, &[schema]).await
    }

    /// Columns of a table in ordinal order.
    pub async fn describe_table(
        &self,
        schema: &str,
        table: &str,
    ) -> Result<Vec<ColumnInfo>, ServerError> {
        self.ensure_relation(schema, table).await?;
        self.fetch(DESCRIBE_TABLE, &[schema, table]).await
    }

    /// Indexes of a table.
    pub async fn list_indexes(
        &self,
        schema: &str,
        table: &str,
    ) -> Result<Vec<IndexInfo>, ServerError> {
        self.ensure_relation(schema, table).await?;
        self.fetch(LIST_INDEXES, &[schema, table]).await
    }

    /// Constraints of a table.
    pub async fn list_constraints(
        &self,
        schema: &str,
        table: &str,
    ) -> Result<Vec<ConstraintInfo>, ServerError> {
        self.ensure_relation(schema, table).await?;
        self.fetch(LIST_CONSTRAINTS, &[schema, table]).await
    }

    /// Server version, current database and session details.
    pub async fn database_info(&self) -> Result<DatabaseInfo, ServerError> {
        self.fetch(DATABASE_INFO, &[]).await
    }

    /// Round-trip a trivial statement.
    pub async fn health_check(&self) -> Result<HealthStatus, ServerError> {
        let start = Instant::now();
        let _: i32 = self.fetch("SELECT to_json(1)", &[]).await?;
        Ok(HealthStatus {
            healthy: true,
            latency_ms: start.elapsed().as_millis() as u64,
        })
    }
}
