//! Database-facing connectors behind one uniform interface
//!
//! A connector owns a driver pool for exactly one source. Prototypes are
//! registered per DSN scheme and cloned into fresh instances so no driver
//! state is ever shared between sources.

pub mod elasticsearch;
pub mod redis;
pub mod registry;
pub mod row;
pub mod schema_queries;
pub mod sql;

use std::time::Duration;

use async_trait::async_trait;

use crate::dsn::DsnParser;
use crate::error::GatewayError;
use crate::types::{ExecuteOptions, SourceType, SqlResult, StoredProcedure, TableColumn, TableIndex};

pub use elasticsearch::ElasticsearchConnector;
pub use redis::RedisConnector;
pub use registry::{default_registry, ConnectorRegistry};
pub use sql::SqlConnector;

/// Connect-time settings derived from the source configuration.
#[derive(Debug, Clone)]
pub struct ConnectorConfig {
    pub max_connections: Option<u32>,
    pub connect_timeout: Duration,
    /// Enables driver-level readonly hardening where the backend supports
    /// it (the dispatch-level gate is enforced upstream regardless)
    pub readonly: bool,
    /// Elasticsearch default index pattern
    pub index_pattern: Option<String>,
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            max_connections: None,
            connect_timeout: Duration::from_secs(30),
            readonly: false,
            index_pattern: None,
        }
    }
}

/// Uniform database-facing interface.
///
/// `connect` runs once during startup while the manager still owns the
/// instance exclusively; afterwards the connector is shared read-only and
/// all remaining methods take `&self`.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Stable connector id, matching the canonical DSN scheme.
    fn id(&self) -> &'static str;

    /// Human-readable backend name.
    fn name(&self) -> &'static str;

    /// Source type this connector serves.
    fn source_type(&self) -> SourceType;

    /// DSN parser for this connector's scheme family.
    fn dsn_parser(&self) -> DsnParser {
        DsnParser::for_type(self.source_type())
    }

    /// Fresh unconnected instance with the same prototype metadata.
    fn clone_boxed(&self) -> Box<dyn Connector>;

    async fn connect(
        &mut self,
        dsn: &str,
        init_script: Option<&str>,
        config: &ConnectorConfig,
    ) -> Result<(), GatewayError>;

    async fn disconnect(&self) -> Result<(), GatewayError>;

    async fn get_schemas(&self) -> Result<Vec<String>, GatewayError>;

    async fn get_tables(&self, schema: Option<&str>) -> Result<Vec<String>, GatewayError>;

    async fn table_exists(
        &self,
        table: &str,
        schema: Option<&str>,
    ) -> Result<bool, GatewayError> {
        Ok(self
            .get_tables(schema)
            .await?
            .iter()
            .any(|t| t.eq_ignore_ascii_case(table)))
    }

    async fn get_table_columns(
        &self,
        table: &str,
        schema: Option<&str>,
    ) -> Result<Vec<TableColumn>, GatewayError>;

    async fn get_table_indexes(
        &self,
        table: &str,
        schema: Option<&str>,
    ) -> Result<Vec<TableIndex>, GatewayError>;

    async fn get_stored_procedures(
        &self,
        schema: Option<&str>,
    ) -> Result<Vec<String>, GatewayError>;

    async fn get_stored_procedure_detail(
        &self,
        name: &str,
        schema: Option<&str>,
    ) -> Result<StoredProcedure, GatewayError>;

    /// Execute SQL under the given options. Multi-statement input runs
    /// in one session (one transaction on PostgreSQL) and yields one
    /// result per top-level statement, in order.
    async fn execute_sql(
        &self,
        sql: &str,
        options: &ExecuteOptions,
    ) -> Result<Vec<SqlResult>, GatewayError>;

    /// Execute a protocol command (Redis command line, Elasticsearch
    /// query). SQL connectors reject this.
    async fn execute_command(
        &self,
        command: &str,
        options: &ExecuteOptions,
    ) -> Result<serde_json::Value, GatewayError> {
        let _ = (command, options);
        Err(GatewayError::InvalidArgument(format!(
            "{} does not accept protocol commands",
            self.name()
        )))
    }
}

impl std::fmt::Debug for dyn Connector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connector").field("id", &self.id()).finish()
    }
}
