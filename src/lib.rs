//! Multi-database gateway for AI-agent clients
//!
//! Exposes PostgreSQL, MySQL, MariaDB, SQLite, Redis and Elasticsearch
//! sources (with DSN/dialect handling for SQL Server, Oracle and DaMeng)
//! through typed MCP tools: `execute_sql`, `search_objects`,
//! `redis_command`, `elasticsearch_search` and user-defined SQL tools.

pub mod config;
pub mod connectors;
pub mod dsn;
pub mod error;
pub mod http_api;
pub mod requests;
pub mod server;
pub mod source;
pub mod sql;
pub mod ssh;
pub mod tools;
pub mod types;

// Re-export secrecy types for consumers
pub use secrecy::{ExposeSecret, SecretString};

pub use config::{CustomToolConfig, GatewayConfig, SourceConfig, SshTunnelSettings};
pub use connectors::{default_registry, Connector, ConnectorConfig, ConnectorRegistry};
pub use dsn::{parse_dsn, redact, DsnInfo, DsnParser, TlsMode};
pub use error::GatewayError;
pub use requests::{RequestFilter, RequestRecord, RequestStore};
pub use source::SourceManager;
pub use sql::{
    apply_max_rows, is_read_only, is_read_only_multi, split_statements,
    strip_comments_and_strings,
};
pub use ssh::{establish_tunnel, SshAuth, SshHop, SshTunnel, TunnelSpec};
pub use tools::{ToolRegistry, ToolResponse};
pub use types::{ExecuteOptions, ParamValue, SourceType, SqlResult};
