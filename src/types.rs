//! Type definitions shared across the gateway

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::GatewayError;

/// Configured database kind, which doubles as the SQL dialect selector
/// for tokenization, classification and placeholder styles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Postgres,
    Mysql,
    Mariadb,
    Sqlserver,
    Sqlite,
    Oracle,
    Dameng,
    Redis,
    Elasticsearch,
}

impl SourceType {
    /// Detect source type from a DSN scheme prefix.
    pub fn from_dsn(dsn: &str) -> Result<Self, GatewayError> {
        let scheme = dsn.split("://").next().unwrap_or("").to_lowercase();
        Self::from_scheme(&scheme).ok_or_else(|| {
            GatewayError::InvalidDsn(format!("unrecognized scheme '{}'", scheme))
        })
    }

    /// Map a scheme (without `://`) to a source type, honoring aliases.
    pub fn from_scheme(scheme: &str) -> Option<Self> {
        match scheme {
            "postgres" | "postgresql" => Some(Self::Postgres),
            "mysql" => Some(Self::Mysql),
            "mariadb" => Some(Self::Mariadb),
            "sqlserver" | "mssql" => Some(Self::Sqlserver),
            "sqlite" => Some(Self::Sqlite),
            "oracle" => Some(Self::Oracle),
            "dm" | "dameng" => Some(Self::Dameng),
            "redis" | "rediss" => Some(Self::Redis),
            "elasticsearch" => Some(Self::Elasticsearch),
            _ => None,
        }
    }

    /// Canonical scheme used when building DSNs from structured fields.
    pub fn scheme(&self) -> &'static str {
        match self {
            Self::Postgres => "postgres",
            Self::Mysql => "mysql",
            Self::Mariadb => "mariadb",
            Self::Sqlserver => "sqlserver",
            Self::Sqlite => "sqlite",
            Self::Oracle => "oracle",
            Self::Dameng => "dm",
            Self::Redis => "redis",
            Self::Elasticsearch => "elasticsearch",
        }
    }

    /// Default network port, if the type has one.
    pub fn default_port(&self) -> Option<u16> {
        match self {
            Self::Postgres => Some(5432),
            Self::Mysql | Self::Mariadb => Some(3306),
            Self::Sqlserver => Some(1433),
            Self::Sqlite => None,
            Self::Oracle => Some(1521),
            Self::Dameng => Some(5236),
            Self::Redis => Some(6379),
            Self::Elasticsearch => Some(9200),
        }
    }

    /// Whether this type speaks SQL (as opposed to a key-value or
    /// document protocol).
    pub fn is_sql(&self) -> bool {
        !matches!(self, Self::Redis | Self::Elasticsearch)
    }
}

impl std::fmt::Display for SourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Postgres => "PostgreSQL",
            Self::Mysql => "MySQL",
            Self::Mariadb => "MariaDB",
            Self::Sqlserver => "SQL Server",
            Self::Sqlite => "SQLite",
            Self::Oracle => "Oracle",
            Self::Dameng => "DaMeng",
            Self::Redis => "Redis",
            Self::Elasticsearch => "Elasticsearch",
        };
        write!(f, "{}", name)
    }
}

/// Per-source execution policy, fixed at startup and never relaxed by a
/// tool invocation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecuteOptions {
    /// Reject non-read statements before they reach the connector
    pub readonly: bool,

    /// Cap on rows returned by SELECT statements (None = unlimited)
    pub max_rows: Option<usize>,

    /// Per-call deadline in seconds (None = no deadline)
    pub request_timeout_secs: Option<u64>,

    /// Bound parameter values for user-defined tools
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub params: Vec<ParamValue>,
}

/// Tagged parameter value, coerced from the JSON wire form before it
/// reaches the driver's bind API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Array(Vec<serde_json::Value>),
    Null,
}

impl ParamValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "boolean",
            Self::Int(_) => "integer",
            Self::Float(_) => "float",
            Self::Text(_) => "string",
            Self::Array(_) => "array",
            Self::Null => "null",
        }
    }
}

/// Result of executing SQL against one source.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SqlResult {
    /// Result rows as JSON objects keyed by column name
    pub rows: Vec<serde_json::Value>,

    /// Column metadata, when the driver exposes it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<Vec<FieldInfo>>,

    /// Number of rows returned (or affected, for non-result statements)
    pub row_count: usize,
}

/// Column descriptor attached to a [`SqlResult`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldInfo {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub type_name: Option<String>,
}

/// Table column metadata, normalized to the stable snake_case contract
/// regardless of how the backend cases its catalog columns.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct TableColumn {
    pub column_name: String,
    pub data_type: String,
    /// "YES" or "NO", as information_schema reports it
    pub is_nullable: String,
    pub column_default: Option<String>,
}

/// Table index metadata.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct TableIndex {
    pub index_name: String,
    pub column_names: Vec<String>,
    pub is_unique: bool,
    pub is_primary: bool,
}

/// Stored procedure or function detail.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct StoredProcedure {
    pub procedure_name: String,
    /// "procedure" or "function"
    pub procedure_type: String,
    pub language: Option<String>,
    pub parameter_list: Option<String>,
    pub return_type: Option<String>,
    pub definition: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scheme_detection() {
        assert_eq!(
            SourceType::from_dsn("postgresql://u@h/db").ok(),
            Some(SourceType::Postgres)
        );
        assert_eq!(
            SourceType::from_scheme("rediss"),
            Some(SourceType::Redis)
        );
        assert_eq!(SourceType::from_scheme("dm"), Some(SourceType::Dameng));
        assert!(SourceType::from_dsn("bogus://x").is_err());
    }

    #[test]
    fn test_sql_split() {
        assert!(SourceType::Oracle.is_sql());
        assert!(!SourceType::Elasticsearch.is_sql());
    }

    #[test]
    fn test_param_value_untagged_decode() {
        let v: ParamValue = serde_json::from_str("42").unwrap();
        assert_eq!(v, ParamValue::Int(42));
        let v: ParamValue = serde_json::from_str("\"x\"").unwrap();
        assert_eq!(v, ParamValue::Text("x".into()));
    }
}
