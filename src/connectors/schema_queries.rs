//! Introspection SQL per dialect
//!
//! Pure query builders; execution and row shaping happen in the SQL
//! connector. PostgreSQL casts catalog columns to TEXT because the Any
//! driver does not decode the NAME type.

use crate::error::GatewayError;
use crate::types::SourceType;

/// SQL to list user schemas, excluding system ones. Empty string means
/// the dialect has no schema concept (SQLite answers `["main"]` without a
/// query).
pub fn schemas_query(source_type: SourceType) -> String {
    match source_type {
        SourceType::Postgres => "SELECT CAST(schema_name AS TEXT) AS schema_name \
             FROM information_schema.schemata \
             WHERE schema_name NOT IN ('pg_catalog', 'information_schema', 'pg_toast') \
             ORDER BY schema_name"
            .to_string(),
        // Aliased because MySQL 8 reports information_schema labels in
        // uppercase when left bare
        SourceType::Mysql | SourceType::Mariadb => "SELECT schema_name AS schema_name \
             FROM information_schema.schemata \
             WHERE schema_name NOT IN ('information_schema', 'mysql', 'performance_schema', 'sys') \
             ORDER BY schema_name"
            .to_string(),
        SourceType::Sqlite => String::new(),
        _ => String::new(),
    }
}

/// SQL to list base tables of a schema, plus bind parameters. The
/// optional LIKE pattern narrows by table name.
pub fn tables_query(
    source_type: SourceType,
    schema: Option<&str>,
    pattern: Option<&str>,
) -> (String, Vec<String>) {
    match source_type {
        SourceType::Postgres => {
            let mut sql = "SELECT CAST(table_name AS TEXT) AS table_name \
                 FROM information_schema.tables \
                 WHERE table_schema = $1 AND table_type = 'BASE TABLE'"
                .to_string();
            let mut params = vec![schema.unwrap_or("public").to_string()];
            if let Some(p) = pattern {
                sql.push_str(" AND table_name LIKE $2");
                params.push(p.to_string());
            }
            sql.push_str(" ORDER BY table_name");
            (sql, params)
        }
        SourceType::Mysql | SourceType::Mariadb => {
            let mut sql = String::from(
                "SELECT table_name AS table_name FROM information_schema.tables \
                 WHERE table_type = 'BASE TABLE'",
            );
            let mut params = Vec::new();
            match schema {
                Some(s) => {
                    sql.push_str(" AND table_schema = ?");
                    params.push(s.to_string());
                }
                None => sql.push_str(" AND table_schema = DATABASE()"),
            }
            if let Some(p) = pattern {
                sql.push_str(" AND table_name LIKE ?");
                params.push(p.to_string());
            }
            sql.push_str(" ORDER BY table_name");
            (sql, params)
        }
        SourceType::Sqlite => {
            let mut sql = String::from(
                "SELECT name AS table_name FROM sqlite_master \
                 WHERE type = 'table' AND name NOT LIKE 'sqlite_%'",
            );
            let mut params = Vec::new();
            if let Some(p) = pattern {
                sql.push_str(" AND name LIKE ?");
                params.push(p.to_string());
            }
            sql.push_str(" ORDER BY name");
            (sql, params)
        }
        _ => (String::new(), Vec::new()),
    }
}

/// SQL returning `column_name, data_type, is_nullable, column_default`
/// for one table.
///
/// SQLite's PRAGMA cannot be parameterized, so the identifier is
/// validated before interpolation.
pub fn columns_query(
    source_type: SourceType,
    schema: &str,
    table: &str,
) -> Result<(String, Vec<String>), GatewayError> {
    match source_type {
        SourceType::Postgres => Ok((
            "SELECT CAST(column_name AS TEXT) AS column_name, \
                    CAST(data_type AS TEXT) AS data_type, \
                    CAST(is_nullable AS TEXT) AS is_nullable, \
                    CAST(column_default AS TEXT) AS column_default \
             FROM information_schema.columns \
             WHERE table_schema = $1 AND table_name = $2 \
             ORDER BY ordinal_position"
                .to_string(),
            vec![schema.to_string(), table.to_string()],
        )),
        SourceType::Mysql | SourceType::Mariadb => Ok((
            "SELECT column_name AS column_name, data_type AS data_type, \
                    is_nullable AS is_nullable, column_default AS column_default \
             FROM information_schema.columns \
             WHERE table_schema = ? AND table_name = ? \
             ORDER BY ordinal_position"
                .to_string(),
            vec![schema.to_string(), table.to_string()],
        )),
        SourceType::Sqlite => {
            validate_identifier(table)?;
            // PRAGMA columns (cid, name, type, notnull, dflt_value, pk)
            // are reshaped by the connector
            Ok((format!("PRAGMA table_info({})", table), Vec::new()))
        }
        _ => Err(unsupported(source_type)),
    }
}

/// SQL returning index rows for one table. MySQL rows come one per
/// index-column and are grouped in Rust, avoiding GROUP_CONCAT
/// truncation.
pub fn indexes_query(
    source_type: SourceType,
    schema: &str,
    table: &str,
) -> Result<(String, Vec<String>), GatewayError> {
    match source_type {
        SourceType::Postgres => Ok((
            "SELECT CAST(i.relname AS TEXT) AS index_name, \
                    array_to_string(array_agg(CAST(a.attname AS TEXT)), ',') AS column_names, \
                    ix.indisunique AS is_unique, \
                    ix.indisprimary AS is_primary \
             FROM pg_class t \
             JOIN pg_index ix ON t.oid = ix.indrelid \
             JOIN pg_class i ON i.oid = ix.indexrelid \
             JOIN pg_attribute a ON a.attrelid = t.oid AND a.attnum = ANY(ix.indkey) \
             JOIN pg_namespace ns ON ns.oid = t.relnamespace \
             WHERE t.relkind = 'r' AND t.relname = $2 AND ns.nspname = $1 \
             GROUP BY i.relname, ix.indisunique, ix.indisprimary \
             ORDER BY i.relname"
                .to_string(),
            vec![schema.to_string(), table.to_string()],
        )),
        SourceType::Mysql | SourceType::Mariadb => Ok((
            "SELECT index_name AS index_name, column_name AS column_name, \
                    seq_in_index AS seq_in_index, \
                    NOT non_unique AS is_unique, \
                    index_name = 'PRIMARY' AS is_primary \
             FROM information_schema.statistics \
             WHERE table_schema = ? AND table_name = ? \
             ORDER BY index_name, seq_in_index"
                .to_string(),
            vec![schema.to_string(), table.to_string()],
        )),
        SourceType::Sqlite => {
            validate_identifier(table)?;
            Ok((format!("PRAGMA index_list({})", table), Vec::new()))
        }
        _ => Err(unsupported(source_type)),
    }
}

/// SQL listing stored routines in a schema. None when the dialect has no
/// routines (SQLite).
pub fn procedures_query(
    source_type: SourceType,
    schema: &str,
) -> Option<(String, Vec<String>)> {
    match source_type {
        SourceType::Postgres => Some((
            "SELECT CAST(routine_name AS TEXT) AS procedure_name, \
                    CASE WHEN routine_type = 'PROCEDURE' THEN 'procedure' ELSE 'function' END \
                        AS procedure_type, \
                    CAST(external_language AS TEXT) AS language \
             FROM information_schema.routines \
             WHERE routine_schema = $1 \
             ORDER BY routine_name"
                .to_string(),
            vec![schema.to_string()],
        )),
        SourceType::Mysql | SourceType::Mariadb => Some((
            "SELECT routine_name AS procedure_name, \
                    CASE WHEN routine_type = 'PROCEDURE' THEN 'procedure' ELSE 'function' END \
                        AS procedure_type, \
                    external_language AS language \
             FROM information_schema.routines \
             WHERE routine_schema = ? \
             ORDER BY routine_name"
                .to_string(),
            vec![schema.to_string()],
        )),
        _ => None,
    }
}

/// SQL fetching one routine's full detail, definition included.
pub fn procedure_detail_query(
    source_type: SourceType,
    schema: &str,
    name: &str,
) -> Result<(String, Vec<String>), GatewayError> {
    match source_type {
        SourceType::Postgres => Ok((
            "SELECT CAST(p.proname AS TEXT) AS procedure_name, \
                    CASE p.prokind WHEN 'p' THEN 'procedure' ELSE 'function' END \
                        AS procedure_type, \
                    CAST(l.lanname AS TEXT) AS language, \
                    pg_get_function_arguments(p.oid) AS parameter_list, \
                    pg_get_function_result(p.oid) AS return_type, \
                    pg_get_functiondef(p.oid) AS definition \
             FROM pg_proc p \
             JOIN pg_namespace n ON n.oid = p.pronamespace \
             JOIN pg_language l ON l.oid = p.prolang \
             WHERE n.nspname = $1 AND p.proname = $2 \
             LIMIT 1"
                .to_string(),
            vec![schema.to_string(), name.to_string()],
        )),
        SourceType::Mysql | SourceType::Mariadb => Ok((
            "SELECT routine_name AS procedure_name, \
                    CASE WHEN routine_type = 'PROCEDURE' THEN 'procedure' ELSE 'function' END \
                        AS procedure_type, \
                    external_language AS language, \
                    CAST(NULL AS CHAR) AS parameter_list, \
                    dtd_identifier AS return_type, \
                    routine_definition AS definition \
             FROM information_schema.routines \
             WHERE routine_schema = ? AND routine_name = ? \
             LIMIT 1"
                .to_string(),
            vec![schema.to_string(), name.to_string()],
        )),
        _ => Err(unsupported(source_type)),
    }
}

/// Default schema per dialect. None means it must be queried at runtime
/// (MySQL's `SELECT DATABASE()`).
pub fn default_schema(source_type: SourceType) -> Option<&'static str> {
    match source_type {
        SourceType::Postgres => Some("public"),
        SourceType::Mysql | SourceType::Mariadb => None,
        SourceType::Sqlite => Some("main"),
        SourceType::Sqlserver => Some("dbo"),
        _ => None,
    }
}

fn unsupported(source_type: SourceType) -> GatewayError {
    GatewayError::UnsupportedDatabase(format!(
        "no live driver for {} in this build",
        source_type
    ))
}

/// Identifier check for spots where a name must be interpolated (SQLite
/// PRAGMA takes no bind parameters).
pub fn validate_identifier(name: &str) -> Result<(), GatewayError> {
    if name.is_empty() {
        return Err(GatewayError::InvalidArgument(
            "identifier cannot be empty".into(),
        ));
    }
    if name.len() > 64 {
        return Err(GatewayError::InvalidArgument(format!(
            "identifier too long: {} characters (max 64)",
            name.len()
        )));
    }
    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(GatewayError::InvalidArgument(format!(
            "invalid identifier '{}': only alphanumeric and underscore allowed",
            name
        )));
    }
    if name
        .chars()
        .next()
        .map(|c| c.is_ascii_digit())
        .unwrap_or(false)
    {
        return Err(GatewayError::InvalidArgument(format!(
            "identifier cannot start with a digit: '{}'",
            name
        )));
    }
    const KEYWORDS: [&str; 19] = [
        "SELECT", "INSERT", "UPDATE", "DELETE", "DROP", "CREATE", "ALTER", "TABLE", "INDEX",
        "VIEW", "TRIGGER", "PRAGMA", "ATTACH", "DETACH", "BEGIN", "COMMIT", "ROLLBACK",
        "VACUUM", "ANALYZE",
    ];
    if KEYWORDS.contains(&name.to_uppercase().as_str()) {
        return Err(GatewayError::InvalidArgument(format!(
            "identifier cannot be a SQL keyword: '{}'",
            name
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifier_validation() {
        assert!(validate_identifier("users").is_ok());
        assert!(validate_identifier("_private").is_ok());
        assert!(validate_identifier("table_123").is_ok());

        assert!(validate_identifier("").is_err());
        assert!(validate_identifier("users; DROP TABLE users").is_err());
        assert!(validate_identifier("123table").is_err());
        assert!(validate_identifier("SELECT").is_err());
        assert!(validate_identifier("users'").is_err());
    }

    #[test]
    fn test_sqlite_pragma_injection_blocked() {
        assert!(columns_query(SourceType::Sqlite, "main", "users)").is_err());
        let (sql, params) = columns_query(SourceType::Sqlite, "main", "users").unwrap();
        assert_eq!(sql, "PRAGMA table_info(users)");
        assert!(params.is_empty());
    }

    #[test]
    fn test_placeholder_styles_match_dialect() {
        let (sql, params) = tables_query(SourceType::Postgres, Some("public"), Some("emp%"));
        assert!(sql.contains("$1") && sql.contains("$2"));
        assert_eq!(params, vec!["public", "emp%"]);

        let (sql, params) = tables_query(SourceType::Mysql, None, None);
        assert!(sql.contains("DATABASE()"));
        assert!(params.is_empty());
    }

    #[test]
    fn test_no_live_driver_errors() {
        assert!(columns_query(SourceType::Oracle, "s", "t").is_err());
        assert!(indexes_query(SourceType::Dameng, "s", "t").is_err());
        assert!(procedures_query(SourceType::Sqlite, "main").is_none());
    }
}
