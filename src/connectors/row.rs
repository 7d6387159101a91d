//! sqlx row to JSON conversion
//!
//! Type names vary by backend (Postgres INT4/INT8, MySQL BIGINT, SQLite
//! INTEGER), so extraction matches on the driver's reported type name and
//! falls back to text.

use base64::Engine as _;
use serde_json::{json, Value};
use sqlx::{Column, Row, TypeInfo};

use crate::error::GatewayError;
use crate::types::FieldInfo;

/// Convert one row to a JSON object keyed by column name.
pub fn row_to_json(row: &sqlx::any::AnyRow) -> Result<Value, GatewayError> {
    let mut map = serde_json::Map::new();
    for column in row.columns() {
        let ordinal = column.ordinal();
        let name = column.name().to_string();
        let type_name = column.type_info().name().to_uppercase();
        let value = extract_value(row, ordinal, &name, &type_name)?;
        map.insert(name, value);
    }
    Ok(Value::Object(map))
}

/// Column descriptors for a result set.
pub fn fields_of(row: &sqlx::any::AnyRow) -> Vec<FieldInfo> {
    row.columns()
        .iter()
        .map(|c| FieldInfo {
            name: c.name().to_string(),
            type_name: Some(c.type_info().name().to_string()),
        })
        .collect()
}

fn extract_value(
    row: &sqlx::any::AnyRow,
    ordinal: usize,
    name: &str,
    type_name: &str,
) -> Result<Value, GatewayError> {
    let fail = |what: &str, e: sqlx::Error| {
        GatewayError::ExecutionError(format!(
            "failed to extract column '{}' as {}: {}",
            name, what, e
        ))
    };

    let value = match type_name {
        "TEXT" | "VARCHAR" | "CHAR" | "STRING" | "BPCHAR" | "NAME" | "CITEXT" | "NVARCHAR"
        | "NCHAR" | "CLOB" => match row.try_get::<Option<String>, _>(ordinal) {
            Ok(Some(s)) => Value::String(s),
            Ok(None) => Value::Null,
            Err(e) => return Err(fail("TEXT", e)),
        },
        "INTEGER" | "INT" | "INT2" | "INT4" | "INT8" | "BIGINT" | "SMALLINT" | "MEDIUMINT"
        | "TINYINT" | "SERIAL" | "BIGSERIAL" | "INT UNSIGNED" | "BIGINT UNSIGNED" => {
            match row.try_get::<Option<i64>, _>(ordinal) {
                Ok(Some(v)) => json!(v),
                Ok(None) => Value::Null,
                Err(e) => return Err(fail("INTEGER", e)),
            }
        }
        "BOOLEAN" | "BOOL" | "TINYINT(1)" => match row.try_get::<Option<bool>, _>(ordinal) {
            Ok(Some(b)) => Value::Bool(b),
            Ok(None) => Value::Null,
            // MySQL reports TINYINT(1) but may hand back an int
            Err(_) => match row.try_get::<Option<i64>, _>(ordinal) {
                Ok(Some(v)) => Value::Bool(v != 0),
                Ok(None) => Value::Null,
                Err(e) => return Err(fail("BOOLEAN", e)),
            },
        },
        "REAL" | "FLOAT" | "FLOAT4" | "FLOAT8" | "DOUBLE" | "DOUBLE PRECISION" => {
            match row.try_get::<Option<f64>, _>(ordinal) {
                Ok(Some(v)) => json!(v),
                Ok(None) => Value::Null,
                Err(e) => return Err(fail("FLOAT", e)),
            }
        }
        // The Any driver has no native decimal; try f64, then text
        "NUMERIC" | "DECIMAL" | "NUMBER" => match row.try_get::<Option<f64>, _>(ordinal) {
            Ok(Some(v)) => json!(v),
            Ok(None) => Value::Null,
            Err(_) => match row.try_get::<Option<String>, _>(ordinal) {
                Ok(Some(s)) => Value::String(s),
                Ok(None) => Value::Null,
                Err(e) => return Err(fail("DECIMAL", e)),
            },
        },
        "JSON" | "JSONB" => match row.try_get::<Option<String>, _>(ordinal) {
            Ok(Some(text)) => serde_json::from_str(&text).unwrap_or(Value::String(text)),
            Ok(None) => Value::Null,
            Err(e) => return Err(fail("JSON", e)),
        },
        "BYTEA" | "BLOB" | "BINARY" | "VARBINARY" => {
            match row.try_get::<Option<Vec<u8>>, _>(ordinal) {
                Ok(Some(bytes)) => json!({
                    "type": "base64",
                    "data": base64::engine::general_purpose::STANDARD.encode(&bytes),
                }),
                Ok(None) => Value::Null,
                Err(e) => return Err(fail("BLOB", e)),
            }
        }
        "TIMESTAMP" | "TIMESTAMPTZ" | "DATETIME" | "DATE" | "TIME" | "INTERVAL" | "UUID" => {
            match row.try_get::<Option<String>, _>(ordinal) {
                Ok(Some(s)) => Value::String(s),
                Ok(None) => Value::Null,
                Err(e) => return Err(fail(type_name, e)),
            }
        }
        // Unknown type: prefer text, then integer, then give up with a hint
        _ => match row.try_get::<Option<String>, _>(ordinal) {
            Ok(Some(s)) => Value::String(s),
            Ok(None) => Value::Null,
            Err(_) => match row.try_get::<Option<i64>, _>(ordinal) {
                Ok(Some(v)) => json!(v),
                Ok(None) => Value::Null,
                Err(e) => {
                    return Err(GatewayError::ExecutionError(format!(
                        "unsupported column type '{}' for column '{}': {}. \
                         Consider CAST({} AS TEXT) in the query",
                        type_name, name, e, name
                    )));
                }
            },
        },
    };
    Ok(value)
}

/// Normalize row keys to snake_case lowercase so catalogs that report
/// uppercase (Oracle, DaMeng) or camelCase column names still satisfy the
/// stable introspection contract.
pub fn normalize_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (snake_case(&k), v))
                .collect(),
        ),
        other => other,
    }
}

fn snake_case(name: &str) -> String {
    // ALLCAPS collapses to lowercase; camelCase gets underscores
    if name.chars().all(|c| !c.is_ascii_lowercase()) {
        return name.to_ascii_lowercase();
    }
    let mut out = String::with_capacity(name.len() + 4);
    for (i, c) in name.chars().enumerate() {
        if c.is_ascii_uppercase() {
            if i > 0 {
                out.push('_');
            }
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snake_case() {
        assert_eq!(snake_case("COLUMN_NAME"), "column_name");
        assert_eq!(snake_case("columnName"), "column_name");
        assert_eq!(snake_case("dataType"), "data_type");
        assert_eq!(snake_case("column_name"), "column_name");
        assert_eq!(snake_case("IS_NULLABLE"), "is_nullable");
    }

    #[test]
    fn test_normalize_keys() {
        let row = json!({"COLUMN_NAME": "id", "dataType": "int"});
        let normalized = normalize_keys(row);
        assert_eq!(normalized["column_name"], "id");
        assert_eq!(normalized["data_type"], "int");
    }
}
