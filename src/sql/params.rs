//! Placeholder discovery and parameter binding for user-defined tools
//!
//! Placeholders are discovered through the tokenizer so markers inside
//! strings and comments are never counted. Values only ever reach the
//! database through the driver's bind API.

use std::collections::BTreeSet;

use lazy_regex::{lazy_regex, Lazy, Regex};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::GatewayError;
use crate::sql::tokenizer::{tokenize, TokenKind};
use crate::types::{ParamValue, SourceType};

/// Declared type of a user-defined tool parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Integer,
    Float,
    Boolean,
    Array,
}

impl ParamType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Float => "float",
            Self::Boolean => "boolean",
            Self::Array => "array",
        }
    }

    /// JSON Schema type keyword for the generated tool schema.
    pub fn json_type(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Float => "number",
            Self::Boolean => "boolean",
            Self::Array => "array",
        }
    }
}

/// One declared parameter of a user-defined tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolParamSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub param_type: ParamType,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub default: Option<Value>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub allowed_values: Option<Vec<Value>>,
}

/// Placeholder style used by a dialect's bind API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceholderStyle {
    /// `$1..$N` (PostgreSQL)
    DollarNumbered,
    /// `?` (MySQL, MariaDB, SQLite)
    Question,
    /// `@p1..@pN` (SQL Server)
    AtNumbered,
    /// `:name` (Oracle, DaMeng)
    NamedColon,
}

impl PlaceholderStyle {
    pub fn for_dialect(dialect: SourceType) -> Self {
        match dialect {
            SourceType::Postgres => Self::DollarNumbered,
            SourceType::Sqlserver => Self::AtNumbered,
            SourceType::Oracle | SourceType::Dameng => Self::NamedColon,
            _ => Self::Question,
        }
    }
}

/// Placeholders found in a statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placeholders {
    /// Positional markers; holds the required argument count
    Positional(usize),
    /// Named markers, order-insensitive
    Named(BTreeSet<String>),
}

static DOLLAR_NUMBERED: Lazy<Regex> = lazy_regex!(r"\$(\d+)");
static AT_NUMBERED: Lazy<Regex> = lazy_regex!(r"(?i)@p(\d+)");
static NAMED_COLON: Lazy<Regex> = lazy_regex!(r"(^|[^:\w]):([A-Za-z_]\w*)");

/// Enumerate the placeholders of `sql` under the dialect's convention,
/// looking only at plain spans.
pub fn extract_placeholders(
    sql: &str,
    dialect: SourceType,
) -> Result<Placeholders, GatewayError> {
    let style = PlaceholderStyle::for_dialect(dialect);
    let plain = plain_text(sql, dialect);

    match style {
        PlaceholderStyle::DollarNumbered => {
            numbered_set(&DOLLAR_NUMBERED, &plain, "$")
        }
        PlaceholderStyle::AtNumbered => numbered_set(&AT_NUMBERED, &plain, "@p"),
        PlaceholderStyle::Question => {
            Ok(Placeholders::Positional(
                plain.chars().filter(|c| *c == '?').count(),
            ))
        }
        PlaceholderStyle::NamedColon => {
            let names: BTreeSet<String> = NAMED_COLON
                .captures_iter(&plain)
                .filter_map(|c| c.get(2))
                .map(|m| m.as_str().to_string())
                .collect();
            Ok(Placeholders::Named(names))
        }
    }
}

/// Statement text with comments and quoted blocks blanked out.
fn plain_text(sql: &str, dialect: SourceType) -> String {
    let chars: Vec<char> = sql.chars().collect();
    let mut out = chars.clone();
    for token in tokenize(sql, Some(dialect)) {
        if token.kind != TokenKind::Plain {
            for slot in out.iter_mut().take(token.end).skip(token.start) {
                *slot = ' ';
            }
        }
    }
    out.into_iter().collect()
}

fn numbered_set(re: &Regex, plain: &str, prefix: &str) -> Result<Placeholders, GatewayError> {
    let mut indexes = BTreeSet::new();
    for caps in re.captures_iter(plain) {
        if let Some(m) = caps.get(1) {
            let idx: usize = m.as_str().parse().map_err(|_| {
                GatewayError::InvalidArgument(format!(
                    "placeholder {}{} is out of range",
                    prefix,
                    m.as_str()
                ))
            })?;
            if idx == 0 {
                return Err(GatewayError::InvalidArgument(format!(
                    "placeholder {}0 is invalid; numbering starts at 1",
                    prefix
                )));
            }
            indexes.insert(idx);
        }
    }
    let count = indexes.iter().next_back().copied().unwrap_or(0);
    for expected in 1..=count {
        if !indexes.contains(&expected) {
            return Err(GatewayError::InvalidArgument(format!(
                "placeholder {}{} is referenced but {}{} is missing",
                prefix, count, prefix, expected
            )));
        }
    }
    Ok(Placeholders::Positional(count))
}

/// Registration-time check: the declared parameter list must agree with
/// the placeholders actually present in the statement.
pub fn validate_declarations(
    specs: &[ToolParamSpec],
    placeholders: &Placeholders,
) -> Result<(), GatewayError> {
    match placeholders {
        Placeholders::Positional(count) => {
            if specs.len() != *count {
                return Err(GatewayError::InvalidArgument(format!(
                    "statement has {} placeholder(s) but {} parameter(s) are declared",
                    count,
                    specs.len()
                )));
            }
        }
        Placeholders::Named(names) => {
            let declared: BTreeSet<String> =
                specs.iter().map(|s| s.name.clone()).collect();
            if declared != *names {
                let missing: Vec<&String> = names.difference(&declared).collect();
                let extra: Vec<&String> = declared.difference(names).collect();
                let mut parts = Vec::new();
                if !missing.is_empty() {
                    parts.push(format!("undeclared placeholders: {:?}", missing));
                }
                if !extra.is_empty() {
                    parts.push(format!("unused parameters: {:?}", extra));
                }
                return Err(GatewayError::InvalidArgument(parts.join("; ")));
            }
        }
    }
    Ok(())
}

/// Registration-time check on one parameter declaration.
pub fn validate_spec(spec: &ToolParamSpec) -> Result<(), GatewayError> {
    if spec.name.trim().is_empty() {
        return Err(GatewayError::InvalidArgument(
            "parameter name cannot be empty".into(),
        ));
    }
    if let Some(allowed) = &spec.allowed_values {
        if allowed.is_empty() {
            return Err(GatewayError::InvalidArgument(format!(
                "parameter '{}' declares an empty allowed_values list",
                spec.name
            )));
        }
        if let Some(default) = &spec.default {
            if !allowed.contains(default) {
                return Err(GatewayError::InvalidArgument(format!(
                    "parameter '{}': default {} is not among allowed_values",
                    spec.name, default
                )));
            }
        }
    }
    Ok(())
}

/// Invocation-time binding: coerce each argument to its declared type,
/// apply defaults, and enforce allowed_values. Output order follows the
/// declaration order, which is the positional bind order.
pub fn bind_arguments(
    specs: &[ToolParamSpec],
    args: &serde_json::Map<String, Value>,
) -> Result<Vec<(String, ParamValue)>, GatewayError> {
    let mut bound = Vec::with_capacity(specs.len());
    for spec in specs {
        let raw = match args.get(&spec.name) {
            Some(Value::Null) | None => match &spec.default {
                Some(default) => default.clone(),
                None if spec.required => {
                    return Err(GatewayError::MissingParameter(spec.name.clone()));
                }
                None => Value::Null,
            },
            Some(value) => value.clone(),
        };

        if let Some(allowed) = &spec.allowed_values {
            if !raw.is_null() && !allowed.contains(&raw) {
                return Err(GatewayError::InvalidArgument(format!(
                    "parameter '{}': value {} is not among allowed_values",
                    spec.name, raw
                )));
            }
        }

        let value = coerce(&raw, spec)?;
        bound.push((spec.name.clone(), value));
    }
    Ok(bound)
}

fn coerce(raw: &Value, spec: &ToolParamSpec) -> Result<ParamValue, GatewayError> {
    if raw.is_null() {
        return Ok(ParamValue::Null);
    }
    let mismatch = || {
        GatewayError::InvalidArgument(format!(
            "parameter '{}': expected {}, got {}",
            spec.name,
            spec.param_type.as_str(),
            type_of(raw)
        ))
    };
    match spec.param_type {
        ParamType::String => match raw {
            Value::String(s) => Ok(ParamValue::Text(s.clone())),
            Value::Number(n) => Ok(ParamValue::Text(n.to_string())),
            Value::Bool(b) => Ok(ParamValue::Text(b.to_string())),
            _ => Err(mismatch()),
        },
        ParamType::Integer => match raw {
            Value::Number(n) => n.as_i64().map(ParamValue::Int).ok_or_else(mismatch),
            Value::String(s) => s
                .trim()
                .parse::<i64>()
                .map(ParamValue::Int)
                .map_err(|_| mismatch()),
            _ => Err(mismatch()),
        },
        ParamType::Float => match raw {
            Value::Number(n) => n.as_f64().map(ParamValue::Float).ok_or_else(mismatch),
            Value::String(s) => s
                .trim()
                .parse::<f64>()
                .map(ParamValue::Float)
                .map_err(|_| mismatch()),
            _ => Err(mismatch()),
        },
        ParamType::Boolean => match raw {
            Value::Bool(b) => Ok(ParamValue::Bool(*b)),
            Value::String(s) => match s.to_lowercase().as_str() {
                "true" | "1" => Ok(ParamValue::Bool(true)),
                "false" | "0" => Ok(ParamValue::Bool(false)),
                _ => Err(mismatch()),
            },
            _ => Err(mismatch()),
        },
        ParamType::Array => match raw {
            Value::Array(items) => Ok(ParamValue::Array(items.clone())),
            _ => Err(mismatch()),
        },
    }
}

fn type_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Build a JSON Schema object for the tool's input from its declared
/// parameters.
pub fn input_schema(specs: &[ToolParamSpec]) -> Value {
    let mut properties = serde_json::Map::new();
    let mut required = Vec::new();
    for spec in specs {
        let mut prop = serde_json::Map::new();
        prop.insert("type".into(), Value::String(spec.param_type.json_type().into()));
        if !spec.description.is_empty() {
            prop.insert("description".into(), Value::String(spec.description.clone()));
        }
        if let Some(allowed) = &spec.allowed_values {
            prop.insert("enum".into(), Value::Array(allowed.clone()));
        }
        if let Some(default) = &spec.default {
            prop.insert("default".into(), default.clone());
        }
        properties.insert(spec.name.clone(), Value::Object(prop));
        if spec.required && spec.default.is_none() {
            required.push(Value::String(spec.name.clone()));
        }
    }
    serde_json::json!({
        "type": "object",
        "properties": properties,
        "required": required,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn spec(name: &str, param_type: ParamType, required: bool) -> ToolParamSpec {
        ToolParamSpec {
            name: name.into(),
            param_type,
            required,
            default: None,
            description: String::new(),
            allowed_values: None,
        }
    }

    #[test]
    fn test_dollar_numbered_extraction() {
        let found =
            extract_placeholders("SELECT * FROM t WHERE a = $1 AND b = $2", SourceType::Postgres)
                .unwrap();
        assert_eq!(found, Placeholders::Positional(2));
    }

    #[test]
    fn test_repeated_dollar_counts_once() {
        let found =
            extract_placeholders("SELECT $1, $1, $2", SourceType::Postgres).unwrap();
        assert_eq!(found, Placeholders::Positional(2));
    }

    #[test]
    fn test_gap_in_numbering_rejected() {
        assert!(extract_placeholders("SELECT $1, $3", SourceType::Postgres).is_err());
    }

    #[test]
    fn test_placeholder_in_string_ignored() {
        let found =
            extract_placeholders("SELECT '$1', \"$2\", $1 FROM t", SourceType::Postgres).unwrap();
        assert_eq!(found, Placeholders::Positional(1));

        let found = extract_placeholders(
            "SELECT '?' FROM t WHERE a = ? -- and ? here",
            SourceType::Mysql,
        )
        .unwrap();
        assert_eq!(found, Placeholders::Positional(1));
    }

    #[test]
    fn test_dollar_quote_body_ignored() {
        let found = extract_placeholders("SELECT $tag$ $1 $2 $tag$, $1", SourceType::Postgres)
            .unwrap();
        assert_eq!(found, Placeholders::Positional(1));
    }

    #[test]
    fn test_named_extraction() {
        let found = extract_placeholders(
            "SELECT * FROM emp WHERE dept = :dept AND hired > :since",
            SourceType::Oracle,
        )
        .unwrap();
        let names: BTreeSet<String> = ["dept", "since"].iter().map(|s| s.to_string()).collect();
        assert_eq!(found, Placeholders::Named(names));
    }

    #[test]
    fn test_double_colon_cast_not_a_placeholder() {
        let found = extract_placeholders("SELECT a::text FROM t WHERE b = :b", SourceType::Dameng)
            .unwrap();
        let names: BTreeSet<String> = ["b"].iter().map(|s| s.to_string()).collect();
        assert_eq!(found, Placeholders::Named(names));
    }

    #[test]
    fn test_at_numbered() {
        let found = extract_placeholders(
            "SELECT * FROM t WHERE a = @p1 AND b = @P2",
            SourceType::Sqlserver,
        )
        .unwrap();
        assert_eq!(found, Placeholders::Positional(2));
    }

    #[test]
    fn test_declaration_validation() {
        let specs = vec![
            spec("a", ParamType::String, true),
            spec("b", ParamType::Integer, true),
        ];
        assert!(validate_declarations(&specs, &Placeholders::Positional(2)).is_ok());
        assert!(validate_declarations(&specs, &Placeholders::Positional(1)).is_err());

        let names: BTreeSet<String> = ["a", "b"].iter().map(|s| s.to_string()).collect();
        assert!(validate_declarations(&specs, &Placeholders::Named(names)).is_ok());
        let wrong: BTreeSet<String> = ["a", "c"].iter().map(|s| s.to_string()).collect();
        assert!(validate_declarations(&specs, &Placeholders::Named(wrong)).is_err());
    }

    #[test]
    fn test_default_must_satisfy_allowed_values() {
        let mut s = spec("status", ParamType::String, false);
        s.allowed_values = Some(vec![json!("open"), json!("closed")]);
        s.default = Some(json!("open"));
        assert!(validate_spec(&s).is_ok());
        s.default = Some(json!("void"));
        assert!(validate_spec(&s).is_err());
    }

    #[test]
    fn test_bind_coercion() {
        let specs = vec![
            spec("n", ParamType::Integer, true),
            spec("ratio", ParamType::Float, true),
            spec("active", ParamType::Boolean, true),
        ];
        let mut args = serde_json::Map::new();
        args.insert("n".into(), json!("42"));
        args.insert("ratio".into(), json!(0.5));
        args.insert("active".into(), json!("true"));
        let bound = bind_arguments(&specs, &args).unwrap();
        assert_eq!(bound[0].1, ParamValue::Int(42));
        assert_eq!(bound[1].1, ParamValue::Float(0.5));
        assert_eq!(bound[2].1, ParamValue::Bool(true));
    }

    #[test]
    fn test_missing_required() {
        let specs = vec![spec("who", ParamType::String, true)];
        let args = serde_json::Map::new();
        let err = bind_arguments(&specs, &args).unwrap_err();
        assert!(matches!(err, GatewayError::MissingParameter(name) if name == "who"));
    }

    #[test]
    fn test_default_fills_missing() {
        let mut s = spec("limit", ParamType::Integer, false);
        s.default = Some(json!(25));
        let bound = bind_arguments(&[s], &serde_json::Map::new()).unwrap();
        assert_eq!(bound[0].1, ParamValue::Int(25));
    }

    #[test]
    fn test_allowed_values_enforced() {
        let mut s = spec("dept", ParamType::String, true);
        s.allowed_values = Some(vec![json!("sales"), json!("eng")]);
        let mut args = serde_json::Map::new();
        args.insert("dept".into(), json!("legal"));
        assert!(bind_arguments(&[s], &args).is_err());
    }

    #[test]
    fn test_input_schema_shape() {
        let mut s = spec("dept", ParamType::String, true);
        s.description = "Department code".into();
        let schema = input_schema(&[s]);
        assert_eq!(schema["type"], "object");
        assert_eq!(schema["properties"]["dept"]["type"], "string");
        assert_eq!(schema["required"][0], "dept");
    }
}
