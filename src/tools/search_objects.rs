//! `search_objects` tool: schema/table/column/procedure/index discovery
//! with LIKE-style patterns and tiered detail

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{RegisteredTool, ToolAnnotations, ToolHandler};
use crate::error::GatewayError;
use crate::source::SourceManager;

const DEFAULT_LIMIT: usize = 100;
const MAX_LIMIT: usize = 1000;

pub(super) fn register(
    suffix: &str,
    source_id: &str,
    manager: Arc<SourceManager>,
) -> RegisteredTool {
    RegisteredTool {
        name: format!("search_objects{}", suffix),
        description: format!(
            "Search database objects (schemas, tables, columns, procedures, \
             indexes) in source '{}' with a LIKE pattern and a detail tier",
            source_id
        ),
        input_schema: json!({
            "type": "object",
            "properties": {
                "object_type": {
                    "type": "string",
                    "enum": ["schema", "table", "column", "procedure", "index"],
                    "description": "Kind of object to search"
                },
                "pattern": {
                    "type": "string",
                    "description": "LIKE pattern (% and _ wildcards); defaults to %",
                    "default": "%"
                },
                "schema": {
                    "type": "string",
                    "description": "Schema to search in; defaults to the dialect default"
                },
                "detail_level": {
                    "type": "string",
                    "enum": ["names", "summary", "full"],
                    "default": "names"
                },
                "limit": {
                    "type": "integer",
                    "description": "Maximum results (1-1000)",
                    "default": 100
                }
            },
            "required": ["object_type"]
        }),
        annotations: ToolAnnotations::read_only(),
        source_id: source_id.to_string(),
        command_field: "",
        handler: Arc::new(SearchObjectsTool {
            manager,
            source_id: source_id.to_string(),
        }),
    }
}

struct SearchObjectsTool {
    manager: Arc<SourceManager>,
    source_id: String,
}

#[async_trait]
impl ToolHandler for SearchObjectsTool {
    async fn call(&self, args: &serde_json::Map<String, Value>) -> Result<Value, GatewayError> {
        let object_type = args
            .get("object_type")
            .and_then(Value::as_str)
            .ok_or_else(|| GatewayError::MissingParameter("object_type".into()))?;
        let pattern = args
            .get("pattern")
            .and_then(Value::as_str)
            .unwrap_or("%");
        let schema = args.get("schema").and_then(Value::as_str);
        let detail_level = args
            .get("detail_level")
            .and_then(Value::as_str)
            .unwrap_or("names");
        if !matches!(detail_level, "names" | "summary" | "full") {
            return Err(GatewayError::InvalidArgument(format!(
                "detail_level must be names, summary or full, not '{}'",
                detail_level
            )));
        }
        let limit = match args.get("limit") {
            None => DEFAULT_LIMIT,
            Some(v) => {
                let n = v.as_u64().ok_or_else(|| {
                    GatewayError::InvalidArgument("limit must be a positive integer".into())
                })? as usize;
                if n == 0 || n > MAX_LIMIT {
                    return Err(GatewayError::InvalidArgument(format!(
                        "limit must be between 1 and {}",
                        MAX_LIMIT
                    )));
                }
                n
            }
        };

        let connector = self.manager.connector(Some(&self.source_id))?;

        let matcher = LikeMatcher::new(pattern);
        let results = match object_type {
            "schema" => {
                let names: Vec<String> = connector
                    .get_schemas()
                    .await?
                    .into_iter()
                    .filter(|n| matcher.matches(n))
                    .take(limit)
                    .collect();
                json!({ "schemas": names })
            }
            "table" => {
                let names: Vec<String> = connector
                    .get_tables(schema)
                    .await?
                    .into_iter()
                    .filter(|n| matcher.matches(n))
                    .take(limit)
                    .collect();
                match detail_level {
                    "names" => json!({ "tables": names }),
                    _ => {
                        let mut tables = Vec::with_capacity(names.len());
                        for name in &names {
                            let columns = connector.get_table_columns(name, schema).await?;
                            let entry = if detail_level == "summary" {
                                json!({ "name": name, "column_count": columns.len() })
                            } else {
                                let indexes = connector
                                    .get_table_indexes(name, schema)
                                    .await
                                    .unwrap_or_default();
                                json!({
                                    "name": name,
                                    "columns": columns,
                                    "indexes": indexes,
                                })
                            };
                            tables.push(entry);
                        }
                        json!({ "tables": tables })
                    }
                }
            }
            "column" => {
                let mut columns = Vec::new();
                'tables: for table in connector.get_tables(schema).await? {
                    for column in connector.get_table_columns(&table, schema).await? {
                        if matcher.matches(&column.column_name) {
                            columns.push(match detail_level {
                                "names" => json!({
                                    "table": table,
                                    "column": column.column_name,
                                }),
                                _ => json!({
                                    "table": table,
                                    "column": column.column_name,
                                    "data_type": column.data_type,
                                    "is_nullable": column.is_nullable,
                                    "column_default": column.column_default,
                                }),
                            });
                            if columns.len() == limit {
                                break 'tables;
                            }
                        }
                    }
                }
                json!({ "columns": columns })
            }
            "procedure" => {
                let names: Vec<String> = connector
                    .get_stored_procedures(schema)
                    .await?
                    .into_iter()
                    .filter(|n| matcher.matches(n))
                    .take(limit)
                    .collect();
                if detail_level == "full" {
                    let mut procedures = Vec::with_capacity(names.len());
                    for name in &names {
                        match connector.get_stored_procedure_detail(name, schema).await {
                            Ok(detail) => procedures.push(serde_json::to_value(detail)
                                .unwrap_or_else(|_| json!({ "name": name }))),
                            Err(e) => {
                                log::warn!("procedure detail for '{}' failed: {}", name, e);
                                procedures.push(json!({ "name": name }));
                            }
                        }
                    }
                    json!({ "procedures": procedures })
                } else {
                    json!({ "procedures": names })
                }
            }
            "index" => {
                let mut indexes = Vec::new();
                'outer: for table in connector.get_tables(schema).await? {
                    let table_indexes = match connector.get_table_indexes(&table, schema).await {
                        Ok(list) => list,
                        Err(e) => {
                            log::warn!("index listing for '{}' failed: {}", table, e);
                            continue;
                        }
                    };
                    for index in table_indexes {
                        if matcher.matches(&index.index_name) {
                            indexes.push(json!({
                                "table": table,
                                "index_name": index.index_name,
                                "column_names": index.column_names,
                                "is_unique": index.is_unique,
                                "is_primary": index.is_primary,
                            }));
                            if indexes.len() == limit {
                                break 'outer;
                            }
                        }
                    }
                }
                json!({ "indexes": indexes })
            }
            other => {
                return Err(GatewayError::InvalidArgument(format!(
                    "object_type must be schema, table, column, procedure or index, not '{}'",
                    other
                )));
            }
        };

        Ok(json!({
            "object_type": object_type,
            "pattern": pattern,
            "results": results,
            "source_id": self.source_id,
        }))
    }
}

/// SQL LIKE semantics: `%` matches any run, `_` one character,
/// case-insensitive as most catalogs compare.
struct LikeMatcher {
    regex: Option<regex::Regex>,
}

impl LikeMatcher {
    fn new(pattern: &str) -> Self {
        if pattern == "%" {
            return Self { regex: None };
        }
        let mut expr = String::with_capacity(pattern.len() + 8);
        expr.push('^');
        for c in pattern.chars() {
            match c {
                '%' => expr.push_str(".*"),
                '_' => expr.push('.'),
                c => expr.push_str(&regex::escape(&c.to_string())),
            }
        }
        expr.push('$');
        Self {
            regex: regex::RegexBuilder::new(&expr)
                .case_insensitive(true)
                .build()
                .ok(),
        }
    }

    fn matches(&self, name: &str) -> bool {
        match &self.regex {
            None => true,
            Some(regex) => regex.is_match(name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_like_matcher() {
        let m = LikeMatcher::new("emp%");
        assert!(m.matches("employees"));
        assert!(m.matches("EMP_HISTORY"));
        assert!(!m.matches("departments"));

        let m = LikeMatcher::new("%_id");
        assert!(m.matches("user_id"));
        assert!(!m.matches("id"));

        let m = LikeMatcher::new("user_");
        assert!(m.matches("users"));
        assert!(!m.matches("user"));
        assert!(!m.matches("user_accounts"));

        // Regex metacharacters in the pattern are literals
        let m = LikeMatcher::new("a.b%");
        assert!(m.matches("a.bc"));
        assert!(!m.matches("axbc"));

        let m = LikeMatcher::new("%");
        assert!(m.matches("anything"));
    }
}
