//! `execute_sql` tool: arbitrary SQL against one source

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{RegisteredTool, ToolAnnotations, ToolHandler};
use crate::error::GatewayError;
use crate::source::SourceManager;
use crate::sql::{allowed_keywords, is_read_only_multi, split_statements};

pub(super) fn register(
    suffix: &str,
    source_id: &str,
    readonly: bool,
    manager: Arc<SourceManager>,
) -> RegisteredTool {
    let description = format!(
        "Execute SQL against source '{}'. Multiple statements separated by \
         semicolons run in one session (one transaction on PostgreSQL). \
         Results are returned per statement as JSON rows{}",
        source_id,
        if readonly {
            "; this source is read-only"
        } else {
            ""
        }
    );
    RegisteredTool {
        name: format!("execute_sql{}", suffix),
        description,
        input_schema: json!({
            "type": "object",
            "properties": {
                "sql": {
                    "type": "string",
                    "description": "SQL to execute; may contain multiple statements"
                }
            },
            "required": ["sql"]
        }),
        annotations: if readonly {
            ToolAnnotations::read_only()
        } else {
            ToolAnnotations::mutating()
        },
        source_id: source_id.to_string(),
        command_field: "sql",
        handler: Arc::new(ExecuteSqlTool {
            manager,
            source_id: source_id.to_string(),
        }),
    }
}

struct ExecuteSqlTool {
    manager: Arc<SourceManager>,
    source_id: String,
}

#[async_trait]
impl ToolHandler for ExecuteSqlTool {
    async fn call(&self, args: &serde_json::Map<String, Value>) -> Result<Value, GatewayError> {
        let sql = args
            .get("sql")
            .and_then(Value::as_str)
            .ok_or_else(|| GatewayError::MissingParameter("sql".into()))?;

        let connector = self.manager.connector(Some(&self.source_id))?;
        let options = self.manager.execute_options(Some(&self.source_id))?;
        let source_type = connector.source_type();

        // Hard gate: on a readonly source the connector is never reached
        // with a mutating statement
        if options.readonly
            && source_type.is_sql()
            && !is_read_only_multi(sql, source_type)
        {
            return Err(GatewayError::ReadOnlyViolation {
                source_id: self.source_id.clone(),
                allowed: allowed_keywords(source_type).join(", "),
            });
        }

        let results = connector.execute_sql(sql, &options).await?;

        // Per-statement texts from the same top-level split the connector
        // uses, so counts line up even for batches
        let statement_texts = split_statements(sql, Some(source_type));
        let statements: Vec<Value> = results
            .iter()
            .enumerate()
            .map(|(i, result)| {
                json!({
                    "sql": statement_texts.get(i).cloned().unwrap_or_default(),
                    "rows": result.rows,
                    "count": result.row_count,
                })
            })
            .collect();

        Ok(json!({
            "statements": statements,
            "source_id": self.source_id,
        }))
    }
}
