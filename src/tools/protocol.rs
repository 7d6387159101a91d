//! Protocol-specific tools: `redis_command` and `elasticsearch_search`

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{RegisteredTool, ToolAnnotations, ToolHandler};
use crate::error::GatewayError;
use crate::source::SourceManager;

pub(super) fn register_redis(
    suffix: &str,
    source_id: &str,
    manager: Arc<SourceManager>,
) -> RegisteredTool {
    RegisteredTool {
        name: format!("redis_command{}", suffix),
        description: format!(
            "Run a Redis command against source '{}', e.g. 'HSET user:2 name Bob' \
             or 'KEYS session:*'. KEYS results are truncated to the source's \
             max_rows cap",
            source_id
        ),
        input_schema: json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "Whitespace-separated command; quote arguments with spaces"
                }
            },
            "required": ["command"]
        }),
        annotations: ToolAnnotations::mutating(),
        source_id: source_id.to_string(),
        command_field: "command",
        handler: Arc::new(CommandTool {
            manager,
            source_id: source_id.to_string(),
            arg_key: "command",
        }),
    }
}

pub(super) fn register_elasticsearch(
    suffix: &str,
    source_id: &str,
    manager: Arc<SourceManager>,
) -> RegisteredTool {
    RegisteredTool {
        name: format!("elasticsearch_search{}", suffix),
        description: format!(
            "Search source '{}'. Accepts JSON ({{\"index\", \"query\", \"aggs\", \
             \"size\"}}) or the short form 'index:logs status:error'",
            source_id
        ),
        input_schema: json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Search request, JSON or simplified syntax"
                }
            },
            "required": ["query"]
        }),
        annotations: ToolAnnotations::read_only(),
        source_id: source_id.to_string(),
        command_field: "query",
        handler: Arc::new(CommandTool {
            manager,
            source_id: source_id.to_string(),
            arg_key: "query",
        }),
    }
}

/// Shared handler: pull one string argument, hand it to the connector's
/// command path.
struct CommandTool {
    manager: Arc<SourceManager>,
    source_id: String,
    arg_key: &'static str,
}

#[async_trait]
impl ToolHandler for CommandTool {
    async fn call(&self, args: &serde_json::Map<String, Value>) -> Result<Value, GatewayError> {
        let command = args
            .get(self.arg_key)
            .and_then(Value::as_str)
            .ok_or_else(|| GatewayError::MissingParameter(self.arg_key.into()))?;

        let connector = self.manager.connector(Some(&self.source_id))?;
        let options = self.manager.execute_options(Some(&self.source_id))?;
        let value = connector.execute_command(command, &options).await?;

        let mut data = match value {
            Value::Object(map) => Value::Object(map),
            other => json!({ "value": other }),
        };
        data["source_id"] = json!(self.source_id);
        Ok(data)
    }
}
