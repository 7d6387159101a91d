//! Tool registry and dispatch
//!
//! One tool instance per (source, capability) pair. The first configured
//! source keeps the unsuffixed names (`execute_sql`); later sources get
//! `execute_sql_<id>`. Every invocation is recorded, successes and
//! failures alike.

pub mod custom;
pub mod execute_sql;
pub mod protocol;
pub mod search_objects;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};

use crate::config::CustomToolConfig;
use crate::error::GatewayError;
use crate::requests::RequestStore;
use crate::source::SourceManager;
use crate::types::SourceType;

/// Prefixes reserved for built-in tool families; custom tools must not
/// collide with them.
pub const BUILTIN_PREFIXES: [&str; 4] = [
    "execute_sql",
    "search_objects",
    "redis_command",
    "elasticsearch_search",
];

/// One content block of a tool response.
#[derive(Debug, Clone, Serialize)]
pub struct ToolContent {
    #[serde(rename = "type")]
    pub content_type: &'static str,
    pub text: String,
}

/// Wire envelope handed back to the transport.
#[derive(Debug, Clone, Serialize)]
pub struct ToolResponse {
    pub content: Vec<ToolContent>,
    #[serde(rename = "isError", skip_serializing_if = "Option::is_none")]
    pub is_error: Option<bool>,
}

impl ToolResponse {
    fn text(payload: &Value, is_error: bool) -> Self {
        Self {
            content: vec![ToolContent {
                content_type: "text",
                text: payload.to_string(),
            }],
            is_error: is_error.then_some(true),
        }
    }

    pub fn success(data: Value) -> Self {
        Self::text(&json!({ "success": true, "data": data }), false)
    }

    pub fn failure(message: &str, code: &str) -> Self {
        Self::text(
            &json!({ "success": false, "error": message, "code": code }),
            true,
        )
    }

    /// The embedded JSON document, reparsed (for tests and the HTTP API).
    pub fn payload(&self) -> Option<Value> {
        self.content
            .first()
            .and_then(|c| serde_json::from_str(&c.text).ok())
    }
}

/// Behavior hints surfaced alongside the tool schema.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ToolAnnotations {
    pub read_only: bool,
    pub destructive: bool,
    pub idempotent: bool,
}

impl ToolAnnotations {
    pub fn read_only() -> Self {
        Self {
            read_only: true,
            destructive: false,
            idempotent: true,
        }
    }

    pub fn mutating() -> Self {
        Self {
            read_only: false,
            destructive: true,
            idempotent: false,
        }
    }
}

/// The callable bound into a registered tool.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, args: &serde_json::Map<String, Value>) -> Result<Value, GatewayError>;
}

/// A registered tool: schema, annotations and the closure bound to its
/// source.
pub struct RegisteredTool {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
    pub annotations: ToolAnnotations,
    pub source_id: String,
    /// Argument key whose value is recorded as the invocation command;
    /// empty records the whole argument object
    command_field: &'static str,
    handler: Arc<dyn ToolHandler>,
}

/// Tool name → instance table plus dispatch glue.
pub struct ToolRegistry {
    tools: Vec<RegisteredTool>,
    by_name: HashMap<String, usize>,
    requests: Arc<RequestStore>,
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("by_name", &self.by_name)
            .finish()
    }
}

impl ToolRegistry {
    /// Register built-in tools for every source, then user-defined tools.
    pub fn build(
        manager: Arc<SourceManager>,
        requests: Arc<RequestStore>,
        custom_tools: &[CustomToolConfig],
    ) -> Result<Self, GatewayError> {
        let mut registry = Self {
            tools: Vec::new(),
            by_name: HashMap::new(),
            requests,
        };

        let ids: Vec<String> = manager.source_ids().to_vec();
        for (position, id) in ids.iter().enumerate() {
            // Backward compatibility: the default source keeps the bare
            // tool names
            let suffix = if position == 0 {
                String::new()
            } else {
                format!("_{}", id)
            };
            let connector = manager.connector(Some(id))?;
            let options = manager.execute_options(Some(id))?;
            let source_type = connector.source_type();

            registry.add(execute_sql::register(
                &suffix,
                id,
                options.readonly,
                manager.clone(),
            ))?;
            registry.add(search_objects::register(&suffix, id, manager.clone()))?;

            if source_type == SourceType::Redis {
                registry.add(protocol::register_redis(&suffix, id, manager.clone()))?;
            }
            if source_type == SourceType::Elasticsearch {
                registry.add(protocol::register_elasticsearch(
                    &suffix,
                    id,
                    manager.clone(),
                ))?;
            }
        }

        for tool_config in custom_tools {
            let tool = custom::register(tool_config, &manager, &registry)?;
            registry.add(tool)?;
        }

        Ok(registry)
    }

    fn add(&mut self, tool: RegisteredTool) -> Result<(), GatewayError> {
        if self.by_name.contains_key(&tool.name) {
            return Err(GatewayError::Config(format!(
                "duplicate tool name '{}'",
                tool.name
            )));
        }
        self.by_name.insert(tool.name.clone(), self.tools.len());
        self.tools.push(tool);
        Ok(())
    }

    pub fn tools(&self) -> &[RegisteredTool] {
        &self.tools
    }

    pub fn get(&self, name: &str) -> Option<&RegisteredTool> {
        self.by_name.get(name).map(|&i| &self.tools[i])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// Invoke a tool. Errors become structured failure responses; every
    /// invocation lands in the request store with the caller's identity.
    pub async fn dispatch(&self, name: &str, arguments: Value, client: &str) -> ToolResponse {
        let Some(tool) = self.get(name) else {
            return ToolResponse::failure(
                &format!("unknown tool '{}'", name),
                crate::error::codes::INVALID_ARGUMENT,
            );
        };

        let args = match arguments {
            Value::Object(map) => map,
            Value::Null => serde_json::Map::new(),
            _ => {
                return ToolResponse::failure(
                    "tool arguments must be a JSON object",
                    crate::error::codes::INVALID_ARGUMENT,
                );
            }
        };

        let command = if tool.command_field.is_empty() {
            Value::Object(args.clone()).to_string()
        } else {
            args.get(tool.command_field)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };

        let started = Instant::now();
        let outcome = tool.handler.call(&args).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(data) => {
                self.requests
                    .add(&tool.source_id, name, &command, duration_ms, client, None);
                ToolResponse::success(data)
            }
            Err(error) => {
                // Connector-level readonly refusals carry no source id
                let error = match error {
                    GatewayError::ReadOnlyViolation { source_id, allowed }
                        if source_id.is_empty() =>
                    {
                        GatewayError::ReadOnlyViolation {
                            source_id: tool.source_id.clone(),
                            allowed,
                        }
                    }
                    other => other,
                };
                let message = error.to_string();
                if error.is_client_error() {
                    log::debug!("tool '{}' rejected: {}", name, message);
                } else {
                    log::error!("tool '{}' failed: {}", name, message);
                }
                self.requests.add(
                    &tool.source_id,
                    name,
                    &command,
                    duration_ms,
                    client,
                    Some(message.clone()),
                );
                ToolResponse::failure(&message, error.code())
            }
        }
    }
}
