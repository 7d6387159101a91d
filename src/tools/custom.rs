//! User-defined SQL tools
//!
//! Loaded after sources connect. A definition binds a named statement to
//! one source; its placeholders must agree with the declared parameter
//! list, and arguments only reach the database through the driver's bind
//! API.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{RegisteredTool, ToolAnnotations, ToolHandler, ToolRegistry, BUILTIN_PREFIXES};
use crate::config::CustomToolConfig;
use crate::error::GatewayError;
use crate::source::SourceManager;
use crate::sql::{
    allowed_keywords, bind_arguments, extract_placeholders, input_schema, is_read_only_multi,
    validate_declarations, validate_spec, ToolParamSpec,
};

pub(super) fn register(
    config: &CustomToolConfig,
    manager: &Arc<SourceManager>,
    registry: &ToolRegistry,
) -> Result<RegisteredTool, GatewayError> {
    let name = config.name.trim();
    if name.is_empty() {
        return Err(GatewayError::Config("custom tool name cannot be empty".into()));
    }
    let fail = |message: String| GatewayError::Config(format!("tool '{}': {}", name, message));

    if config.description.trim().is_empty() {
        return Err(fail("description cannot be empty".into()));
    }
    if config.source.trim().is_empty() {
        return Err(fail("source cannot be empty".into()));
    }
    if config.statement.trim().is_empty() {
        return Err(fail("statement cannot be empty".into()));
    }
    if !manager.has_source(&config.source) {
        return Err(fail(format!(
            "unknown source '{}' (available: {})",
            config.source,
            manager.source_ids().join(", ")
        )));
    }
    if let Some(prefix) = BUILTIN_PREFIXES.iter().find(|p| name.starts_with(**p)) {
        return Err(fail(format!(
            "name collides with the built-in '{}' tool family",
            prefix
        )));
    }
    if registry.contains(name) {
        return Err(fail("duplicate tool name".into()));
    }

    let connector = manager.connector(Some(&config.source))?;
    let source_type = connector.source_type();

    // Placeholder discovery goes through the tokenizer, so markers in
    // strings and comments are invisible here
    let placeholders = extract_placeholders(&config.statement, source_type)
        .map_err(|e| fail(e.to_string()))?;
    validate_declarations(&config.parameters, &placeholders).map_err(|e| fail(e.to_string()))?;
    for spec in &config.parameters {
        validate_spec(spec).map_err(|e| fail(e.to_string()))?;
    }

    // Classified once at registration; drives the tool annotations
    let read_only_statement =
        !source_type.is_sql() || is_read_only_multi(&config.statement, source_type);

    Ok(RegisteredTool {
        name: name.to_string(),
        description: config.description.clone(),
        input_schema: input_schema(&config.parameters),
        annotations: if read_only_statement {
            ToolAnnotations::read_only()
        } else {
            ToolAnnotations::mutating()
        },
        source_id: config.source.clone(),
        command_field: "",
        handler: Arc::new(CustomSqlTool {
            manager: manager.clone(),
            source_id: config.source.clone(),
            statement: config.statement.clone(),
            parameters: config.parameters.clone(),
            read_only_statement,
        }),
    })
}

struct CustomSqlTool {
    manager: Arc<SourceManager>,
    source_id: String,
    statement: String,
    parameters: Vec<ToolParamSpec>,
    read_only_statement: bool,
}

#[async_trait]
impl ToolHandler for CustomSqlTool {
    async fn call(&self, args: &serde_json::Map<String, Value>) -> Result<Value, GatewayError> {
        let connector = self.manager.connector(Some(&self.source_id))?;
        let mut options = self.manager.execute_options(Some(&self.source_id))?;

        if options.readonly && !self.read_only_statement {
            return Err(GatewayError::ReadOnlyViolation {
                source_id: self.source_id.clone(),
                allowed: allowed_keywords(connector.source_type()).join(", "),
            });
        }

        let bound = bind_arguments(&self.parameters, args)?;
        options.params = bound.into_iter().map(|(_, value)| value).collect();

        let results = connector.execute_sql(&self.statement, &options).await?;
        let statements: Vec<Value> = results
            .iter()
            .map(|result| {
                json!({
                    "sql": self.statement,
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
