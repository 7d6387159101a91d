//! MCP surface: a thin rmcp `ServerHandler` over the tool registry
//!
//! The transport owns JSON-RPC framing and sessions; this adapter only
//! translates between rmcp's model types and the registry's dispatch.

use std::borrow::Cow;
use std::sync::Arc;

use rmcp::model::{
    CallToolRequestParam, CallToolResult, Content, ErrorData, Implementation, ListToolsResult,
    PaginatedRequestParam, ProtocolVersion, ServerCapabilities, ServerInfo, Tool, ToolAnnotations,
};
use rmcp::service::RequestContext;
use rmcp::{transport::stdio, RoleServer, ServerHandler, ServiceExt};
use serde_json::Value;

use crate::requests::STDIO_CLIENT;
use crate::tools::ToolRegistry;

#[derive(Clone)]
pub struct GatewayServer {
    tools: Arc<ToolRegistry>,
}

impl GatewayServer {
    pub fn new(tools: Arc<ToolRegistry>) -> Self {
        Self { tools }
    }

    fn model_tools(&self) -> Vec<Tool> {
        self.tools
            .tools()
            .iter()
            .map(|t| {
                let schema = match &t.input_schema {
                    Value::Object(map) => map.clone(),
                    _ => serde_json::Map::new(),
                };
                Tool::new(
                    Cow::Owned(t.name.clone()),
                    Cow::Owned(t.description.clone()),
                    Arc::new(schema),
                )
                .annotate(ToolAnnotations {
                    title: None,
                    read_only_hint: Some(t.annotations.read_only),
                    destructive_hint: Some(t.annotations.destructive),
                    idempotent_hint: Some(t.annotations.idempotent),
                    open_world_hint: Some(true),
                })
            })
            .collect()
    }
}

impl ServerHandler for GatewayServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::default(),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation::from_build_env(),
            instructions: Some(
                "Multi-database gateway. Use execute_sql[_<source>] for SQL, \
                 search_objects[_<source>] for schema discovery, and the \
                 redis_command / elasticsearch_search tools for protocol \
                 sources."
                    .to_string(),
            ),
        }
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, ErrorData> {
        Ok(ListToolsResult {
            tools: self.model_tools(),
            next_cursor: None,
        })
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, ErrorData> {
        let arguments = request
            .arguments
            .map(Value::Object)
            .unwrap_or(Value::Null);
        let response = self
            .tools
            .dispatch(&request.name, arguments, STDIO_CLIENT)
            .await;

        let blocks: Vec<Content> = response
            .content
            .iter()
            .map(|c| Content::text(c.text.clone()))
            .collect();
        if response.is_error.unwrap_or(false) {
            Ok(CallToolResult::error(blocks))
        } else {
            Ok(CallToolResult::success(blocks))
        }
    }
}

/// Serve the registry over stdio until the client disconnects.
pub async fn serve_stdio(tools: Arc<ToolRegistry>) -> anyhow::Result<()> {
    let service = GatewayServer::new(tools).serve(stdio()).await?;
    service.waiting().await?;
    Ok(())
}
