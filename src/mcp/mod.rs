//! MCP server: framed JSON-RPC 2.0 over standard input/output.

use crate::router::{RouteRequest, Router};
use rmcp::model::{
    CallToolRequestParam, CallToolResult, Content, ErrorCode, Implementation, ListToolsResult,
    PaginatedRequestParam, ServerCapabilities, ServerInfo, Tool as McpTool,
};
use rmcp::service::RequestContext;
use rmcp::{ErrorData as McpError, RoleServer, ServerHandler, ServiceExt};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info};

/// Maps internal registry names to the external name exposed over MCP, and
/// back. Configuration, not policy.
#[derive(Clone, Default)]
pub struct ToolNameTable {
    external_to_internal: HashMap<String, String>,
    internal_to_external: HashMap<String, String>,
}

impl ToolNameTable {
    pub fn new(pairs: impl IntoIterator<Item = (String, String)>) -> Self {
        let mut table = Self::default();
        for (internal, external) in pairs {
            table.internal_to_external.insert(internal.clone(), external.clone());
            table.external_to_internal.insert(external, internal);
        }
        table
    }

    fn external_of(&self, internal: &str) -> String {
        self.internal_to_external
            .get(internal)
            .cloned()
            .unwrap_or_else(|| internal.to_string())
    }

    fn internal_of(&self, external: &str) -> String {
        self.external_to_internal
            .get(external)
            .cloned()
            .unwrap_or_else(|| external.to_string())
    }
}

fn tool_not_found(name: &str) -> McpError {
    McpError::new(ErrorCode::METHOD_NOT_FOUND, format!("Tool {name} not found"), None)
}

pub struct AgentHubMcpServer {
    router: Arc<Router>,
    names: ToolNameTable,
}

impl AgentHubMcpServer {
    pub fn new(router: Arc<Router>, names: ToolNameTable) -> Self {
        Self { router, names }
    }

    /// Run the stdio transport loop until the peer disconnects.
    pub async fn run(self) -> anyhow::Result<()> {
        let transport = (tokio::io::stdin(), tokio::io::stdout());
        self.serve(transport).await?.waiting().await?;
        Ok(())
    }
}

impl ServerHandler for AgentHubMcpServer {
    fn get_info(&self) -> ServerInfo {
        let mut server_info = Implementation::default();
        server_info.name = "agent-hub".to_string();
        server_info.icons = None;
        server_info.title = Some("Agent Hub".to_string());
        server_info.version = env!("CARGO_PKG_VERSION").to_string();
        server_info.website_url = None;

        let mut info = ServerInfo::default();
        info.server_info = server_info;
        info.capabilities = ServerCapabilities::builder()
            .enable_tools()
            .enable_tool_list_changed()
            .build();
        info
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, McpError> {
        self.list_tools_impl().await
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        self.call_tool_impl(request).await
    }
}

impl AgentHubMcpServer {
    /// Business logic behind `tools/list`, factored out of the trait method so
    /// it can be exercised without constructing a `RequestContext`.
    async fn list_tools_impl(&self) -> Result<ListToolsResult, McpError> {
        let summaries = self.router.registry.list().await;
        let tools = summaries
            .into_iter()
            .map(|summary| {
                let external_name = self.names.external_of(&summary.descriptor.name);
                let schema_map = summary
                    .descriptor
                    .input_schema
                    .as_object()
                    .cloned()
                    .unwrap_or_default();
                let mut tool = McpTool::default();
                tool.name = external_name.into();
                tool.title = None;
                tool.description = Some(summary.descriptor.display_name.clone().into());
                tool.input_schema = Arc::new(schema_map);
                tool.output_schema = None;
                tool.icons = None;
                tool.annotations = None;
                tool
            })
            .collect();
        Ok(ListToolsResult {
            tools,
            next_cursor: None,
            meta: None,
        })
    }

    /// Business logic behind `tools/call`, factored out of the trait method so
    /// it can be exercised without constructing a `RequestContext`.
    async fn call_tool_impl(&self, request: CallToolRequestParam) -> Result<CallToolResult, McpError> {
        let internal_name = self.names.internal_of(request.name.as_ref());
        if self.router.registry.get(&internal_name).await.is_err() {
            return Err(tool_not_found(request.name.as_ref()));
        }

        let arguments = Value::Object(request.arguments.unwrap_or_default());
        let outcome = self
            .router
            .route(RouteRequest::SingleTool {
                tool_name: internal_name,
                input: arguments,
            })
            .await;

        match outcome {
            Ok(value) => {
                let text = serde_json::to_string(&value).unwrap_or_default();
                let mut result = CallToolResult::default();
                result.content = vec![Content::text(text)];
                result.structured_content = Some(value);
                result.is_error = None;
                result.meta = None;
                Ok(result)
            }
            Err(e) => {
                error!(error = %e, "tool call failed");
                let mut result = CallToolResult::default();
                result.content = vec![Content::text(format!("Error: {e}"))];
                result.structured_content = None;
                result.is_error = Some(true);
                result.meta = None;
                Ok(result)
            }
        }
    }
}

pub async fn serve_stdio(router: Arc<Router>, names: ToolNameTable) -> anyhow::Result<()> {
    info!("starting MCP server on stdio");
    AgentHubMcpServer::new(router, names).run().await
}
