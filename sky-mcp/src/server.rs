//! MCP Server
//!
//! Per-session method handling: handshake, ping, and the tool surface.
//! Transport and session state live in [`crate::session`].

use std::sync::Arc;

use crate::protocol::{
    methods, negotiate_protocol_version, CallToolParams, CallToolResult, InitializeParams,
    InitializeResult, JsonRpcError, JsonRpcRequest, JsonRpcResponse, ListToolsResult, McpTool,
    ServerCapabilities, ServerInfo, ToolContent, ToolsCapability,
};
use crate::tools::Tool;

/// Name reported in `serverInfo`
pub const SERVER_NAME: &str = "sky-mcp";

/// MCP method dispatcher for one session
pub struct McpServer {
    tools: Vec<Arc<dyn Tool>>,
}

impl McpServer {
    /// Create a new MCP server with the given tools
    pub fn new(tools: Vec<Arc<dyn Tool>>) -> Self {
        Self { tools }
    }

    fn mcp_tools(&self) -> Vec<McpTool> {
        self.tools
            .iter()
            .map(|tool| McpTool {
                name: tool.name().to_string(),
                description: Some(tool.description().to_string()),
                input_schema: tool.input_schema(),
            })
            .collect()
    }

    /// Handle a JSON-RPC request (a message with an id)
    pub async fn handle_request(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        match request.method.as_str() {
            methods::INITIALIZE => self.handle_initialize(request),
            methods::PING => JsonRpcResponse::from_result(request.id, &serde_json::json!({})),
            methods::TOOLS_LIST => self.handle_tools_list(request),
            methods::TOOLS_CALL => self.handle_tools_call(request).await,
            _ => JsonRpcResponse::error(request.id, JsonRpcError::method_not_found(&request.method)),
        }
    }

    /// Handle a notification. Nothing is sent back.
    pub fn handle_notification(&self, notification: &JsonRpcRequest) {
        match notification.method.as_str() {
            methods::INITIALIZED => tracing::debug!("Client finished initialization"),
            other => tracing::debug!(method = other, "Ignoring notification"),
        }
    }

    fn handle_initialize(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        let params: InitializeParams = match request.params.map(serde_json::from_value) {
            Some(Ok(params)) => params,
            Some(Err(e)) => {
                return JsonRpcResponse::error(
                    request.id,
                    JsonRpcError::invalid_params(format!("Invalid initialize params: {e}")),
                )
            }
            None => {
                return JsonRpcResponse::error(
                    request.id,
                    JsonRpcError::invalid_params("Missing initialize params"),
                )
            }
        };

        let protocol_version = negotiate_protocol_version(&params.protocol_version);
        tracing::debug!(
            client = %params.client_info.name,
            client_version = %params.client_info.version,
            requested = %params.protocol_version,
            negotiated = protocol_version,
            "MCP initialize"
        );

        let result = InitializeResult {
            protocol_version: protocol_version.into(),
            capabilities: ServerCapabilities {
                tools: Some(ToolsCapability { list_changed: false }),
            },
            server_info: ServerInfo {
                name: SERVER_NAME.into(),
                version: env!("CARGO_PKG_VERSION").into(),
            },
        };

        JsonRpcResponse::from_result(request.id, &result)
    }

    fn handle_tools_list(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        let result = ListToolsResult {
            tools: self.mcp_tools(),
        };
        JsonRpcResponse::from_result(request.id, &result)
    }

    async fn handle_tools_call(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        let id = request.id;

        let params: CallToolParams = match request.params {
            Some(p) => match serde_json::from_value(p) {
                Ok(params) => params,
                Err(e) => {
                    return JsonRpcResponse::error(
                        id,
                        JsonRpcError::invalid_params(format!("Invalid tool call params: {e}")),
                    );
                }
            },
            None => {
                return JsonRpcResponse::error(
                    id,
                    JsonRpcError::invalid_params("Missing tool call params"),
                );
            }
        };

        let Some(tool) = self.tools.iter().find(|t| t.name() == params.name) else {
            let result = CallToolResult {
                content: vec![ToolContent::text(format!("Tool not found: {}", params.name))],
                is_error: true,
            };
            return JsonRpcResponse::from_result(id, &result);
        };

        let args = serde_json::Value::Object(params.arguments.into_iter().collect());

        let result = match tool.execute(args).await {
            Ok(tool_result) if tool_result.success => CallToolResult {
                content: vec![ToolContent::text(tool_result.output)],
                is_error: false,
            },
            Ok(tool_result) => CallToolResult {
                content: vec![ToolContent::text(
                    tool_result.error.unwrap_or(tool_result.output),
                )],
                is_error: true,
            },
            Err(e) => {
                tracing::warn!(tool = %params.name, error = %e, "Tool execution failed");
                CallToolResult {
                    content: vec![ToolContent::text(format!("Tool execution failed: {e}"))],
                    is_error: true,
                }
            }
        };

        JsonRpcResponse::from_result(id, &result)
    }
}
