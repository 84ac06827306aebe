//! MCP Protocol Types
//!
//! JSON-RPC 2.0 envelopes and the subset of MCP used by this server
//! (handshake, ping, tools).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ══════════════════════════════════════════════════════════════════════════════
// JSON-RPC 2.0 Types
// ══════════════════════════════════════════════════════════════════════════════

/// JSON-RPC 2.0 request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<JsonRpcId>,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

impl JsonRpcRequest {
    pub fn new(id: impl Into<JsonRpcId>, method: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0".into(),
            id: Some(id.into()),
            method: method.into(),
            params: None,
        }
    }

    pub fn with_params(mut self, params: serde_json::Value) -> Self {
        self.params = Some(params);
        self
    }
}

/// JSON-RPC 2.0 response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    /// Serialized as `null` when unknown, as JSON-RPC requires
    pub id: Option<JsonRpcId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    pub fn success(id: impl Into<JsonRpcId>, result: serde_json::Value) -> Self {
        Self {
            jsonrpc: "2.0".into(),
            id: Some(id.into()),
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: Option<JsonRpcId>, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: "2.0".into(),
            id,
            result: None,
            error: Some(error),
        }
    }

    /// Serialize `result` into a success response, or an internal error.
    pub fn from_result<T: Serialize>(id: Option<JsonRpcId>, result: &T) -> Self {
        match (id, serde_json::to_value(result)) {
            (Some(id), Ok(value)) => Self::success(id, value),
            (id, Ok(_)) => Self::error(id, JsonRpcError::invalid_request("Missing request id")),
            (id, Err(e)) => Self::error(
                id,
                JsonRpcError::internal_error(format!("Failed to serialize response: {e}")),
            ),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    pub fn error_code(&self) -> Option<i32> {
        self.error.as_ref().map(|e| e.code)
    }
}

/// JSON-RPC ID (can be string or number)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(untagged)]
pub enum JsonRpcId {
    Number(i64),
    String(String),
}

impl From<i64> for JsonRpcId {
    fn from(n: i64) -> Self {
        Self::Number(n)
    }
}

impl From<&str> for JsonRpcId {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for JsonRpcId {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

/// Standard JSON-RPC error codes
pub mod error_codes {
    pub const PARSE_ERROR: i32 = -32700;
    pub const INVALID_REQUEST: i32 = -32600;
    pub const METHOD_NOT_FOUND: i32 = -32601;
    pub const INVALID_PARAMS: i32 = -32602;
    pub const INTERNAL_ERROR: i32 = -32603;
    /// Transport-level rejection (no usable session)
    pub const SERVER_ERROR: i32 = -32000;
}

/// JSON-RPC error object
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl JsonRpcError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// Parse error (-32700)
    pub fn parse_error(msg: impl Into<String>) -> Self {
        Self::new(error_codes::PARSE_ERROR, msg)
    }

    /// Invalid request (-32600)
    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::new(error_codes::INVALID_REQUEST, msg)
    }

    /// Method not found (-32601)
    pub fn method_not_found(method: &str) -> Self {
        Self::new(error_codes::METHOD_NOT_FOUND, format!("Method not found: {method}"))
    }

    /// Invalid params (-32602)
    pub fn invalid_params(msg: impl Into<String>) -> Self {
        Self::new(error_codes::INVALID_PARAMS, msg)
    }

    /// Internal error (-32603)
    pub fn internal_error(msg: impl Into<String>) -> Self {
        Self::new(error_codes::INTERNAL_ERROR, msg)
    }

    /// Server error (-32000)
    pub fn server_error(msg: impl Into<String>) -> Self {
        Self::new(error_codes::SERVER_ERROR, msg)
    }
}

/// A decoded message posted by a client.
#[derive(Debug, Clone)]
pub enum IncomingMessage {
    Request(JsonRpcRequest),
    Notification(JsonRpcRequest),
    /// Reply to a server-initiated request; accepted and ignored
    Response(serde_json::Value),
}

impl IncomingMessage {
    /// Classify a single JSON-RPC message. The error carries the request id
    /// when one could be recovered.
    pub fn classify(value: serde_json::Value) -> Result<Self, JsonRpcResponse> {
        let id = value
            .get("id")
            .cloned()
            .and_then(|id| serde_json::from_value::<JsonRpcId>(id).ok());

        if !value.is_object() {
            return Err(JsonRpcResponse::error(
                None,
                JsonRpcError::invalid_request("Message must be a JSON object"),
            ));
        }

        if value.get("method").is_some() {
            let request: JsonRpcRequest = serde_json::from_value(value).map_err(|e| {
                JsonRpcResponse::error(
                    id.clone(),
                    JsonRpcError::invalid_request(format!("Invalid request: {e}")),
                )
            })?;
            if request.jsonrpc != "2.0" {
                return Err(JsonRpcResponse::error(
                    id,
                    JsonRpcError::invalid_request("Unsupported jsonrpc version"),
                ));
            }
            return Ok(if request.id.is_some() {
                Self::Request(request)
            } else {
                Self::Notification(request)
            });
        }

        if value.get("result").is_some() || value.get("error").is_some() {
            return Ok(Self::Response(value));
        }

        Err(JsonRpcResponse::error(
            id,
            JsonRpcError::invalid_request("Not a JSON-RPC request, notification, or response"),
        ))
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// MCP Protocol Types
// ══════════════════════════════════════════════════════════════════════════════

/// Protocol versions this server speaks, newest first
pub const SUPPORTED_PROTOCOL_VERSIONS: &[&str] =
    &["2025-06-18", "2025-03-26", "2024-11-05", "2024-10-07"];

/// Latest MCP protocol version
pub const LATEST_PROTOCOL_VERSION: &str = "2025-06-18";

/// Echo the client's version if supported, otherwise offer the latest.
pub fn negotiate_protocol_version(requested: &str) -> &'static str {
    SUPPORTED_PROTOCOL_VERSIONS
        .iter()
        .copied()
        .find(|v| *v == requested)
        .unwrap_or(LATEST_PROTOCOL_VERSION)
}

/// MCP server capabilities
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerCapabilities {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<ToolsCapability>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolsCapability {
    #[serde(default)]
    pub list_changed: bool,
}

/// MCP client capabilities; unknown capabilities are ignored
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientCapabilities {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roots: Option<RootsCapability>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sampling: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RootsCapability {
    #[serde(default)]
    pub list_changed: bool,
}

/// MCP server info
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerInfo {
    pub name: String,
    pub version: String,
}

/// MCP client info
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientInfo {
    pub name: String,
    pub version: String,
}

// ── Initialize ─────────────────────────────────────────────────────────────

/// Initialize request params
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeParams {
    pub protocol_version: String,
    pub capabilities: ClientCapabilities,
    pub client_info: ClientInfo,
}

/// Initialize response result
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeResult {
    pub protocol_version: String,
    pub capabilities: ServerCapabilities,
    pub server_info: ServerInfo,
}

/// True when `message` is a well-formed `initialize` request: the right
/// method, a non-null id, and params that parse as [`InitializeParams`].
pub fn is_initialize_request(message: &serde_json::Value) -> bool {
    let Some(obj) = message.as_object() else {
        return false;
    };
    if obj.get("method").and_then(serde_json::Value::as_str) != Some(methods::INITIALIZE) {
        return false;
    }
    if obj.get("id").map_or(true, serde_json::Value::is_null) {
        return false;
    }
    obj.get("params")
        .cloned()
        .is_some_and(|p| serde_json::from_value::<InitializeParams>(p).is_ok())
}

// ── Tools ──────────────────────────────────────────────────────────────────

/// MCP Tool definition
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct McpTool {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub input_schema: serde_json::Value,
}

/// List tools result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListToolsResult {
    pub tools: Vec<McpTool>,
}

/// Call tool request params
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallToolParams {
    pub name: String,
    #[serde(default)]
    pub arguments: HashMap<String, serde_json::Value>,
}

/// Tool call result
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallToolResult {
    pub content: Vec<ToolContent>,
    #[serde(default)]
    pub is_error: bool,
}

/// Content types returned by tools
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ToolContent {
    #[serde(rename = "text")]
    Text { text: String },
}

impl ToolContent {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }
}

// ── Method Names ───────────────────────────────────────────────────────────

/// MCP method names
pub mod methods {
    pub const INITIALIZE: &str = "initialize";
    pub const INITIALIZED: &str = "notifications/initialized";
    pub const PING: &str = "ping";
    pub const TOOLS_LIST: &str = "tools/list";
    pub const TOOLS_CALL: &str = "tools/call";
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn init_message(id: serde_json::Value) -> serde_json::Value {
        json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": "initialize",
            "params": {
                "protocolVersion": "2025-03-26",
                "capabilities": {},
                "clientInfo": {"name": "test", "version": "1.0"}
            }
        })
    }

    #[test]
    fn test_jsonrpc_request_serialization() {
        let req = JsonRpcRequest::new(1i64, "tools/list");
        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains("\"jsonrpc\":\"2.0\""));
        assert!(json.contains("\"method\":\"tools/list\""));
        assert!(!json.contains("params"));
    }

    #[test]
    fn test_error_response_has_null_id() {
        let resp = JsonRpcResponse::error(None, JsonRpcError::parse_error("bad"));
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["id"], serde_json::Value::Null);
        assert_eq!(json["error"]["code"], -32700);
        assert!(json.get("result").is_none());
    }

    #[test]
    fn test_jsonrpc_id_variants() {
        let num: JsonRpcId = serde_json::from_str("42").unwrap();
        assert_eq!(num, JsonRpcId::Number(42));
        let s: JsonRpcId = serde_json::from_str("\"abc\"").unwrap();
        assert_eq!(s, JsonRpcId::String("abc".into()));
    }

    #[test]
    fn test_initialize_detection() {
        assert!(is_initialize_request(&init_message(json!(1))));
        assert!(is_initialize_request(&init_message(json!("init-1"))));
        assert!(!is_initialize_request(&init_message(json!(null))));

        let mut no_params = init_message(json!(1));
        no_params.as_object_mut().unwrap().remove("params");
        assert!(!is_initialize_request(&no_params));

        let mut bad_params = init_message(json!(1));
        bad_params["params"] = json!({"protocolVersion": "2025-03-26"});
        assert!(!is_initialize_request(&bad_params));

        let ping = json!({"jsonrpc": "2.0", "id": 1, "method": "ping"});
        assert!(!is_initialize_request(&ping));
        assert!(!is_initialize_request(&json!([init_message(json!(1))])));
    }

    #[test]
    fn test_version_negotiation() {
        assert_eq!(negotiate_protocol_version("2024-11-05"), "2024-11-05");
        assert_eq!(negotiate_protocol_version("2025-03-26"), "2025-03-26");
        assert_eq!(negotiate_protocol_version("1999-01-01"), LATEST_PROTOCOL_VERSION);
    }

    #[test]
    fn test_classify_messages() {
        let request = IncomingMessage::classify(json!({"jsonrpc":"2.0","id":1,"method":"ping"}));
        assert!(matches!(request, Ok(IncomingMessage::Request(_))));

        let notification = IncomingMessage::classify(
            json!({"jsonrpc":"2.0","method":"notifications/initialized"}),
        );
        assert!(matches!(notification, Ok(IncomingMessage::Notification(_))));

        let response = IncomingMessage::classify(json!({"jsonrpc":"2.0","id":5,"result":{}}));
        assert!(matches!(response, Ok(IncomingMessage::Response(_))));

        let wrong_version =
            IncomingMessage::classify(json!({"jsonrpc":"1.0","id":7,"method":"ping"})).unwrap_err();
        assert_eq!(wrong_version.error_code(), Some(error_codes::INVALID_REQUEST));
        assert_eq!(wrong_version.id, Some(JsonRpcId::Number(7)));

        let junk = IncomingMessage::classify(json!("hello")).unwrap_err();
        assert_eq!(junk.error_code(), Some(error_codes::INVALID_REQUEST));
    }

    #[test]
    fn test_call_tool_result_serialization() {
        let result = CallToolResult {
            content: vec![ToolContent::text("[]")],
            is_error: false,
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json, json!({"content": [{"type": "text", "text": "[]"}], "isError": false}));
    }

    #[test]
    fn test_capabilities_use_camel_case() {
        let caps = ServerCapabilities {
            tools: Some(ToolsCapability { list_changed: false }),
        };
        let json = serde_json::to_value(&caps).unwrap();
        assert_eq!(json, json!({"tools": {"listChanged": false}}));
    }
}
