//! Tools exposed to MCP sessions.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::buffer::RecentBuffer;

/// Result from executing a tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// Whether the tool succeeded.
    pub success: bool,
    /// Tool output.
    pub output: String,
    /// Error message if failed.
    pub error: Option<String>,
}

impl ToolResult {
    /// Create a successful result.
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
            error: None,
        }
    }

    /// Create a failed result.
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            output: String::new(),
            error: Some(error.into()),
        }
    }
}

/// A capability callable through `tools/call`.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique tool name.
    fn name(&self) -> &str;

    /// Description shown to clients.
    fn description(&self) -> &str;

    /// JSON Schema for arguments.
    fn input_schema(&self) -> serde_json::Value;

    /// Execute the tool with the given arguments.
    async fn execute(&self, args: serde_json::Value) -> anyhow::Result<ToolResult>;
}

/// Returns the buffered posts as a JSON array, newest first.
pub struct GetMessagesTool {
    buffer: Arc<RecentBuffer>,
}

impl GetMessagesTool {
    pub const NAME: &'static str = "getMessages";

    pub fn new(buffer: Arc<RecentBuffer>) -> Self {
        Self { buffer }
    }
}

#[async_trait]
impl Tool for GetMessagesTool {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn description(&self) -> &str {
        "Get the last n messages"
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {}
        })
    }

    async fn execute(&self, _args: serde_json::Value) -> anyhow::Result<ToolResult> {
        let snapshot = self.buffer.snapshot();
        match serde_json::to_string(&snapshot) {
            Ok(json) => Ok(ToolResult::success(json)),
            Err(e) => Ok(ToolResult::failure(format!("Failed to encode messages: {e}"))),
        }
    }
}

/// Tool set bound to every new session.
pub fn session_tools(buffer: Arc<RecentBuffer>) -> Vec<Arc<dyn Tool>> {
    vec![Arc::new(GetMessagesTool::new(buffer))]
}
