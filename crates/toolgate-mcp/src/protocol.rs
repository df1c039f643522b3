//! JSON-RPC 2.0 frames and MCP method payloads.
//!
//! One message per line on stdio, one message per POST body on HTTP.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use toolgate_core::ToolCallResult;

use crate::error::TransportError;

/// MCP protocol revision we negotiate in `initialize`.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// JSON-RPC 2.0 request.
#[derive(Debug, Serialize)]
pub(crate) struct JsonRpcRequest {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    pub(crate) fn new(id: u64, method: &str, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            method: method.to_string(),
            params,
        }
    }
}

/// JSON-RPC 2.0 response.
///
/// An `id` of `None` means the frame is a server-side notification rather
/// than a response; the channel drops those.
#[derive(Debug, Deserialize)]
pub(crate) struct JsonRpcResponse {
    #[allow(dead_code)] // Required by serde deserialization, checked in tests
    pub jsonrpc: String,
    pub id: Option<u64>,
    pub result: Option<Value>,
    pub error: Option<JsonRpcError>,
}

/// JSON-RPC 2.0 error object.
#[derive(Debug, Deserialize)]
pub(crate) struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[allow(dead_code)] // Carried for diagnostics only
    pub data: Option<Value>,
}

/// Build a JSON-RPC notification frame (no id, no response expected).
pub(crate) fn notification(method: &str, params: Option<Value>) -> Value {
    json!({
        "jsonrpc": "2.0",
        "method": method,
        "params": params.unwrap_or_else(|| json!({})),
    })
}

/// Parameters for the `initialize` handshake.
pub(crate) fn initialize_params() -> Value {
    json!({
        "protocolVersion": PROTOCOL_VERSION,
        "clientInfo": {
            "name": "toolgate",
            "version": env!("CARGO_PKG_VERSION"),
        },
        "capabilities": {},
    })
}

/// MCP initialize result.
#[derive(Debug, Clone, Deserialize)]
pub struct InitializeResult {
    /// Negotiated protocol version.
    #[serde(rename = "protocolVersion")]
    pub protocol_version: String,
    /// Server identity.
    #[serde(rename = "serverInfo")]
    pub server_info: ServerInfo,
    /// Advertised capabilities.
    #[serde(default)]
    pub capabilities: ServerCapabilities,
}

/// Server information from initialize.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerInfo {
    /// Server name.
    pub name: String,
    /// Server version, if reported.
    #[serde(default)]
    pub version: Option<String>,
}

/// Server capabilities advertised during the handshake.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ServerCapabilities {
    /// Tools capability; absent means the server exposes no tools.
    #[serde(default)]
    pub tools: Option<Value>,
    /// Resources capability (unused by this core).
    #[serde(default)]
    pub resources: Option<Value>,
    /// Prompts capability (unused by this core).
    #[serde(default)]
    pub prompts: Option<Value>,
}

/// Tool entry from `tools/list`.
#[derive(Debug, Clone, Deserialize)]
pub struct RawTool {
    /// Tool name.
    pub name: String,
    /// Human-readable description.
    #[serde(default)]
    pub description: Option<String>,
    /// JSON Schema for input parameters.
    #[serde(default, rename = "inputSchema")]
    pub input_schema: Option<Value>,
}

/// Parse a `tools/list` result into raw tool entries.
pub(crate) fn parse_tool_list(result: &Value) -> Result<Vec<RawTool>, TransportError> {
    let tools_value = result.get("tools").cloned().unwrap_or_else(|| json!([]));
    Ok(serde_json::from_value(tools_value)?)
}

/// Normalize a `tools/call` result.
///
/// MCP returns a content array plus an `isError` flag; an error flag means
/// the tool executed and reported failure.
pub(crate) fn parse_tool_call(result: &Value) -> ToolCallResult {
    let content = result.get("content").cloned().unwrap_or_else(|| json!([]));
    let is_error = result
        .get("isError")
        .and_then(Value::as_bool)
        .unwrap_or(false);

    if is_error {
        let message = content
            .as_array()
            .and_then(|arr| arr.first())
            .and_then(|item| item.get("text"))
            .and_then(Value::as_str)
            .unwrap_or("Unknown error")
            .to_string();
        ToolCallResult::error(message)
    } else {
        ToolCallResult::success(content)
    }
}
