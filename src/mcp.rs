//! Purpose: Transport-agnostic MCP JSON-RPC core for the driver.
//! Key exports: `McpDispatcher`, `McpHandler`, request/response envelopes.
//! Role: Protocol adapter between the stdio loop and the tool handler.
//! Invariants: Requests without an id (or with a null id) never produce a response.
//! Invariants: Every protocol-level failure carries the internal-error code (-32603).
//! Invariants: Panics inside a method are caught here and reported, never propagated.
//! Invariants: Tool execution failures are returned as successful `result.isError`.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::{debug, error};

const JSON_RPC_VERSION: &str = "2.0";
const MCP_PROTOCOL_VERSION: &str = "2024-11-05";
const INTERNAL_ERROR_CODE: i32 = -32603;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    #[serde(default)]
    pub jsonrpc: String,
    /// Absent and `null` both mark a notification.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: JSON_RPC_VERSION.to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    fn error(id: Value, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: JSON_RPC_VERSION.to_string(),
            id,
            result: None,
            error: Some(error),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
}

impl JsonRpcError {
    pub fn internal_error(message: impl Into<String>) -> Self {
        Self {
            code: INTERNAL_ERROR_CODE,
            message: message.into(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum DispatchOutcome {
    Response(JsonRpcResponse),
    NoResponse,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerMetadata {
    pub name: String,
    pub version: String,
    pub protocol_version: String,
}

impl Default for ServerMetadata {
    fn default() -> Self {
        Self {
            name: "visionpro-vpp-driver".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            protocol_version: MCP_PROTOCOL_VERSION.to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitializeResult {
    #[serde(rename = "protocolVersion")]
    pub protocol_version: String,
    pub capabilities: ServerCapabilities,
    #[serde(rename = "serverInfo")]
    pub server_info: ServerInfo,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerCapabilities {
    pub tools: ToolsCapability,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolsCapability {
    #[serde(rename = "listChanged")]
    pub list_changed: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerInfo {
    pub name: String,
    pub version: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct McpTool {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ToolCallRequest {
    pub name: String,
    pub arguments: Map<String, Value>,
}

impl ToolCallRequest {
    /// String argument by name; missing or non-string values read as absent.
    pub fn text_argument(&self, key: &str) -> Option<&str> {
        self.arguments.get(key).and_then(Value::as_str)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCallResult {
    pub content: Vec<Value>,
    #[serde(rename = "isError", default)]
    pub is_error: bool,
}

impl ToolCallResult {
    pub fn success_text(text: impl Into<String>) -> Self {
        Self {
            content: vec![text_content(text)],
            is_error: false,
        }
    }

    pub fn execution_error_text(message: impl Into<String>) -> Self {
        Self {
            content: vec![text_content(message)],
            is_error: true,
        }
    }

    /// Text of the first content item, if any.
    pub fn text(&self) -> Option<&str> {
        self.content
            .first()
            .and_then(|item| item.get("text"))
            .and_then(Value::as_str)
    }
}

fn text_content(text: impl Into<String>) -> Value {
    json!({
        "type": "text",
        "text": text.into(),
    })
}

pub trait McpHandler {
    fn list_tools(&mut self) -> Result<Vec<McpTool>, JsonRpcError>;
    fn call_tool(&mut self, request: ToolCallRequest) -> Result<ToolCallResult, JsonRpcError>;
}

pub struct McpDispatcher<H> {
    metadata: ServerMetadata,
    handler: H,
}

impl<H: McpHandler> McpDispatcher<H> {
    pub fn new(handler: H) -> Self {
        Self {
            metadata: ServerMetadata::default(),
            handler,
        }
    }

    pub fn with_metadata(handler: H, metadata: ServerMetadata) -> Self {
        Self { metadata, handler }
    }

    pub fn metadata(&self) -> &ServerMetadata {
        &self.metadata
    }

    pub fn handler_mut(&mut self) -> &mut H {
        &mut self.handler
    }

    pub fn dispatch_request(&mut self, request: JsonRpcRequest) -> DispatchOutcome {
        let id = request.id.clone();
        let method = request.method.clone();
        let routed = panic::catch_unwind(AssertUnwindSafe(|| self.route_method(request)));
        let route_result = match routed {
            Ok(result) => result,
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!(method = %method, panic = %message, "request handler panicked");
                Err(JsonRpcError::internal_error(message))
            }
        };
        match id {
            Some(response_id) => match route_result {
                Ok(result) => {
                    DispatchOutcome::Response(JsonRpcResponse::success(response_id, result))
                }
                Err(error) => DispatchOutcome::Response(JsonRpcResponse::error(response_id, error)),
            },
            None => {
                if let Err(error) = route_result {
                    debug!(method = %method, error = %error.message, "notification failed");
                }
                DispatchOutcome::NoResponse
            }
        }
    }

    fn route_method(&mut self, request: JsonRpcRequest) -> Result<Value, JsonRpcError> {
        match request.method.as_str() {
            "initialize" => to_value(self.initialize_result()),
            "notifications/initialized" | "ping" => Ok(json!({})),
            "tools/list" => {
                let tools = self.handler.list_tools()?;
                Ok(json!({ "tools": tools }))
            }
            "tools/call" => {
                let params = match request.params.as_ref() {
                    Some(Value::Object(params)) => params,
                    _ => {
                        return Err(JsonRpcError::internal_error(
                            "tools/call requires object params",
                        ));
                    }
                };
                let tool_request = parse_tool_call_params(params)?;
                let result = self.handler.call_tool(tool_request)?;
                to_value(result)
            }
            other => Err(JsonRpcError::internal_error(format!(
                "method not found: {other}"
            ))),
        }
    }

    fn initialize_result(&self) -> InitializeResult {
        InitializeResult {
            protocol_version: self.metadata.protocol_version.clone(),
            capabilities: ServerCapabilities {
                tools: ToolsCapability { list_changed: true },
            },
            server_info: ServerInfo {
                name: self.metadata.name.clone(),
                version: self.metadata.version.clone(),
            },
        }
    }
}

/// Parses one protocol line into a request envelope.
pub fn parse_jsonrpc_line(line: &str) -> Result<JsonRpcRequest, JsonRpcError> {
    serde_json::from_str::<JsonRpcRequest>(line)
        .map_err(|err| JsonRpcError::internal_error(format!("invalid request: {err}")))
}

fn parse_tool_call_params(params: &Map<String, Value>) -> Result<ToolCallRequest, JsonRpcError> {
    let name = params
        .get("name")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let arguments = match params.get("arguments") {
        Some(Value::Object(arguments)) => arguments.clone(),
        _ => Map::new(),
    };

    Ok(ToolCallRequest { name, arguments })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "request handler panicked".to_string()
    }
}

fn to_value<T: Serialize>(value: T) -> Result<Value, JsonRpcError> {
    serde_json::to_value(value).map_err(|_| JsonRpcError::internal_error("failed to encode result"))
}
