//! Purpose: Expose the session's operations as MCP tools.
//! Exports: `VppMcpHandler`, `tool_catalog`.
//! Role: `McpHandler` implementation wired into the stdio dispatcher.
//! Invariants: Operation failures become `Error: <message>` results with `isError`.
//! Invariants: Missing string arguments read as absent, never as protocol errors.

use std::path::Path;

use serde_json::json;
use tracing::warn;

use crate::core::error::Error;
use crate::core::mutate::Assigned;
use crate::mcp::{JsonRpcError, McpHandler, McpTool, ToolCallRequest, ToolCallResult};
use crate::session::Session;

pub struct VppMcpHandler {
    session: Session,
}

impl VppMcpHandler {
    pub fn new(session: Session) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    fn run(&mut self, request: &ToolCallRequest) -> Option<Result<String, Error>> {
        let text = |key: &'static str| request.text_argument(key).unwrap_or_default();
        let result = match request.name.as_str() {
            "vpp_load_file" => self.load_file(text("file_path")),
            "vpp_list_tools" => Ok(self.list_text()),
            "vpp_get_property" => self.session.get_property(text("tool_name"), text("path")),
            "vpp_set_property" => {
                let tool = text("tool_name");
                let path = text("path");
                self.session
                    .set_property(tool, path, text("value"))
                    .map(|assigned| match assigned {
                        Assigned::Link { source } => {
                            format!("Success: Linked '{tool}.{path}' to '{source}'")
                        }
                        Assigned::Literal(value) => format!(
                            "Success: Set '{path}' to '{}'",
                            value.literal_text().unwrap_or_default()
                        ),
                    })
            }
            "vpp_extract_script" => self
                .session
                .extract_script(text("tool_name"))
                .map(|source| source.unwrap_or_else(|| "No script.".to_string())),
            "vpp_inject_script" => self
                .session
                .inject_script(text("tool_name"), text("code"))
                .map(|()| {
                    "Success & Saved. Injected into Script.Source and compiled.".to_string()
                }),
            "vpp_create_tool" => self
                .session
                .create_tool(
                    text("parent_name"),
                    text("tool_type"),
                    request.text_argument("new_tool_name"),
                )
                .map(|created| {
                    format!(
                        "Success: Created '{}' ({}) in '{}'.",
                        created.name, created.type_name, created.parent
                    )
                }),
            _ => return None,
        };
        Some(result)
    }

    fn load_file(&mut self, file_path: &str) -> Result<String, Error> {
        let path = Path::new(file_path);
        let count = self.session.load_file(path)?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| file_path.to_string());
        Ok(format!("Loaded {file_name}. {count} tools found."))
    }

    fn list_text(&self) -> String {
        let entries = self.session.list_tools();
        if entries.is_empty() {
            return "No tools.".to_string();
        }
        entries
            .iter()
            .map(|(name, type_name)| format!("- {name} ({type_name})"))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl McpHandler for VppMcpHandler {
    fn list_tools(&mut self) -> Result<Vec<McpTool>, JsonRpcError> {
        Ok(tool_catalog())
    }

    fn call_tool(&mut self, request: ToolCallRequest) -> Result<ToolCallResult, JsonRpcError> {
        match self.run(&request) {
            Some(Ok(text)) => Ok(ToolCallResult::success_text(text)),
            Some(Err(err)) => {
                let err = err.with_operation(request.name.as_str());
                warn!(
                    operation = err.operation().unwrap_or_default(),
                    kind = ?err.kind(),
                    error = %err,
                    "tool call failed"
                );
                Ok(ToolCallResult::execution_error_text(format!("Error: {err}")))
            }
            None => Ok(ToolCallResult::execution_error_text("Unknown tool.")),
        }
    }
}

/// The fixed list of callable tools with their input schemas.
pub fn tool_catalog() -> Vec<McpTool> {
    let string = json!({"type": "string"});
    let tool = |name: &str, description: &str, schema: serde_json::Value| McpTool {
        name: name.to_string(),
        description: description.to_string(),
        input_schema: schema,
    };
    vec![
        tool(
            "vpp_load_file",
            "Load VPP file.",
            json!({
                "type": "object",
                "properties": {"file_path": string},
                "required": ["file_path"],
            }),
        ),
        tool(
            "vpp_list_tools",
            "List all tools.",
            json!({"type": "object", "properties": {}}),
        ),
        tool(
            "vpp_get_property",
            "Get value or inspect structure (path='.' for root).",
            json!({
                "type": "object",
                "properties": {"tool_name": string, "path": string},
                "required": ["tool_name", "path"],
            }),
        ),
        tool(
            "vpp_set_property",
            "Set property value. Prefix the value with '@' to link another tool's output (e.g. '@Tool1.OutputImage').",
            json!({
                "type": "object",
                "properties": {"tool_name": string, "path": string, "value": string},
                "required": ["tool_name", "path", "value"],
            }),
        ),
        tool(
            "vpp_extract_script",
            "Extract script source.",
            json!({
                "type": "object",
                "properties": {"tool_name": string},
                "required": ["tool_name"],
            }),
        ),
        tool(
            "vpp_inject_script",
            "Inject script source.",
            json!({
                "type": "object",
                "properties": {"tool_name": string, "code": string},
                "required": ["tool_name", "code"],
            }),
        ),
        tool(
            "vpp_create_tool",
            "Create new VisionPro tool.",
            json!({
                "type": "object",
                "properties": {
                    "parent_name": string,
                    "tool_type": string,
                    "new_tool_name": string,
                },
                "required": ["parent_name", "tool_type"],
            }),
        ),
    ]
}
