//! Purpose: Run the MCP server over a line-delimited stdio transport.
//! Exports: `serve`.
//! Role: Bridge newline-delimited JSON-RPC lines to the shared MCP dispatcher.
//! Invariants: The writer only receives JSON-RPC messages (one JSON value per line).
//! Invariants: Blank lines and unparseable lines (including invalid UTF-8) produce no output.
//! Invariants: Input EOF exits cleanly.

use std::io::{BufRead, Write};

use serde_json::Value;
use tracing::{debug, warn};
use vpp_driver::core::error::{Error, ErrorKind};
use vpp_driver::mcp::{DispatchOutcome, McpDispatcher, McpHandler, parse_jsonrpc_line};

pub(super) fn serve<H, R, W>(
    dispatcher: &mut McpDispatcher<H>,
    mut reader: R,
    mut writer: W,
) -> Result<(), Error>
where
    H: McpHandler,
    R: BufRead,
    W: Write,
{
    let mut buffer = Vec::new();

    loop {
        buffer.clear();
        let read = reader.read_until(b'\n', &mut buffer).map_err(|err| {
            Error::new(ErrorKind::Io)
                .with_message("failed to read MCP request")
                .with_source(err)
        })?;
        if read == 0 {
            debug!("input closed");
            return writer.flush().map_err(|err| {
                Error::new(ErrorKind::Io)
                    .with_message("failed to flush MCP output")
                    .with_source(err)
            });
        }

        // Invalid UTF-8 is replaced, never fatal.
        let line = String::from_utf8_lossy(&buffer);
        let message = line.trim();
        if message.is_empty() {
            continue;
        }

        let request = match parse_jsonrpc_line(message) {
            Ok(request) => request,
            Err(error) => {
                warn!(error = %error.message, "dropping malformed request line");
                continue;
            }
        };
        debug!(method = %request.method, "request");

        match dispatcher.dispatch_request(request) {
            DispatchOutcome::NoResponse => {}
            DispatchOutcome::Response(response) => {
                let payload = serde_json::to_value(response).map_err(|err| {
                    Error::new(ErrorKind::Internal)
                        .with_message("failed to encode MCP response")
                        .with_source(err)
                })?;
                write_json_line(&mut writer, &payload)?;
            }
        }
    }
}

fn write_json_line<W: Write>(writer: &mut W, payload: &Value) -> Result<(), Error> {
    serde_json::to_writer(&mut *writer, payload).map_err(|err| {
        Error::new(ErrorKind::Internal)
            .with_message("failed to encode MCP message")
            .with_source(err)
    })?;
    writer.write_all(b"\n").map_err(|err| {
        Error::new(ErrorKind::Io)
            .with_message("failed to write MCP message")
            .with_source(err)
    })?;
    writer.flush().map_err(|err| {
        Error::new(ErrorKind::Io)
            .with_message("failed to flush MCP message")
            .with_source(err)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use vpp_driver::mcp::{JsonRpcError, McpTool, ToolCallRequest, ToolCallResult};

    struct Echo;

    impl McpHandler for Echo {
        fn list_tools(&mut self) -> Result<Vec<McpTool>, JsonRpcError> {
            Ok(Vec::new())
        }

        fn call_tool(&mut self, request: ToolCallRequest) -> Result<ToolCallResult, JsonRpcError> {
            Ok(ToolCallResult::success_text(request.name))
        }
    }

    fn run(input: &str) -> Vec<Value> {
        run_bytes(input.as_bytes())
    }

    fn run_bytes(input: &[u8]) -> Vec<Value> {
        let mut dispatcher = McpDispatcher::new(Echo);
        let mut output = Vec::new();
        serve(&mut dispatcher, input, &mut output).expect("serve");
        String::from_utf8(output)
            .expect("utf8")
            .lines()
            .map(|line| serde_json::from_str(line).expect("json line"))
            .collect()
    }

    #[test]
    fn only_requests_with_ids_are_answered() {
        let input = concat!(
            "{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"ping\"}\n",
            "\n",
            "   \n",
            "this is not json\n",
            "{\"jsonrpc\":\"2.0\",\"method\":\"notifications/initialized\"}\n",
            "{\"jsonrpc\":\"2.0\",\"id\":2,\"method\":\"tools/call\",",
            "\"params\":{\"name\":\"vpp_list_tools\"}}\r\n",
        );
        let responses = run(input);
        assert_eq!(responses.len(), 2);
        assert_eq!(responses[0]["id"], json!(1));
        assert_eq!(responses[0]["result"], json!({}));
        assert_eq!(responses[1]["id"], json!(2));
        assert_eq!(
            responses[1]["result"]["content"][0]["text"],
            json!("vpp_list_tools")
        );
    }

    #[test]
    fn unknown_methods_answer_with_internal_error() {
        let responses = run("{\"jsonrpc\":\"2.0\",\"id\":\"x\",\"method\":\"bogus\"}\n");
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0]["error"]["code"], json!(-32603));
        assert_eq!(responses[0]["id"], json!("x"));
    }

    #[test]
    fn empty_input_exits_cleanly() {
        assert!(run("").is_empty());
    }

    #[test]
    fn invalid_utf8_lines_are_dropped_and_the_loop_continues() {
        let mut input = b"{\"bad\":\"".to_vec();
        input.extend_from_slice(&[0xff, 0xfe]);
        input.extend_from_slice(b"\"}\n{\"jsonrpc\":\"2.0\",\"id\":7,\"method\":\"ping\"}\n");
        let responses = run_bytes(&input);
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0]["id"], json!(7));
        assert_eq!(responses[0]["result"], json!({}));
    }
}
