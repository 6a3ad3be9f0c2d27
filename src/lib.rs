//! Purpose: Library crate behind the `vpp-driver` MCP server and its tests.
//! Exports: `core` (graph engine), `model` (reference object model), `store`,
//! `session`, `mcp` (protocol core), `tools` (MCP tool surface).
//! Role: Everything except process setup and the stdio transport lives here.
//! Invariants: Core modules see nodes only through `core::graph` capabilities.
pub mod core;
pub mod mcp;
pub mod model;
pub mod session;
pub mod store;
pub mod tools;
