//! Model Context Protocol (MCP) server implementation.
//!
//! Exposes board sessions as MCP tools over stdio using JSON-RPC 2.0
//! messages.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         MCP Server                          │
//! │                                                             │
//! │   ┌─────────────┐    ┌─────────────┐    ┌─────────────┐     │
//! │   │  Transport  │───▶│   Server    │───▶│    Tools    │     │
//! │   │   (stdio)   │    │ (lifecycle) │    │ (handlers)  │     │
//! │   └─────────────┘    └─────────────┘    └─────────────┘     │
//! │                                                │            │
//! │                                                ▼            │
//! │                                     ┌────────────────────┐  │
//! │                                     │  SessionManager    │  │
//! │                                     │  (board documents) │  │
//! │                                     └────────────────────┘  │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Protocol Version
//!
//! This implementation targets MCP protocol version 2024-11-05.

pub mod protocol;
pub mod server;
pub mod tools;
pub mod transport;

pub use protocol::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, MCP_PROTOCOL_VERSION};
pub use server::McpServer;
pub use tools::{ToolCallResult, ToolDefinition};
pub use transport::{StdioTransport, Transport};
