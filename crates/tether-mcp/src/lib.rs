//! MCP (Model Context Protocol) client for Tether.
//!
//! Speaks JSON-RPC 2.0 to tool servers over one of two transports: a local
//! subprocess with newline-delimited frames on stdin/stdout, or a remote
//! server that streams responses over SSE and accepts requests as HTTP
//! POSTs. Each configured server is connected, initialized with a
//! handshake, and its tools are discovered and converted into host-neutral
//! descriptors.

pub mod client;
pub mod config;
pub mod error;
pub mod jsonrpc;
pub mod manager;
pub mod protocol;
pub mod sse;
pub mod transport;

pub use client::McpClient;
pub use config::{McpConfig, ServerConfig, ToolErrorMode, TransportConfig};
pub use error::McpError;
pub use manager::{McpManager, namespaced_name};
pub use transport::{SseTransport, StdioTransport, Transport};
