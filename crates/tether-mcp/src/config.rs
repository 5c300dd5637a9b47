//! Configuration types for MCP servers.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

fn default_request_timeout() -> u64 {
    8000
}

/// Top-level MCP configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct McpConfig {
    #[serde(default)]
    pub servers: HashMap<String, ServerConfig>,
}

/// Configuration for a single MCP server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(flatten)]
    pub transport: TransportConfig,
    /// Timeout for individual requests in milliseconds (default: 8000).
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,
    /// What to do when a tool result carries `isError: true`.
    #[serde(default)]
    pub tool_error_mode: ToolErrorMode,
}

/// How to reach the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "transport", rename_all = "lowercase")]
pub enum TransportConfig {
    /// Spawn a local subprocess and speak newline-delimited JSON-RPC over
    /// its stdin/stdout.
    Stdio {
        /// Command to run (e.g., "npx", "python").
        command: String,
        #[serde(default)]
        args: Vec<String>,
        /// Environment variables to set for the server process.
        #[serde(default)]
        env: HashMap<String, String>,
    },
    /// Connect to a remote server: responses stream in over SSE, requests
    /// go out as HTTP POSTs to the endpoint the server advertises.
    Sse {
        url: String,
        /// Extra headers sent on both the SSE stream and message POSTs.
        #[serde(default)]
        headers: HashMap<String, String>,
        /// When set, path-form endpoint events resolve against this URL
        /// instead of the connection URL.
        #[serde(default)]
        reverse_proxy_url: Option<String>,
    },
}

/// Policy for tool results with `isError: true`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolErrorMode {
    /// Return the joined content text as-is (default).
    #[default]
    JoinContent,
    /// Surface the result as an error carrying the joined text.
    Fail,
}
