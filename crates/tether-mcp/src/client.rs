//! MCP client — one session with one server.
//!
//! Owns the transport, runs the protocol handshake (initialize + the
//! initialized notification), and keeps the discovered tool descriptors
//! cached until an explicit refresh.

use crate::config::{ServerConfig, ToolErrorMode, TransportConfig};
use crate::error::McpError;
use crate::protocol::{self, InitializeResult, ToolCallResult, ToolsListResult};
use crate::transport::{SseTransport, StdioTransport, Transport};
use serde_json::Value;
use tether_types::ToolDescriptor;
use tokio::sync::RwLock;

/// Client for a single MCP server.
pub struct McpClient {
    name: String,
    transport: Box<dyn Transport>,
    tools: RwLock<Vec<ToolDescriptor>>,
    tool_error_mode: ToolErrorMode,
}

impl McpClient {
    /// Connect to an MCP server: build the transport, handshake, and run
    /// the first tool discovery.
    pub async fn connect(name: impl Into<String>, config: &ServerConfig) -> Result<Self, McpError> {
        let name = name.into();
        let transport: Box<dyn Transport> = match &config.transport {
            TransportConfig::Stdio { command, args, env } => Box::new(
                StdioTransport::spawn(command, args, env, config.request_timeout_ms).await?,
            ),
            TransportConfig::Sse {
                url,
                headers,
                reverse_proxy_url,
            } => Box::new(
                SseTransport::connect(
                    url,
                    headers,
                    reverse_proxy_url.as_deref(),
                    config.request_timeout_ms,
                )
                .await?,
            ),
        };

        let response = transport
            .request("initialize", Some(protocol::initialize_params(&name)))
            .await?;
        let init: InitializeResult = response
            .into_result(&name)
            .and_then(|result| {
                serde_json::from_value(result)
                    .map_err(|e| McpError::Protocol(format!("bad initialize result: {e}")))
            })
            .map_err(|e| McpError::InitializationFailed {
                name: name.clone(),
                reason: e.to_string(),
            })?;

        tracing::info!(
            "MCP server '{}' ({} v{}) speaks protocol {}",
            name,
            init.server_info.name,
            init.server_info.version,
            init.protocol_version
        );

        transport
            .notify("notifications/initialized", None)
            .await?;

        let client = Self {
            name,
            transport,
            tools: RwLock::new(Vec::new()),
            tool_error_mode: config.tool_error_mode,
        };
        client.refresh_tools().await?;
        Ok(client)
    }

    /// The cached tool descriptors from the last `tools/list`.
    pub async fn tools(&self) -> Vec<ToolDescriptor> {
        self.tools.read().await.clone()
    }

    /// Re-run `tools/list` and atomically replace the cache.
    pub async fn refresh_tools(&self) -> Result<Vec<ToolDescriptor>, McpError> {
        let response = self.transport.request("tools/list", None).await?;
        let result = response.into_result(&self.name)?;
        let list: ToolsListResult = serde_json::from_value(result)
            .map_err(|e| McpError::Protocol(format!("bad tools/list result: {e}")))?;

        let descriptors: Vec<ToolDescriptor> = list
            .tools
            .into_iter()
            .map(|entry| {
                ToolDescriptor::from_input_schema(
                    entry.name,
                    entry.description.unwrap_or_default(),
                    &entry.input_schema,
                )
            })
            .collect();

        *self.tools.write().await = descriptors.clone();
        Ok(descriptors)
    }

    /// Call a tool and return the typed result.
    pub async fn call_tool(
        &self,
        tool: &str,
        arguments: Value,
    ) -> Result<ToolCallResult, McpError> {
        let response = self
            .transport
            .request("tools/call", Some(protocol::call_params(tool, arguments)))
            .await?;
        let result = response.into_result(&self.name)?;
        serde_json::from_value(result)
            .map_err(|e| McpError::Protocol(format!("bad tools/call result: {e}")))
    }

    /// Call a tool and return its text content joined with newlines.
    ///
    /// When the result carries `isError: true`, the configured
    /// [`ToolErrorMode`] decides whether that surfaces as an error or as
    /// the joined text.
    pub async fn execute_tool(&self, tool: &str, arguments: Value) -> Result<String, McpError> {
        let result = self.call_tool(tool, arguments).await?;
        let text = result.joined_text();
        if result.is_error && self.tool_error_mode == ToolErrorMode::Fail {
            return Err(McpError::ToolFailed {
                name: tool.to_string(),
                message: text,
            });
        }
        Ok(text)
    }

    /// The configured server name.
    pub fn server_name(&self) -> &str {
        &self.name
    }

    /// Shut down the underlying transport. Safe to call more than once.
    pub async fn shutdown(&self) {
        self.transport.shutdown().await;
    }
}
