//! Manager — connects and aggregates multiple MCP servers.

use crate::client::McpClient;
use crate::config::McpConfig;
use std::sync::Arc;
use tether_types::ToolDescriptor;

/// Namespaced tool name, unique across servers.
pub fn namespaced_name(server: &str, tool: &str) -> String {
    format!("mcp__{server}__{tool}")
}

/// Holds one connected client per configured server.
pub struct McpManager {
    clients: Vec<Arc<McpClient>>,
}

impl McpManager {
    /// Connect all configured servers.
    ///
    /// Servers that fail to connect are logged and skipped — the session
    /// continues with whatever servers are available.
    pub async fn start(config: &McpConfig) -> Self {
        let mut clients = Vec::new();

        for (name, server_config) in &config.servers {
            match McpClient::connect(name.clone(), server_config).await {
                Ok(client) => {
                    tracing::info!(
                        "MCP server '{}' connected ({} tools)",
                        name,
                        client.tools().await.len()
                    );
                    clients.push(Arc::new(client));
                }
                Err(e) => {
                    tracing::warn!("Failed to connect MCP server '{}': {}", name, e);
                }
            }
        }

        Self { clients }
    }

    /// All tools across all connected servers, paired with their client.
    pub async fn tools(&self) -> Vec<(Arc<McpClient>, ToolDescriptor)> {
        let mut all_tools = Vec::new();
        for client in &self.clients {
            for tool in client.tools().await {
                all_tools.push((Arc::clone(client), tool));
            }
        }
        all_tools
    }

    /// Number of connected servers.
    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// Connected server names with their tool counts.
    pub async fn server_summary(&self) -> Vec<(String, usize)> {
        let mut summary = Vec::new();
        for client in &self.clients {
            summary.push((
                client.server_name().to_string(),
                client.tools().await.len(),
            ));
        }
        summary
    }

    /// Shut down all connected servers.
    pub async fn shutdown(self) {
        for client in self.clients {
            client.shutdown().await;
        }
    }
}
