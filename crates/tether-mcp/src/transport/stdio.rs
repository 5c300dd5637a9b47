//! Stdio transport: spawns an MCP server subprocess and speaks
//! newline-delimited JSON-RPC over its stdin/stdout.
//!
//! A single background reader task owns stdout for the life of the
//! transport. If the pipe closes while the transport is still running, the
//! reader restarts the subprocess once per failure; requests in flight at
//! that moment are left to hit their own timeouts.

use crate::error::McpError;
use crate::jsonrpc::{JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};
use crate::transport::{BoxFuture, PendingRegistry, Transport, route_frame};
use serde_json::Value;
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

const RESTART_DELAY_MS: u64 = 1000;
const SHUTDOWN_WAIT_MS: u64 = 1000;

/// Spawn parameters plus the live process handles, shared between the
/// write path and the reader task so the reader can drive a restart.
struct ServerProcess {
    command: String,
    args: Vec<String>,
    env: HashMap<String, String>,
    running: AtomicBool,
    child: Mutex<Option<Child>>,
    stdin: Mutex<Option<ChildStdin>>,
}

impl ServerProcess {
    /// Spawn a fresh child, replacing any previous handles. Returns the new
    /// stdout and stderr for the reader side.
    async fn respawn(&self) -> Result<(ChildStdout, ChildStderr), McpError> {
        let mut cmd = Command::new(&self.command);
        cmd.args(&self.args)
            .envs(&self.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| McpError::SpawnFailed {
            name: self.command.clone(),
            source: e,
        })?;

        let stdin = child.stdin.take().expect("stdin was piped");
        let stdout = child.stdout.take().expect("stdout was piped");
        let stderr = child.stderr.take().expect("stderr was piped");

        *self.stdin.lock().await = Some(stdin);
        // Dropping the previous child (if any) kills it via kill_on_drop
        *self.child.lock().await = Some(child);

        Ok((stdout, stderr))
    }
}

/// Async stdio transport for one MCP server subprocess.
pub struct StdioTransport {
    registry: Arc<PendingRegistry>,
    process: Arc<ServerProcess>,
    reader_handle: JoinHandle<()>,
    timeout_ms: u64,
}

impl StdioTransport {
    /// Spawn the subprocess and start the background reader.
    pub async fn spawn(
        command: &str,
        args: &[String],
        env: &HashMap<String, String>,
        timeout_ms: u64,
    ) -> Result<Self, McpError> {
        let process = Arc::new(ServerProcess {
            command: command.to_string(),
            args: args.to_vec(),
            env: env.clone(),
            running: AtomicBool::new(true),
            child: Mutex::new(None),
            stdin: Mutex::new(None),
        });

        let (stdout, stderr) = process.respawn().await?;
        spawn_stderr_drain(stderr);

        let registry = Arc::new(PendingRegistry::new());
        let reader_handle = tokio::spawn(reader_loop(
            Arc::clone(&process),
            Arc::clone(&registry),
            stdout,
        ));

        Ok(Self {
            registry,
            process,
            reader_handle,
            timeout_ms,
        })
    }

    /// Write one newline-terminated frame under the write lock and flush.
    async fn write_frame(&self, frame: String) -> Result<(), McpError> {
        let mut guard = self.process.stdin.lock().await;
        let Some(stdin) = guard.as_mut() else {
            return Err(McpError::TransportBroken("stdin is closed".to_string()));
        };

        let result = async {
            stdin.write_all(frame.as_bytes()).await?;
            stdin.write_all(b"\n").await?;
            stdin.flush().await
        }
        .await;

        if let Err(e) = result {
            // Dropping stdin gives the child EOF; the reader restarts the
            // subprocess once its stdout closes.
            guard.take();
            return Err(McpError::TransportBroken(format!(
                "write to MCP server failed: {e}"
            )));
        }
        Ok(())
    }

    async fn request_inner(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> Result<JsonRpcResponse, McpError> {
        let (id, rx) = self.registry.register().await;
        let frame = serde_json::to_string(&JsonRpcRequest::new(id, method, params))?;

        if let Err(e) = self.write_frame(frame).await {
            self.registry.remove(id).await;
            return Err(e);
        }

        self.registry.wait(id, method, rx, self.timeout_ms).await
    }

    async fn notify_inner(&self, method: &str, params: Option<Value>) -> Result<(), McpError> {
        let frame = serde_json::to_string(&JsonRpcNotification::new(method, params))?;
        self.write_frame(frame).await
    }

    async fn shutdown_inner(&self) {
        if !self.process.running.swap(false, Ordering::SeqCst) {
            return;
        }

        // Close stdin first so the child sees EOF and can exit on its own.
        self.process.stdin.lock().await.take();

        let child = self.process.child.lock().await.take();
        if let Some(mut child) = child {
            let waited = tokio::time::timeout(
                Duration::from_millis(SHUTDOWN_WAIT_MS),
                child.wait(),
            )
            .await;
            if waited.is_err() {
                let _ = child.kill().await;
            }
        }

        self.reader_handle.abort();
    }

    #[cfg(test)]
    pub(crate) async fn pending_len(&self) -> usize {
        self.registry.len().await
    }
}

impl Transport for StdioTransport {
    fn request<'a>(
        &'a self,
        method: &'a str,
        params: Option<Value>,
    ) -> BoxFuture<'a, Result<JsonRpcResponse, McpError>> {
        Box::pin(self.request_inner(method, params))
    }

    fn notify<'a>(
        &'a self,
        method: &'a str,
        params: Option<Value>,
    ) -> BoxFuture<'a, Result<(), McpError>> {
        Box::pin(self.notify_inner(method, params))
    }

    fn shutdown(&self) -> BoxFuture<'_, ()> {
        Box::pin(self.shutdown_inner())
    }
}

/// Read stdout line-by-line, routing frames until EOF. While the transport
/// is running, a closed pipe triggers one restart attempt per failure, at
/// most one per second.
async fn reader_loop(
    process: Arc<ServerProcess>,
    registry: Arc<PendingRegistry>,
    mut stdout: ChildStdout,
) {
    loop {
        let mut lines = BufReader::new(stdout).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    route_frame(&registry, line).await;
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!("Error reading MCP server stdout: {e}");
                    break;
                }
            }
        }

        if !process.running.load(Ordering::SeqCst) {
            break;
        }

        // In-flight requests are left to hit their timeouts.
        tracing::warn!(
            "MCP server '{}' stdout closed; restarting in {RESTART_DELAY_MS}ms",
            process.command
        );
        tokio::time::sleep(Duration::from_millis(RESTART_DELAY_MS)).await;
        if !process.running.load(Ordering::SeqCst) {
            break;
        }

        match process.respawn().await {
            Ok((new_stdout, stderr)) => {
                spawn_stderr_drain(stderr);
                stdout = new_stdout;
            }
            Err(e) => {
                tracing::warn!("Failed to restart MCP server: {e}");
                break;
            }
        }
    }
}

/// Best-effort stderr drain; ends on its own when the pipe closes.
fn spawn_stderr_drain(stderr: ChildStderr) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            tracing::debug!(target: "mcp_server_stderr", "{line}");
        }
    })
}
