//! Transport layer: a request/response-correlated message channel to one
//! MCP server.
//!
//! Both transports multiplex the same way: requests get a monotonically
//! allocated id and a single-use completion slot in the pending registry;
//! a background reader resolves slots as responses arrive. The registry is
//! owned here because the two transports share it unchanged.

mod sse;
mod stdio;

pub use sse::SseTransport;
pub use stdio::StdioTransport;

use crate::error::McpError;
use crate::jsonrpc::JsonRpcResponse;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, oneshot};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// The narrow contract the session layer consumes.
///
/// Implementations own request-id allocation, the pending registry, and
/// their background reader tasks; the session only sends frames and tears
/// the channel down.
pub trait Transport: Send + Sync {
    /// Send a request frame and wait for the response with a matching id.
    fn request<'a>(
        &'a self,
        method: &'a str,
        params: Option<Value>,
    ) -> BoxFuture<'a, Result<JsonRpcResponse, McpError>>;

    /// Send a notification frame; returns once the frame is handed off.
    fn notify<'a>(
        &'a self,
        method: &'a str,
        params: Option<Value>,
    ) -> BoxFuture<'a, Result<(), McpError>>;

    /// Tear down background tasks and underlying resources. Idempotent.
    fn shutdown(&self) -> BoxFuture<'_, ()>;
}

/// Id allocation plus the id → completion-slot map for outstanding requests.
///
/// Each slot is resolved exactly once: by the reader delivering a response,
/// or by the waiting caller removing it on timeout or send failure. The
/// lock is never held across I/O.
pub(crate) struct PendingRegistry {
    next_id: AtomicU64,
    pending: Mutex<HashMap<u64, oneshot::Sender<JsonRpcResponse>>>,
}

impl PendingRegistry {
    pub(crate) fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Allocate the next request id and register its completion slot.
    pub(crate) async fn register(&self) -> (u64, oneshot::Receiver<JsonRpcResponse>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);
        (id, rx)
    }

    /// Deliver a response to its slot. Returns false when no slot exists
    /// (late response after a timeout, or an id we never issued).
    pub(crate) async fn resolve(&self, id: u64, response: JsonRpcResponse) -> bool {
        match self.pending.lock().await.remove(&id) {
            Some(tx) => tx.send(response).is_ok(),
            None => false,
        }
    }

    /// Remove a slot without resolving it (timeout or failed send).
    pub(crate) async fn remove(&self, id: u64) {
        self.pending.lock().await.remove(&id);
    }

    #[cfg(test)]
    pub(crate) async fn len(&self) -> usize {
        self.pending.lock().await.len()
    }

    /// Await a registered slot, removing it on timeout.
    pub(crate) async fn wait(
        &self,
        id: u64,
        method: &str,
        rx: oneshot::Receiver<JsonRpcResponse>,
        timeout_ms: u64,
    ) -> Result<JsonRpcResponse, McpError> {
        match tokio::time::timeout(Duration::from_millis(timeout_ms), rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(McpError::TransportBroken(
                "response slot dropped".to_string(),
            )),
            Err(_) => {
                self.remove(id).await;
                Err(McpError::Timeout {
                    method: method.to_string(),
                    timeout_ms,
                })
            }
        }
    }
}

/// Route one raw inbound frame: responses go to their slot, notifications
/// are logged in arrival order, anything else is discarded with a warning.
/// Malformed input is never fatal to the connection.
pub(crate) async fn route_frame(registry: &PendingRegistry, raw: &str) {
    let value: Value = match serde_json::from_str(raw) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!("Discarding non-JSON frame: {e}: {raw}");
            return;
        }
    };

    if let Some(method) = value.get("method").and_then(Value::as_str) {
        if value.get("id").is_some() {
            tracing::debug!(method, "Ignoring server-initiated request");
        } else {
            tracing::debug!(method, "Ignoring server notification");
        }
        return;
    }

    let Some(id) = value.get("id").and_then(Value::as_u64) else {
        tracing::warn!("Discarding frame with neither id nor method: {raw}");
        return;
    };

    let response: JsonRpcResponse = match serde_json::from_value(value) {
        Ok(r) => r,
        Err(e) => {
            tracing::warn!("Discarding malformed response frame: {e}");
            return;
        }
    };

    if !registry.resolve(id, response).await {
        tracing::debug!(id, "Dropping response with no pending slot");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(id: u64) -> JsonRpcResponse {
        serde_json::from_value(serde_json::json!({"id": id, "result": {}})).unwrap()
    }

    #[tokio::test]
    async fn ids_are_monotonic_and_unique() {
        let registry = PendingRegistry::new();
        let (a, _rx_a) = registry.register().await;
        let (b, _rx_b) = registry.register().await;
        let (c, _rx_c) = registry.register().await;
        assert_eq!((a, b, c), (1, 2, 3));
        assert_eq!(registry.len().await, 3);
    }

    #[tokio::test]
    async fn resolve_delivers_once() {
        let registry = PendingRegistry::new();
        let (id, rx) = registry.register().await;
        assert!(registry.resolve(id, response(id)).await);
        assert_eq!(rx.await.unwrap().id, Some(id));
        // The slot is gone; a second delivery finds nothing.
        assert!(!registry.resolve(id, response(id)).await);
        assert_eq!(registry.len().await, 0);
    }

    #[tokio::test]
    async fn timeout_removes_slot() {
        let registry = PendingRegistry::new();
        let (id, rx) = registry.register().await;
        let err = registry.wait(id, "tools/list", rx, 50).await.unwrap_err();
        match err {
            McpError::Timeout { method, timeout_ms } => {
                assert_eq!(method, "tools/list");
                assert_eq!(timeout_ms, 50);
            }
            other => panic!("Expected Timeout, got {other:?}"),
        }
        assert_eq!(registry.len().await, 0);
        // A late response finds no slot and is dropped.
        assert!(!registry.resolve(id, response(id)).await);
    }

    #[tokio::test]
    async fn concurrent_slots_resolve_independently() {
        let registry = std::sync::Arc::new(PendingRegistry::new());
        let (id_a, rx_a) = registry.register().await;
        let (id_b, rx_b) = registry.register().await;

        // Resolve in reverse order of registration.
        assert!(registry.resolve(id_b, response(id_b)).await);
        assert!(registry.resolve(id_a, response(id_a)).await);

        assert_eq!(rx_a.await.unwrap().id, Some(id_a));
        assert_eq!(rx_b.await.unwrap().id, Some(id_b));
    }

    #[tokio::test]
    async fn route_frame_ignores_garbage_and_notifications() {
        let registry = PendingRegistry::new();
        route_frame(&registry, "not json at all").await;
        route_frame(&registry, r#"{"jsonrpc":"2.0","method":"notifications/progress"}"#).await;
        route_frame(&registry, r#"{"jsonrpc":"2.0"}"#).await;

        // A real response still routes after the garbage.
        let (id, rx) = registry.register().await;
        route_frame(&registry, &format!(r#"{{"jsonrpc":"2.0","id":{id},"result":{{}}}}"#)).await;
        assert_eq!(rx.await.unwrap().id, Some(id));
    }
}
