//! SSE transport: responses stream in over one long-lived HTTP GET, and
//! requests go out as individual POSTs to a messages endpoint the server
//! advertises over the stream.
//!
//! Construction blocks until the bootstrap handshake completes: the stream
//! must yield a `session` event (opaque id, kept for logging) and an
//! `endpoint` event naming the messages URL. A dropped stream reconnects
//! with a short bounded backoff; the server then issues fresh bootstrap
//! events and in-flight requests are left to hit their timeouts.

use crate::error::McpError;
use crate::jsonrpc::{JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};
use crate::sse::{SseEvent, SseParser};
use crate::transport::{BoxFuture, PendingRegistry, Transport, route_frame};
use futures_util::StreamExt;
use reqwest::Url;
use reqwest::header::{
    ACCEPT, ACCEPT_ENCODING, CACHE_CONTROL, HeaderMap, HeaderName, HeaderValue,
};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{RwLock, oneshot};
use tokio::task::JoinHandle;
use uuid::Uuid;

const HANDSHAKE_TIMEOUT_MS: u64 = 30_000;
const RECONNECT_MAX_ATTEMPTS: u32 = 5;
const RECONNECT_MAX_DELAY_SECS: u64 = 3;

/// SSE transport for one remote MCP server.
pub struct SseTransport {
    registry: Arc<PendingRegistry>,
    http: reqwest::Client,
    post_headers: HeaderMap,
    messages_url: Arc<RwLock<Option<Url>>>,
    running: Arc<AtomicBool>,
    reader_handle: JoinHandle<()>,
    timeout_ms: u64,
}

impl SseTransport {
    /// Open the event stream and wait for the bootstrap handshake.
    pub async fn connect(
        url: &str,
        headers: &HashMap<String, String>,
        reverse_proxy_url: Option<&str>,
        timeout_ms: u64,
    ) -> Result<Self, McpError> {
        let connect_url = Url::parse(url)
            .map_err(|e| McpError::Handshake(format!("invalid server URL '{url}': {e}")))?;
        let post_base = match reverse_proxy_url {
            Some(proxy) => Url::parse(proxy).map_err(|e| {
                McpError::Handshake(format!("invalid reverse proxy URL '{proxy}': {e}"))
            })?,
            None => connect_url.clone(),
        };

        let client_id = Uuid::new_v4().to_string();
        let (stream_headers, post_headers) = build_headers(headers, &client_id)?;

        let http = reqwest::Client::new();
        let registry = Arc::new(PendingRegistry::new());
        let messages_url = Arc::new(RwLock::new(None));
        let running = Arc::new(AtomicBool::new(true));
        let (endpoint_tx, endpoint_rx) = oneshot::channel();

        let reader = SseReader {
            http: http.clone(),
            url: connect_url,
            headers: stream_headers,
            post_base,
            registry: Arc::clone(&registry),
            messages_url: Arc::clone(&messages_url),
            running: Arc::clone(&running),
        };
        let reader_handle = tokio::spawn(reader_loop(reader, Some(endpoint_tx)));

        // send() is unusable until the endpoint event has arrived
        let handshake = tokio::time::timeout(
            Duration::from_millis(HANDSHAKE_TIMEOUT_MS),
            endpoint_rx,
        )
        .await;
        match handshake {
            Ok(Ok(())) => {}
            Ok(Err(_)) => {
                running.store(false, Ordering::SeqCst);
                reader_handle.abort();
                return Err(McpError::Handshake(
                    "SSE stream closed before the endpoint event".to_string(),
                ));
            }
            Err(_) => {
                running.store(false, Ordering::SeqCst);
                reader_handle.abort();
                return Err(McpError::Handshake(format!(
                    "no endpoint event within {HANDSHAKE_TIMEOUT_MS}ms"
                )));
            }
        }

        Ok(Self {
            registry,
            http,
            post_headers,
            messages_url,
            running,
            reader_handle,
            timeout_ms,
        })
    }

    async fn post_frame(&self, id: Option<u64>, frame: &impl serde::Serialize) -> Result<(), McpError> {
        let messages_url = self
            .messages_url
            .read()
            .await
            .clone()
            .ok_or_else(|| McpError::TransportBroken("messages endpoint not known".to_string()))?;

        let result = self
            .http
            .post(messages_url)
            .headers(self.post_headers.clone())
            .json(frame)
            .send()
            .await;

        match result {
            // Servers answer with 200 or 202; the response body is not the
            // JSON-RPC reply, which arrives on the stream
            Ok(resp) if resp.status().is_success() => Ok(()),
            failed => {
                if let Some(id) = id {
                    self.registry.remove(id).await;
                }
                Err(match failed {
                    Ok(resp) => McpError::TransportBroken(format!(
                        "POST rejected with status {}",
                        resp.status()
                    )),
                    Err(e) => McpError::TransportBroken(format!("POST failed: {e}")),
                })
            }
        }
    }

    async fn request_inner(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> Result<JsonRpcResponse, McpError> {
        let (id, rx) = self.registry.register().await;
        let request = JsonRpcRequest::new(id, method, params);
        self.post_frame(Some(id), &request).await?;
        self.registry.wait(id, method, rx, self.timeout_ms).await
    }

    async fn notify_inner(&self, method: &str, params: Option<Value>) -> Result<(), McpError> {
        let notification = JsonRpcNotification::new(method, params);
        self.post_frame(None, &notification).await
    }

    async fn shutdown_inner(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        self.reader_handle.abort();
    }
}

impl Transport for SseTransport {
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

/// Everything the background reader needs to run and reconnect.
struct SseReader {
    http: reqwest::Client,
    url: Url,
    headers: HeaderMap,
    post_base: Url,
    registry: Arc<PendingRegistry>,
    messages_url: Arc<RwLock<Option<Url>>>,
    running: Arc<AtomicBool>,
}

impl SseReader {
    async fn handle_event(
        &self,
        event: SseEvent,
        first_endpoint: &mut Option<oneshot::Sender<()>>,
    ) {
        match event.event_type.as_deref() {
            Some("session") => {
                tracing::info!(session = %event.data, "SSE session established");
            }
            Some("endpoint") => match resolve_endpoint(&self.post_base, &event.data) {
                Ok(url) => {
                    tracing::debug!(%url, "Messages endpoint resolved");
                    *self.messages_url.write().await = Some(url);
                    if let Some(tx) = first_endpoint.take() {
                        let _ = tx.send(());
                    }
                }
                Err(e) => tracing::warn!("Ignoring bad endpoint event: {e}"),
            },
            Some(other) => {
                tracing::debug!("Ignoring SSE event type '{other}'");
            }
            None => route_frame(&self.registry, &event.data).await,
        }
    }
}

/// Run the GET stream, reconnecting with backoff until shut down or the
/// consecutive-failure bound is hit.
async fn reader_loop(reader: SseReader, mut first_endpoint: Option<oneshot::Sender<()>>) {
    let mut failures: u32 = 0;
    while reader.running.load(Ordering::SeqCst) {
        let response = reader
            .http
            .get(reader.url.clone())
            .headers(reader.headers.clone())
            .send()
            .await;

        let response = match response {
            Ok(resp) if resp.status().is_success() => resp,
            Ok(resp) => {
                tracing::warn!("SSE connect rejected with status {}", resp.status());
                failures += 1;
                if backoff(&reader.running, failures).await {
                    continue;
                }
                break;
            }
            Err(e) => {
                tracing::warn!("SSE connect failed: {e}");
                failures += 1;
                if backoff(&reader.running, failures).await {
                    continue;
                }
                break;
            }
        };
        failures = 0;

        let mut parser = SseParser::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            if !reader.running.load(Ordering::SeqCst) {
                return;
            }
            match chunk {
                Ok(bytes) => {
                    for event in parser.feed(&String::from_utf8_lossy(&bytes)) {
                        reader.handle_event(event, &mut first_endpoint).await;
                    }
                }
                Err(e) => {
                    tracing::warn!("SSE stream error: {e}");
                    break;
                }
            }
        }

        if !reader.running.load(Ordering::SeqCst) {
            return;
        }
        // In-flight requests are left to hit their timeouts; the server
        // sends fresh session and endpoint events once we reconnect
        tracing::warn!("SSE stream ended; reconnecting");
        failures += 1;
        if !backoff(&reader.running, failures).await {
            break;
        }
    }
}

/// Sleep before the next attempt. Returns false when the transport was shut
/// down or the attempt bound is exhausted.
async fn backoff(running: &AtomicBool, failures: u32) -> bool {
    if failures > RECONNECT_MAX_ATTEMPTS {
        tracing::warn!("Giving up on SSE reconnection after {RECONNECT_MAX_ATTEMPTS} attempts");
        return false;
    }
    let delay = u64::from(failures).min(RECONNECT_MAX_DELAY_SECS);
    tokio::time::sleep(Duration::from_secs(delay)).await;
    running.load(Ordering::SeqCst)
}

/// Resolve an `endpoint` event payload into the messages URL. Absolute
/// URLs are taken as-is; paths resolve against the connection URL (or the
/// reverse proxy URL when one is configured).
fn resolve_endpoint(base: &Url, payload: &str) -> Result<Url, McpError> {
    let resolved = if payload.contains("://") {
        Url::parse(payload)
    } else {
        base.join(payload)
    };
    resolved.map_err(|e| McpError::Handshake(format!("invalid endpoint '{payload}': {e}")))
}

/// Build the header sets for the stream GET and the message POSTs. Both
/// carry the caller's headers and the generated client id; only the GET
/// carries the event-stream negotiation headers.
fn build_headers(
    extra: &HashMap<String, String>,
    client_id: &str,
) -> Result<(HeaderMap, HeaderMap), McpError> {
    let mut post = HeaderMap::new();
    post.insert(
        HeaderName::from_static("x-client-id"),
        HeaderValue::from_str(client_id)
            .map_err(|e| McpError::Handshake(format!("invalid client id: {e}")))?,
    );
    for (key, value) in extra {
        let name = HeaderName::from_bytes(key.as_bytes())
            .map_err(|e| McpError::Handshake(format!("invalid header name '{key}': {e}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| McpError::Handshake(format!("invalid value for header '{key}': {e}")))?;
        post.insert(name, value);
    }

    let mut stream = post.clone();
    stream.insert(ACCEPT, HeaderValue::from_static("text/event-stream"));
    stream.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    stream.insert(ACCEPT_ENCODING, HeaderValue::from_static("identity"));

    Ok((stream, post))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_path_resolves_against_connection_url() {
        let base = Url::parse("https://h:443/mcp/sse").unwrap();
        let resolved = resolve_endpoint(&base, "/mcp/msg?sid=S-abc").unwrap();
        assert_eq!(
            resolved,
            Url::parse("https://h:443/mcp/msg?sid=S-abc").unwrap()
        );
        assert_eq!(resolved.scheme(), "https");
        assert_eq!(resolved.host_str(), Some("h"));
        assert_eq!(resolved.path(), "/mcp/msg");
        assert_eq!(resolved.query(), Some("sid=S-abc"));
    }

    #[test]
    fn endpoint_path_keeps_explicit_port() {
        let base = Url::parse("http://localhost:8931/sse").unwrap();
        let resolved = resolve_endpoint(&base, "/messages?sessionId=42").unwrap();
        assert_eq!(
            resolved.as_str(),
            "http://localhost:8931/messages?sessionId=42"
        );
    }

    #[test]
    fn absolute_endpoint_is_taken_as_is() {
        let base = Url::parse("https://h/sse").unwrap();
        let resolved = resolve_endpoint(&base, "https://other:9000/messages").unwrap();
        assert_eq!(resolved.as_str(), "https://other:9000/messages");
    }

    #[test]
    fn endpoint_resolves_against_reverse_proxy_base() {
        let proxy = Url::parse("https://edge.example.com").unwrap();
        let resolved = resolve_endpoint(&proxy, "/mcp/messages?sid=1").unwrap();
        assert_eq!(
            resolved.as_str(),
            "https://edge.example.com/mcp/messages?sid=1"
        );
    }

    #[test]
    fn bad_endpoint_payload_is_an_error() {
        let base = Url::parse("https://h/sse").unwrap();
        assert!(resolve_endpoint(&base, "http://[bad").is_err());
    }

    #[test]
    fn stream_headers_include_negotiation_fields() {
        let extra = HashMap::from([("Authorization".to_string(), "Bearer t".to_string())]);
        let (stream, post) = build_headers(&extra, "cid-1").unwrap();

        assert_eq!(stream.get(ACCEPT).unwrap(), "text/event-stream");
        assert_eq!(stream.get(CACHE_CONTROL).unwrap(), "no-cache");
        assert_eq!(stream.get(ACCEPT_ENCODING).unwrap(), "identity");
        assert_eq!(stream.get("x-client-id").unwrap(), "cid-1");
        assert_eq!(stream.get("authorization").unwrap(), "Bearer t");

        // POSTs carry auth and client id but not the stream negotiation
        assert!(post.get(ACCEPT).is_none());
        assert_eq!(post.get("authorization").unwrap(), "Bearer t");
        assert_eq!(post.get("x-client-id").unwrap(), "cid-1");
    }

    #[test]
    fn invalid_header_name_is_rejected() {
        let extra = HashMap::from([("bad name".to_string(), "v".to_string())]);
        assert!(build_headers(&extra, "cid").is_err());
    }
}
