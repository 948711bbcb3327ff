// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! JSON-RPC 2.0 protocol layer shared by every MCP connection.
//!
//! Owns the monotonic request-id counter, the pending-request table, and the
//! handler tables for server-initiated requests and notifications.  Inbound
//! envelopes are classified by shape: `method` + `id` is a request, `method`
//! alone a notification, `id` alone a response.
//!
//! A response and a local cancellation race for the same table entry;
//! whichever removes it first wins and the loser is discarded on arrival,
//! so the caller's future resolves exactly once.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::Future;
use serde_json::{json, Value};
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::{JsonRpcError, McpError};
use crate::transport::{Transport, TransportHandlers};

/// Default per-request deadline.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

pub type ProgressCallback = Box<dyn Fn(Value) + Send + Sync>;
type RequestHandlerFuture = Pin<Box<dyn Future<Output = Result<Value, JsonRpcError>> + Send>>;
pub type RequestHandler = Box<dyn Fn(Value) -> RequestHandlerFuture + Send + Sync>;
pub type NotificationHandler = Box<dyn Fn(Value) + Send + Sync>;

/// Per-request options.
pub struct RequestOptions {
    pub timeout: Duration,
    /// Each progress notification pushes the deadline out by another
    /// `timeout`, bounded by `max_total_timeout`.
    pub reset_timeout_on_progress: bool,
    pub max_total_timeout: Option<Duration>,
    pub on_progress: Option<ProgressCallback>,
    /// External cancellation; firing it sends `notifications/cancelled` to
    /// the server and resolves the call with [`McpError::Cancelled`].
    pub cancel: Option<oneshot::Receiver<()>>,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_REQUEST_TIMEOUT,
            reset_timeout_on_progress: false,
            max_total_timeout: None,
            on_progress: None,
            cancel: None,
        }
    }
}

impl RequestOptions {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self { timeout, ..Default::default() }
    }
}

struct Pending {
    tx: oneshot::Sender<Result<Value, McpError>>,
    on_progress: Option<ProgressCallback>,
    deadline: Arc<Mutex<Instant>>,
    /// `Some(step)` when progress notifications extend the deadline.
    reset_step: Option<Duration>,
    max_deadline: Option<Instant>,
}

struct Inner {
    transport: Arc<dyn Transport>,
    next_id: AtomicI64,
    pending: Mutex<HashMap<i64, Pending>>,
    request_handlers: Mutex<HashMap<String, Arc<RequestHandler>>>,
    notification_handlers: Mutex<HashMap<String, NotificationHandler>>,
}

/// One protocol instance per transport/connection.
pub struct Protocol {
    inner: Arc<Inner>,
}

impl Protocol {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        let inner = Arc::new(Inner {
            transport,
            next_id: AtomicI64::new(1),
            pending: Mutex::new(HashMap::new()),
            request_handlers: Mutex::new(HashMap::new()),
            notification_handlers: Mutex::new(HashMap::new()),
        });
        let protocol = Self { inner };
        // Servers may ping to probe liveness; answer with an empty result.
        protocol.set_request_handler(
            "ping",
            Box::new(|_params| -> RequestHandlerFuture { Box::pin(async { Ok(json!({})) }) }),
        );
        protocol
    }

    /// Install handlers on the transport and start its read side.
    pub async fn connect(&self) -> Result<(), McpError> {
        let inner = Arc::clone(&self.inner);
        let inner_close = Arc::clone(&self.inner);
        let handlers = TransportHandlers {
            on_message: Box::new(move |msg| Inner::handle_message(&inner, msg)),
            on_error: Box::new(|err| warn!(error = %err, "transport error")),
            on_close: Box::new(move || Inner::fail_all_pending(&inner_close)),
        };
        self.inner.transport.start(handlers).await
    }

    /// Register a handler for server-initiated requests.
    pub fn set_request_handler(&self, method: &str, handler: RequestHandler) {
        self.inner
            .request_handlers
            .lock()
            .expect("request handler table poisoned")
            .insert(method.to_string(), Arc::new(handler));
    }

    /// Register a handler for server notifications.
    pub fn set_notification_handler(&self, method: &str, handler: NotificationHandler) {
        self.inner
            .notification_handlers
            .lock()
            .expect("notification handler table poisoned")
            .insert(method.to_string(), handler);
    }

    /// Send a request and await its response, timeout, or cancellation.
    pub async fn request(
        &self,
        method: &str,
        params: Value,
        opts: RequestOptions,
    ) -> Result<Value, McpError> {
        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, mut rx) = oneshot::channel();

        let start = Instant::now();
        let deadline = Arc::new(Mutex::new(start + opts.timeout));
        let max_deadline = opts.max_total_timeout.map(|d| start + d);

        {
            let mut pending = self.inner.pending.lock().expect("pending table poisoned");
            pending.insert(
                id,
                Pending {
                    tx,
                    on_progress: opts.on_progress,
                    deadline: Arc::clone(&deadline),
                    reset_step: opts.reset_timeout_on_progress.then_some(opts.timeout),
                    max_deadline,
                },
            );
        }

        let envelope = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });
        debug!(method, id, "sending request");
        if let Err(e) = self.inner.transport.send(envelope).await {
            self.remove_pending(id);
            return Err(e);
        }

        let mut cancel = opts.cancel;
        loop {
            let wake_at = *deadline.lock().expect("deadline poisoned");
            tokio::select! {
                biased;
                _ = maybe_cancelled(&mut cancel) => {
                    self.remove_pending(id);
                    self.send_cancelled_notification(id, "request was cancelled").await;
                    return Err(McpError::Cancelled);
                }
                res = &mut rx => {
                    return res.map_err(|_| McpError::ChannelClosed)?;
                }
                _ = tokio::time::sleep_until(wake_at) => {
                    let now = Instant::now();
                    let current = *deadline.lock().expect("deadline poisoned");
                    if now >= current {
                        self.remove_pending(id);
                        self.send_cancelled_notification(id, "request timed out").await;
                        return Err(McpError::Rpc(JsonRpcError::timeout(now - start)));
                    }
                    // A progress notification pushed the deadline out; keep waiting.
                }
            }
        }
    }

    /// Send a notification (no response expected).
    pub async fn notify(&self, method: &str, params: Value) -> Result<(), McpError> {
        let envelope = json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
        });
        self.inner.transport.send(envelope).await
    }

    /// Close the transport and fail every outstanding request.
    pub async fn close(&self) -> Result<(), McpError> {
        let res = self.inner.transport.close().await;
        Inner::fail_all_pending(&self.inner);
        res
    }

    fn remove_pending(&self, id: i64) -> Option<Pending> {
        self.inner
            .pending
            .lock()
            .expect("pending table poisoned")
            .remove(&id)
    }

    async fn send_cancelled_notification(&self, id: i64, reason: &str) {
        let _ = self
            .notify(
                "notifications/cancelled",
                json!({ "requestId": id, "reason": reason }),
            )
            .await;
    }
}

impl Inner {
    fn handle_message(inner: &Arc<Inner>, msg: Value) {
        let has_method = msg.get("method").and_then(Value::as_str).is_some();
        let has_id = msg.get("id").map(|i| !i.is_null()).unwrap_or(false);
        match (has_method, has_id) {
            (true, true) => Self::handle_request(inner, msg),
            (true, false) => Self::handle_notification(inner, msg),
            (false, true) => Self::handle_response(inner, msg),
            (false, false) => warn!("discarding message with neither method nor id"),
        }
    }

    fn handle_request(inner: &Arc<Inner>, msg: Value) {
        let method = msg["method"].as_str().unwrap_or_default().to_string();
        let id = msg["id"].clone();
        let params = msg.get("params").cloned().unwrap_or(Value::Null);

        let handler = inner
            .request_handlers
            .lock()
            .expect("request handler table poisoned")
            .get(&method)
            .cloned();

        let inner = Arc::clone(inner);
        tokio::spawn(async move {
            let outcome = match handler {
                Some(h) => (h)(params).await,
                None => Err(JsonRpcError::method_not_found(&method)),
            };
            let envelope = match outcome {
                Ok(result) => json!({ "jsonrpc": "2.0", "id": id, "result": result }),
                Err(err) => json!({ "jsonrpc": "2.0", "id": id, "error": err }),
            };
            if let Err(e) = inner.transport.send(envelope).await {
                warn!(error = %e, "failed to send response to server request");
            }
        });
    }

    fn handle_notification(inner: &Arc<Inner>, msg: Value) {
        let method = msg["method"].as_str().unwrap_or_default();
        let params = msg.get("params").cloned().unwrap_or(Value::Null);

        match method {
            "notifications/progress" => Self::handle_progress(inner, &params),
            "notifications/cancelled" => {
                if let Some(id) = params["requestId"].as_i64() {
                    let pending = inner
                        .pending
                        .lock()
                        .expect("pending table poisoned")
                        .remove(&id);
                    if let Some(p) = pending {
                        let _ = p.tx.send(Err(McpError::Cancelled));
                    }
                }
            }
            _ => {
                let handlers = inner
                    .notification_handlers
                    .lock()
                    .expect("notification handler table poisoned");
                if let Some(h) = handlers.get(method) {
                    (h)(params);
                } else {
                    debug!(method, "unhandled notification");
                }
            }
        }
    }

    /// Progress resets the request deadline when the caller opted in,
    /// bounded by the max-total cap.
    fn handle_progress(inner: &Arc<Inner>, params: &Value) {
        let Some(id) = params["requestId"].as_i64() else {
            return;
        };
        let pending = inner.pending.lock().expect("pending table poisoned");
        let Some(p) = pending.get(&id) else {
            return;
        };
        if let Some(cb) = &p.on_progress {
            (cb)(params.clone());
        }
        if let Some(step) = p.reset_step {
            let mut deadline = p.deadline.lock().expect("deadline poisoned");
            let mut next = Instant::now() + step;
            if let Some(max) = p.max_deadline {
                next = next.min(max);
            }
            *deadline = next;
        }
    }

    /// Resolve a response by id; the entry is removed under the lock and the
    /// future resolved after it is released.
    fn handle_response(inner: &Arc<Inner>, msg: Value) {
        let Some(id) = msg["id"].as_i64() else {
            warn!("response with non-numeric id discarded");
            return;
        };
        let pending = inner
            .pending
            .lock()
            .expect("pending table poisoned")
            .remove(&id);
        let Some(p) = pending else {
            // Cancelled or timed out locally before the response arrived.
            debug!(id, "late response discarded");
            return;
        };
        let outcome = if let Some(err) = msg.get("error") {
            let rpc: JsonRpcError = serde_json::from_value(err.clone()).unwrap_or_else(|_| {
                JsonRpcError::new(crate::error::codes::INTERNAL_ERROR, err.to_string())
            });
            Err(McpError::Rpc(rpc))
        } else {
            Ok(msg.get("result").cloned().unwrap_or(Value::Null))
        };
        let _ = p.tx.send(outcome);
    }

    fn fail_all_pending(inner: &Arc<Inner>) {
        let drained: Vec<Pending> = {
            let mut pending = inner.pending.lock().expect("pending table poisoned");
            pending.drain().map(|(_, p)| p).collect()
        };
        for p in drained {
            let _ = p.tx.send(Err(McpError::ChannelClosed));
        }
    }
}

/// Resolve when the cancel handle fires; pend forever when absent or when
/// the sender was dropped without firing.
///
/// A completed receiver must not be polled again, so the dropped-sender
/// case clears the slot before parking.
async fn maybe_cancelled(cancel: &mut Option<oneshot::Receiver<()>>) {
    let fired = match cancel {
        Some(rx) => (&mut *rx).await.is_ok(),
        None => std::future::pending().await,
    };
    if fired {
        return;
    }
    *cancel = None;
    std::future::pending().await
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::codes;
    use async_trait::async_trait;

    /// In-memory transport: records sends, lets the test inject inbound
    /// messages through the installed handlers.
    struct MockTransport {
        sent: Mutex<Vec<Value>>,
        handlers: Mutex<Option<TransportHandlers>>,
    }

    impl MockTransport {
        fn new() -> Arc<Self> {
            Arc::new(Self { sent: Mutex::new(Vec::new()), handlers: Mutex::new(None) })
        }

        fn deliver(&self, msg: Value) {
            let handlers = self.handlers.lock().unwrap();
            if let Some(h) = handlers.as_ref() {
                (h.on_message)(msg);
            }
        }

        fn sent_methods(&self) -> Vec<String> {
            self.sent
                .lock()
                .unwrap()
                .iter()
                .filter_map(|m| m["method"].as_str().map(str::to_string))
                .collect()
        }

        fn first_request_id(&self) -> i64 {
            self.sent.lock().unwrap()[0]["id"].as_i64().unwrap()
        }
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn start(&self, handlers: TransportHandlers) -> Result<(), McpError> {
            *self.handlers.lock().unwrap() = Some(handlers);
            Ok(())
        }
        async fn send(&self, message: Value) -> Result<(), McpError> {
            self.sent.lock().unwrap().push(message);
            Ok(())
        }
        async fn close(&self) -> Result<(), McpError> {
            Ok(())
        }
    }

    async fn connected() -> (Arc<MockTransport>, Arc<Protocol>) {
        let transport = MockTransport::new();
        let protocol = Arc::new(Protocol::new(transport.clone() as Arc<dyn Transport>));
        protocol.connect().await.unwrap();
        (transport, protocol)
    }

    #[tokio::test]
    async fn request_resolves_with_matching_response() {
        let (transport, protocol) = connected().await;
        let p = Arc::clone(&protocol);
        let call =
            tokio::spawn(async move { p.request("tools/list", json!({}), Default::default()).await });
        tokio::task::yield_now().await;

        let id = transport.first_request_id();
        transport.deliver(json!({"jsonrpc": "2.0", "id": id, "result": {"tools": []}}));

        let res = call.await.unwrap().unwrap();
        assert_eq!(res["tools"], json!([]));
    }

    #[tokio::test]
    async fn responses_match_out_of_order() {
        let (transport, protocol) = connected().await;
        let p1 = Arc::clone(&protocol);
        let p2 = Arc::clone(&protocol);
        let c1 = tokio::spawn(async move { p1.request("a", json!({}), Default::default()).await });
        tokio::task::yield_now().await;
        let c2 = tokio::spawn(async move { p2.request("b", json!({}), Default::default()).await });
        tokio::task::yield_now().await;

        let sent = transport.sent.lock().unwrap().clone();
        let id_a = sent[0]["id"].as_i64().unwrap();
        let id_b = sent[1]["id"].as_i64().unwrap();
        assert!(id_b > id_a, "ids are monotonic");

        // Respond to b first, then a.
        transport.deliver(json!({"jsonrpc": "2.0", "id": id_b, "result": "B"}));
        transport.deliver(json!({"jsonrpc": "2.0", "id": id_a, "result": "A"}));

        assert_eq!(c1.await.unwrap().unwrap(), json!("A"));
        assert_eq!(c2.await.unwrap().unwrap(), json!("B"));
    }

    #[tokio::test]
    async fn error_response_is_typed() {
        let (transport, protocol) = connected().await;
        let p = Arc::clone(&protocol);
        let call =
            tokio::spawn(async move { p.request("nope", json!({}), Default::default()).await });
        tokio::task::yield_now().await;

        let id = transport.first_request_id();
        transport.deliver(json!({
            "jsonrpc": "2.0",
            "id": id,
            "error": {"code": codes::METHOD_NOT_FOUND, "message": "method not found: nope"},
        }));

        match call.await.unwrap().unwrap_err() {
            McpError::Rpc(e) => assert_eq!(e.code, codes::METHOD_NOT_FOUND),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn timeout_resolves_with_minus_32000_and_notifies_server() {
        let (transport, protocol) = connected().await;
        let opts = RequestOptions {
            timeout: Duration::from_millis(50),
            ..Default::default()
        };
        let err = protocol.request("slow", json!({}), opts).await.unwrap_err();
        assert!(err.is_timeout());
        assert!(transport
            .sent_methods()
            .contains(&"notifications/cancelled".to_string()));
    }

    #[tokio::test]
    async fn cancellation_resolves_once_and_discards_late_response() {
        let (transport, protocol) = connected().await;
        let (ctx, crx) = oneshot::channel();
        let opts = RequestOptions { cancel: Some(crx), ..Default::default() };
        let p = Arc::clone(&protocol);
        let call = tokio::spawn(async move { p.request("slow", json!({}), opts).await });
        tokio::task::yield_now().await;

        let id = transport.first_request_id();
        ctx.send(()).unwrap();
        let err = call.await.unwrap().unwrap_err();
        assert!(matches!(err, McpError::Cancelled));

        // The late response finds no pending entry and is dropped.
        transport.deliver(json!({"jsonrpc": "2.0", "id": id, "result": "late"}));
        assert!(transport
            .sent_methods()
            .contains(&"notifications/cancelled".to_string()));
    }

    #[tokio::test]
    async fn progress_extends_the_deadline_when_enabled() {
        let (transport, protocol) = connected().await;
        let opts = RequestOptions {
            timeout: Duration::from_millis(300),
            reset_timeout_on_progress: true,
            ..Default::default()
        };
        let p = Arc::clone(&protocol);
        let call = tokio::spawn(async move { p.request("long", json!({}), opts).await });
        tokio::task::yield_now().await;
        let id = transport.first_request_id();

        // Past half the deadline, report progress, then answer after the
        // original deadline would have expired.
        tokio::time::sleep(Duration::from_millis(150)).await;
        transport.deliver(json!({
            "jsonrpc": "2.0",
            "method": "notifications/progress",
            "params": {"requestId": id, "progress": 1},
        }));
        tokio::time::sleep(Duration::from_millis(250)).await;
        transport.deliver(json!({"jsonrpc": "2.0", "id": id, "result": "done"}));

        assert_eq!(call.await.unwrap().unwrap(), json!("done"));
    }

    #[tokio::test]
    async fn max_total_timeout_caps_progress_resets() {
        let (transport, protocol) = connected().await;
        let opts = RequestOptions {
            timeout: Duration::from_millis(100),
            reset_timeout_on_progress: true,
            max_total_timeout: Some(Duration::from_millis(250)),
            ..Default::default()
        };
        let p = Arc::clone(&protocol);
        let call = tokio::spawn(async move { p.request("forever", json!({}), opts).await });
        tokio::task::yield_now().await;
        let id = transport.first_request_id();

        // Keep reporting progress; the cap must still end the request.
        let feeder = {
            let transport = Arc::clone(&transport);
            tokio::spawn(async move {
                for _ in 0..10 {
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    transport.deliver(json!({
                        "jsonrpc": "2.0",
                        "method": "notifications/progress",
                        "params": {"requestId": id, "progress": 1},
                    }));
                }
            })
        };
        let start = std::time::Instant::now();
        let err = call.await.unwrap().unwrap_err();
        feeder.abort();
        assert!(err.is_timeout());
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn progress_callback_receives_params() {
        let (transport, protocol) = connected().await;
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen2 = Arc::clone(&seen);
        let opts = RequestOptions {
            on_progress: Some(Box::new(move |params| {
                seen2.lock().unwrap().push(params["progress"].as_i64().unwrap_or(0));
            })),
            ..Default::default()
        };
        let p = Arc::clone(&protocol);
        let call = tokio::spawn(async move { p.request("job", json!({}), opts).await });
        tokio::task::yield_now().await;
        let id = transport.first_request_id();

        transport.deliver(json!({
            "jsonrpc": "2.0",
            "method": "notifications/progress",
            "params": {"requestId": id, "progress": 42},
        }));
        transport.deliver(json!({"jsonrpc": "2.0", "id": id, "result": null}));
        call.await.unwrap().unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![42]);
    }

    #[tokio::test]
    async fn server_request_without_handler_gets_method_not_found() {
        let (transport, protocol) = connected().await;
        let _ = &protocol;
        transport.deliver(json!({"jsonrpc": "2.0", "id": 99, "method": "roots/list"}));
        // Allow the spawned responder to run.
        tokio::task::yield_now().await;
        tokio::time::sleep(Duration::from_millis(10)).await;

        let sent = transport.sent.lock().unwrap().clone();
        let resp = sent
            .iter()
            .find(|m| m["id"] == json!(99))
            .expect("a response was sent");
        assert_eq!(resp["error"]["code"], json!(codes::METHOD_NOT_FOUND));
    }

    #[tokio::test]
    async fn ping_is_answered_by_default() {
        let (transport, protocol) = connected().await;
        let _ = &protocol;
        transport.deliver(json!({"jsonrpc": "2.0", "id": 7, "method": "ping"}));
        tokio::time::sleep(Duration::from_millis(10)).await;

        let sent = transport.sent.lock().unwrap().clone();
        let resp = sent.iter().find(|m| m["id"] == json!(7)).expect("pong sent");
        assert!(resp.get("error").is_none());
    }

    #[tokio::test]
    async fn server_cancelled_notification_resolves_pending() {
        let (transport, protocol) = connected().await;
        let p = Arc::clone(&protocol);
        let call =
            tokio::spawn(async move { p.request("job", json!({}), Default::default()).await });
        tokio::task::yield_now().await;
        let id = transport.first_request_id();

        transport.deliver(json!({
            "jsonrpc": "2.0",
            "method": "notifications/cancelled",
            "params": {"requestId": id},
        }));
        assert!(matches!(call.await.unwrap().unwrap_err(), McpError::Cancelled));
    }

    #[tokio::test]
    async fn notification_handler_is_invoked() {
        let (transport, protocol) = connected().await;
        let hits = Arc::new(Mutex::new(0));
        let hits2 = Arc::clone(&hits);
        protocol.set_notification_handler(
            "notifications/message",
            Box::new(move |_| *hits2.lock().unwrap() += 1),
        );
        transport.deliver(json!({
            "jsonrpc": "2.0",
            "method": "notifications/message",
            "params": {"level": "info"},
        }));
        assert_eq!(*hits.lock().unwrap(), 1);
    }
}
