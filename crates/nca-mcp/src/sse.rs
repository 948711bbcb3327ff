// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::Value;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::McpError;
use crate::transport::{Transport, TransportHandlers};

/// How long `send` waits for the server to advertise its POST endpoint.
const ENDPOINT_WAIT: Duration = Duration::from_secs(10);

/// JSON-RPC over Server-Sent Events.
///
/// Inbound messages arrive on a long-lived `GET` with
/// `Accept: text/event-stream`; outbound messages are POSTed to the URL the
/// server advertises in its initial `endpoint` event.
pub struct SseTransport {
    url: String,
    headers: HashMap<String, String>,
    client: reqwest::Client,
    post_url: Arc<StdMutex<Option<String>>>,
    endpoint_ready: Arc<Notify>,
    read_task: Mutex<Option<JoinHandle<()>>>,
}

impl SseTransport {
    pub fn new(url: String, headers: HashMap<String, String>) -> Self {
        Self {
            url,
            headers,
            client: reqwest::Client::new(),
            post_url: Arc::new(StdMutex::new(None)),
            endpoint_ready: Arc::new(Notify::new()),
            read_task: Mutex::new(None),
        }
    }
}

#[async_trait]
impl Transport for SseTransport {
    async fn start(&self, handlers: TransportHandlers) -> Result<(), McpError> {
        let mut req = self
            .client
            .get(&self.url)
            .header("Accept", "text/event-stream");
        for (name, value) in &self.headers {
            req = req.header(name.as_str(), value.as_str());
        }
        let resp = req
            .send()
            .await
            .map_err(|e| McpError::Transport(format!("SSE connect failed: {e}")))?;
        if !resp.status().is_success() {
            return Err(McpError::Transport(format!(
                "SSE connect failed: HTTP {}",
                resp.status()
            )));
        }
        debug!(url = %self.url, "SSE stream open");

        let TransportHandlers { on_message, on_error, on_close } = handlers;
        let base_url = self.url.clone();
        let post_url = Arc::clone(&self.post_url);
        let endpoint_ready = Arc::clone(&self.endpoint_ready);

        let task = tokio::spawn(async move {
            let mut stream = resp.bytes_stream();
            let mut line_buf = String::new();
            let mut decoder = SseFrameDecoder::default();
            'read: while let Some(chunk) = stream.next().await {
                let bytes = match chunk {
                    Ok(b) => b,
                    Err(e) => {
                        (on_error)(McpError::Transport(format!("SSE read failed: {e}")));
                        break 'read;
                    }
                };
                line_buf.push_str(&String::from_utf8_lossy(&bytes));
                while let Some(pos) = line_buf.find('\n') {
                    let line = line_buf[..pos].trim_end_matches('\r').to_string();
                    line_buf = line_buf[pos + 1..].to_string();
                    if let Some(event) = decoder.push_line(&line) {
                        match event.name.as_str() {
                            "endpoint" => {
                                let resolved = resolve_endpoint(&base_url, &event.data);
                                debug!(endpoint = %resolved, "server advertised POST endpoint");
                                *post_url.lock().expect("post url poisoned") = Some(resolved);
                                endpoint_ready.notify_waiters();
                            }
                            _ => match serde_json::from_str::<Value>(&event.data) {
                                Ok(msg) => (on_message)(msg),
                                Err(e) => (on_error)(McpError::Serialization(e)),
                            },
                        }
                    }
                }
            }
            (on_close)();
        });

        *self.read_task.lock().await = Some(task);
        Ok(())
    }

    async fn send(&self, message: Value) -> Result<(), McpError> {
        let target = {
            let known = self.post_url.lock().expect("post url poisoned").clone();
            match known {
                Some(t) => t,
                None => {
                    // The endpoint event may still be in flight right after
                    // connect; wait for it, bounded.  The notification can
                    // race the first check, so re-read the slot either way.
                    let _ = tokio::time::timeout(ENDPOINT_WAIT, self.endpoint_ready.notified())
                        .await;
                    self.post_url
                        .lock()
                        .expect("post url poisoned")
                        .clone()
                        .ok_or_else(|| {
                            McpError::Transport(
                                "server never advertised a POST endpoint".to_string(),
                            )
                        })?
                }
            }
        };

        let mut req = self.client.post(&target).json(&message);
        for (name, value) in &self.headers {
            req = req.header(name.as_str(), value.as_str());
        }
        let resp = req
            .send()
            .await
            .map_err(|e| McpError::Transport(format!("SSE POST failed: {e}")))?;
        if !resp.status().is_success() {
            return Err(McpError::Transport(format!(
                "SSE POST failed: HTTP {}",
                resp.status()
            )));
        }
        Ok(())
    }

    async fn close(&self) -> Result<(), McpError> {
        if let Some(task) = self.read_task.lock().await.take() {
            task.abort();
            let _ = task.await;
        }
        Ok(())
    }
}

/// One dispatched SSE event.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SseEvent {
    pub name: String,
    pub data: String,
}

/// Incremental `event:`/`data:` frame decoder.
///
/// Fields accumulate until a blank line dispatches the event.  Unknown
/// fields and comment lines (leading `:`) are ignored per the SSE format.
#[derive(Debug, Default)]
pub(crate) struct SseFrameDecoder {
    event: Option<String>,
    data: Vec<String>,
}

impl SseFrameDecoder {
    /// Feed one complete line; a blank line completes and returns the event.
    pub fn push_line(&mut self, line: &str) -> Option<SseEvent> {
        if line.is_empty() {
            if self.data.is_empty() {
                self.event = None;
                return None;
            }
            let event = SseEvent {
                name: self.event.take().unwrap_or_else(|| "message".to_string()),
                data: self.data.join("\n"),
            };
            self.data.clear();
            return Some(event);
        }
        if let Some(rest) = line.strip_prefix("event:") {
            self.event = Some(rest.trim().to_string());
        } else if let Some(rest) = line.strip_prefix("data:") {
            self.data.push(rest.strip_prefix(' ').unwrap_or(rest).to_string());
        } else if line.starts_with(':') {
            // comment / keepalive
        } else {
            warn!(line, "unrecognized SSE field ignored");
        }
        None
    }
}

/// Resolve the advertised endpoint against the event-stream URL.
pub(crate) fn resolve_endpoint(base: &str, endpoint: &str) -> String {
    if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
        return endpoint.to_string();
    }
    // scheme://host[:port] of the base URL
    let origin = match base.find("://") {
        Some(scheme_end) => match base[scheme_end + 3..].find('/') {
            Some(path_start) => &base[..scheme_end + 3 + path_start],
            None => base,
        },
        None => base,
    };
    if endpoint.starts_with('/') {
        format!("{origin}{endpoint}")
    } else {
        format!("{origin}/{endpoint}")
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
