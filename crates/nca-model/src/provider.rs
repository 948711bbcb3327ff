// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::json;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::error::ProviderError;
use crate::sse::{drain_frames, SseFrame};
use crate::types::{ChatResponse, FinishReason, Message, StreamEvent};

/// The seam the agent loop talks through.
///
/// One production implementation ([`Provider`]) covers every
/// OpenAI-compatible backend; tests substitute scripted implementations.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Stream one completion, forwarding deltas to `events` in arrival
    /// order and returning the accumulated result.
    async fn stream_chat(
        &self,
        messages: &[Message],
        events: mpsc::Sender<StreamEvent>,
        cancel: &mut oneshot::Receiver<()>,
    ) -> Result<ChatResponse, ProviderError>;

    fn model_name(&self) -> &str;
}

/// Whole-call streaming deadline unless the user disabled it.
const DEFAULT_STREAM_TIMEOUT_SECS: u64 = 300;

/// Deadline for request creation (connect + headers), distinct from and
/// shorter than the streaming deadline.
const REQUEST_TIMEOUT_SECS: u64 = 120;

/// Configuration for one provider instance.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// API base ending before `/chat/completions`.
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub temperature: f32,
    /// `true` removes the whole-call streaming deadline.
    pub disable_stream_timeout: bool,
}

/// OpenAI-compatible streaming chat provider.
pub struct Provider {
    config: ProviderConfig,
    client: reqwest::Client,
}

impl Provider {
    pub fn new(config: ProviderConfig) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .user_agent(concat!("nca/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_default();
        Self { config, client }
    }
}

#[async_trait]
impl ChatProvider for Provider {
    fn model_name(&self) -> &str {
        &self.config.model
    }

    /// Stream one chat completion.
    ///
    /// Every delta is forwarded to `events` in SSE arrival order; the
    /// accumulated result is returned when the stream ends.  A
    /// `finish_reason` of `length` is returned as data so the caller can
    /// truncate the conversation and retry.
    ///
    /// Cancellation: `cancel` is raced against every body read.  An explicit
    /// send and a dropped sender both cancel the call (dropping the response
    /// body closes the connection), and the partial accumulation is returned
    /// inside [`ProviderError::Cancelled`].
    async fn stream_chat(
        &self,
        messages: &[Message],
        events: mpsc::Sender<StreamEvent>,
        cancel: &mut oneshot::Receiver<()>,
    ) -> Result<ChatResponse, ProviderError> {
        let key = self
            .config
            .api_key
            .as_deref()
            .ok_or(ProviderError::MissingApiKey)?;

        let body = json!({
            "model": self.config.model,
            "messages": messages,
            "stream": true,
            "temperature": self.config.temperature,
            "stream_options": { "include_usage": true },
        });

        let url = format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        );
        debug!(
            model = %self.config.model,
            message_count = messages.len(),
            "sending completion request"
        );

        let send = self.client.post(&url).bearer_auth(key).json(&body).send();
        let resp = match tokio::time::timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS), send)
            .await
        {
            Err(_) => return Err(ProviderError::ConnectTimeout(REQUEST_TIMEOUT_SECS)),
            Ok(Err(e)) => return Err(ProviderError::Http(e)),
            Ok(Ok(r)) => r,
        };

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(ProviderError::Api { status, body });
        }

        let deadline = if self.config.disable_stream_timeout {
            None
        } else {
            Some(tokio::time::Instant::now() + Duration::from_secs(DEFAULT_STREAM_TIMEOUT_SECS))
        };

        let mut stream = resp.bytes_stream();
        let mut line_buf = String::new();
        let mut out = ChatResponse::default();

        loop {
            let chunk = tokio::select! {
                biased;
                // Explicit send and dropped sender both cancel; dropping
                // `stream` on return closes the connection.
                _ = &mut *cancel => {
                    return Err(ProviderError::Cancelled {
                        content: out.content,
                        reasoning_content: out.reasoning_content,
                    });
                }
                _ = maybe_sleep_until(deadline) => {
                    return Err(ProviderError::StreamTimeout(DEFAULT_STREAM_TIMEOUT_SECS));
                }
                chunk = stream.next() => chunk,
            };

            let bytes = match chunk {
                None => break,
                Some(Err(e)) => return Err(ProviderError::Http(e)),
                Some(Ok(b)) => b,
            };
            line_buf.push_str(&String::from_utf8_lossy(&bytes));

            let mut done = false;
            for frame in drain_frames(&mut line_buf) {
                match frame {
                    SseFrame::Done => {
                        done = true;
                        break;
                    }
                    SseFrame::Chunk { reasoning, content, usage, finish_reason } => {
                        if let Some(r) = reasoning {
                            if !r.is_empty() {
                                out.reasoning_content.push_str(&r);
                                let _ = events.send(StreamEvent::Reasoning(r)).await;
                            }
                        }
                        if let Some(c) = content {
                            if !c.is_empty() {
                                out.content.push_str(&c);
                                let _ = events.send(StreamEvent::Content(c)).await;
                            }
                        }
                        if let Some(u) = usage {
                            out.usage = Some(u);
                        }
                        if let Some(fr) = finish_reason {
                            out.finish_reason = Some(FinishReason::from_wire(&fr));
                        }
                    }
                }
            }
            if done {
                break;
            }
        }

        let _ = events.send(StreamEvent::Done).await;
        debug!(
            content_len = out.content.len(),
            reasoning_len = out.reasoning_content.len(),
            usage = ?out.usage,
            finish = ?out.finish_reason,
            "stream complete"
        );
        Ok(out)
    }
}

/// Sleep until `deadline`, or forever when the streaming timeout is disabled.
async fn maybe_sleep_until(deadline: Option<tokio::time::Instant>) {
    match deadline {
        Some(d) => tokio::time::sleep_until(d).await,
        None => std::future::pending().await,
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
