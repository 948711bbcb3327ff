// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use serde::{Deserialize, Serialize};

/// A single message in the conversation history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(text: impl Into<String>) -> Self {
        Self { role: Role::System, content: text.into() }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self { role: Role::User, content: text.into() }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: text.into() }
    }

    /// Approximate token count used for context management (4 chars ≈ 1 token).
    pub fn approx_tokens(&self) -> usize {
        (self.content.len() / 4).max(1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// Token usage reported by the provider for one streaming call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
    #[serde(default)]
    pub total_tokens: u32,
}

/// Why the model stopped emitting tokens.
///
/// `Length` signals a context-window overflow and is returned as data (never
/// raised) so the caller can truncate the conversation and retry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinishReason {
    Stop,
    Length,
    Other(String),
}

impl FinishReason {
    pub fn from_wire(s: &str) -> Self {
        match s {
            "stop" => FinishReason::Stop,
            "length" => FinishReason::Length,
            other => FinishReason::Other(other.to_string()),
        }
    }

    pub fn is_length(&self) -> bool {
        matches!(self, FinishReason::Length)
    }
}

/// One streamed event from the model.
///
/// Consumers receive these in SSE arrival order; `Done` is always the final
/// event of a successfully finished stream.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// A reasoning/thinking delta (`delta.reasoning_content`).
    Reasoning(String),
    /// A response text delta (`delta.content`).
    Content(String),
    /// The stream finished; accumulated results follow in [`ChatResponse`].
    Done,
}

/// Accumulated result of one streaming call.
#[derive(Debug, Clone, Default)]
pub struct ChatResponse {
    pub reasoning_content: String,
    pub content: String,
    pub usage: Option<Usage>,
    pub finish_reason: Option<FinishReason>,
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
