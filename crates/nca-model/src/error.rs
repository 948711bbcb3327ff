// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use thiserror::Error;

/// Errors surfaced by the streaming provider.
///
/// `Cancelled` is deliberately not a failure in the agent's eyes: it carries
/// the partial accumulation so callers can decide what to do with text that
/// was already streamed, and the turn is discarded without an error report.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("API key not set; run `nca config set api_key <key>`")]
    MissingApiKey,

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("request creation timed out after {0}s")]
    ConnectTimeout(u64),

    #[error("streaming timed out after {0}s")]
    StreamTimeout(u64),

    #[error("request cancelled")]
    Cancelled {
        /// Content accumulated before cancellation.
        content: String,
        /// Reasoning accumulated before cancellation.
        reasoning_content: String,
    },
}

impl ProviderError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ProviderError::Cancelled { .. })
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
