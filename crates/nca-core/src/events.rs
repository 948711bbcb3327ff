// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use crate::conversation::TruncationPolicy;

/// Events emitted by the agent during one user turn.
///
/// The REPL subscribes to these to drive its output: content chunks flow
/// through the display filter, the first one stops the spinner.
#[derive(Debug, Clone)]
pub enum AgentEvent {
    /// A reasoning delta from the model (`reasoning_content`).
    ReasoningChunk(String),
    /// A response text delta from the model.
    ContentChunk(String),
    /// The model stream for one request finished.
    StreamEnded,
    /// A checkpoint was opened for this prompt.
    CheckpointCreated(String),
    /// A tool is about to run.
    ToolStarted { name: String, summary: String },
    /// A tool finished.
    ToolFinished { name: String, is_error: bool },
    /// The conversation was truncated to fit the context window.
    Truncated {
        policy: TruncationPolicy,
        lo: usize,
        hi: usize,
    },
    /// A recoverable error the user should see.
    Error(String),
}
