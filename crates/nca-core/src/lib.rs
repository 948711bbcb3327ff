// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Core agent machinery: the per-turn control loop and everything it
//! coordinates.
//!
//! - [`filter`] — incremental XML-tag filter producing the user-visible
//!   stream while tool markup is suppressed.
//! - [`parser`] — extracts one structured tool invocation from a completed
//!   assistant turn.
//! - [`conversation`] — message history plus the truncation policy that
//!   keeps it inside the model's context window.
//! - [`checkpoint`] — per-prompt journal of file mutations with
//!   restore/redo.
//! - [`agent`] — the turn loop tying provider, parser, tools, MCP hub,
//!   checkpoints, and truncation together.

pub mod agent;
pub mod checkpoint;
pub mod conversation;
pub mod events;
pub mod filter;
pub mod mentions;
pub mod parser;
pub mod prompts;

pub use agent::{Agent, AgentMode, TaskOutcome};
pub use checkpoint::{Checkpoint, CheckpointManager, FileOperation, FileOperationKind};
pub use conversation::{policy_for_usage, Conversation, TruncationError, TruncationPolicy};
pub use events::AgentEvent;
pub use filter::TagFilter;
pub use parser::{parse_assistant_message, ToolInvocation};
