// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Leaf tool implementations and the typed tool vocabulary.
//!
//! The model requests side effects through XML-shaped tool tags; this crate
//! owns the closed set of recognized tools as a tagged [`ToolUse`] enum, the
//! tag/label tables shared by the display filter and the invocation parser,
//! and the local implementations the agent dispatches to.
//!
//! Tool failures are data, not errors: every implementation returns a
//! [`ToolResult`] whose content becomes conversation text for the model to
//! react to.

mod definitions;
mod dispatch;
mod execute;
mod fs;
mod git;
mod invocation;
mod search;
pub mod tags;
mod web;

pub use definitions::list_code_definition_names;
pub use dispatch::dispatch;
pub use execute::{delete_targets, execute_command};
pub use fs::{read_file, replace_in_file, write_to_file};
pub use git::{git_commit, git_commit_in};
pub use invocation::{ToolResult, ToolUse};
pub use search::{find_files, list_files, search_files};
pub use web::{fetch_url_as_text, fetch_web_content};
