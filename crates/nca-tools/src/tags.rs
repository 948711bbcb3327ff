// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Tag tables shared by the display filter and the invocation parser.
//!
//! Both components must agree on which root tags open a tool, which
//! parameter bodies pass through verbatim, and which are swallowed entirely.
//! Keeping the tables here prevents the two scanners from drifting apart.

/// Root tags recognized as tool invocations, in no particular order.
pub const TOOL_TAGS: &[&str] = &[
    "execute_command",
    "read_file",
    "write_to_file",
    "replace_in_file",
    "search_files",
    "list_files",
    "list_code_definition_names",
    "attempt_completion",
    "ask_followup_question",
    "ask_mode_response",
    "git_commit",
    "fetch_web_content",
    "find_files",
    "use_mcp_tool",
    "access_mcp_resource",
];

/// Parameter tags whose bodies pass through untouched, including any `<` and
/// `>` inside, until the literal closing string is seen.
pub const OPAQUE_PARAMS: &[&str] = &["diff", "content"];

/// Parameter tags swallowed entirely, body included.
pub const HIDDEN_PARAMS: &[&str] = &["requires_approval", "recursive"];

pub fn is_tool_tag(name: &str) -> bool {
    TOOL_TAGS.contains(&name)
}

pub fn is_opaque_param(name: &str) -> bool {
    OPAQUE_PARAMS.contains(&name)
}

pub fn is_hidden_param(name: &str) -> bool {
    HIDDEN_PARAMS.contains(&name)
}

/// Human label shown before a parameter body in the terminal.
///
/// An empty label means the body is shown bare; `None` falls back to the
/// generic `"<param> "` form so new parameters never disappear silently.
pub fn display_label(tool: &str, param: &str) -> Option<&'static str> {
    Some(match (tool, param) {
        ("execute_command", "command") => "Execute ",
        ("read_file", "path") => "Read ",
        ("write_to_file", "path") => "Write ",
        ("replace_in_file", "path") => "Edit ",
        ("search_files", "regex") => "Search ",
        ("search_files", "path") => " in ",
        ("search_files", "file_pattern") => " files ",
        ("list_files", "path") => "List ",
        ("list_code_definition_names", "path") => "Definitions ",
        ("find_files", "pattern") => "Find ",
        ("find_files", "path") => " in ",
        ("git_commit", "message") => "Commit ",
        ("git_commit", "files") => " files ",
        ("fetch_web_content", "url") => "Fetch ",
        ("attempt_completion", "result") => "",
        ("attempt_completion", "command") => "Run ",
        ("ask_followup_question", "question") => "",
        ("ask_mode_response", "response") => "",
        ("use_mcp_tool", "server_name") => "MCP server ",
        ("use_mcp_tool", "tool_name") => " tool ",
        ("use_mcp_tool", "arguments") => " args ",
        ("access_mcp_resource", "server_name") => "MCP server ",
        ("access_mcp_resource", "uri") => " resource ",
        _ => return None,
    })
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
