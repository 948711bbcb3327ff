// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use crate::invocation::{ToolResult, ToolUse};
use crate::{definitions, execute, fs, git, search, web};

/// Run a local tool.
///
/// Terminal tools (`attempt_completion`, `ask_*`) and MCP forwarding are
/// handled by the agent loop before dispatch ever sees them; reaching this
/// function with one of those is a programming error reported as a tool
/// error rather than a panic.
pub async fn dispatch(tool: &ToolUse) -> ToolResult {
    match tool {
        ToolUse::ExecuteCommand { command, .. } => execute::execute_command(command).await,
        ToolUse::ReadFile { path } => fs::read_file(path),
        ToolUse::WriteToFile { path, content } => fs::write_to_file(path, content),
        ToolUse::ReplaceInFile { path, diff } => fs::replace_in_file(path, diff),
        ToolUse::SearchFiles { path, regex, file_pattern } => {
            search::search_files(path, regex, file_pattern.as_deref())
        }
        ToolUse::ListFiles { path, recursive } => search::list_files(path, *recursive),
        ToolUse::ListCodeDefinitionNames { path } => {
            definitions::list_code_definition_names(path)
        }
        ToolUse::FindFiles { path, pattern } => search::find_files(path, pattern),
        ToolUse::GitCommit { message, files } => git::git_commit(message, files).await,
        ToolUse::FetchWebContent { url } => web::fetch_web_content(url).await,
        ToolUse::AttemptCompletion { .. }
        | ToolUse::AskFollowupQuestion { .. }
        | ToolUse::AskModeResponse { .. } => {
            ToolResult::err(format!("{} is handled by the agent loop", tool.name()))
        }
        ToolUse::UseMcpTool { .. } | ToolUse::AccessMcpResource { .. } => {
            ToolResult::err(format!("{} requires the MCP hub", tool.name()))
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
