// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::BTreeMap;

/// A tool invocation with a typed payload per tool.
///
/// The closed tool vocabulary is modeled as a tagged enum rather than a
/// string→value map, so a missing or mistyped parameter is caught at
/// construction and reported back to the model as a tool result.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolUse {
    ExecuteCommand {
        command: String,
        requires_approval: bool,
    },
    ReadFile {
        path: String,
    },
    WriteToFile {
        path: String,
        content: String,
    },
    ReplaceInFile {
        path: String,
        diff: String,
    },
    SearchFiles {
        path: String,
        regex: String,
        file_pattern: Option<String>,
    },
    ListFiles {
        path: String,
        recursive: bool,
    },
    ListCodeDefinitionNames {
        path: String,
    },
    FindFiles {
        path: String,
        pattern: String,
    },
    GitCommit {
        message: String,
        files: Vec<String>,
    },
    FetchWebContent {
        url: String,
    },
    AttemptCompletion {
        result: String,
        command: Option<String>,
    },
    AskFollowupQuestion {
        question: String,
    },
    AskModeResponse {
        response: String,
    },
    UseMcpTool {
        server_name: String,
        tool_name: String,
        arguments: Option<String>,
    },
    AccessMcpResource {
        server_name: String,
        uri: String,
    },
}

impl ToolUse {
    /// Build a typed invocation from the raw parameter map the parser
    /// extracted.  Values arrive pre-trimmed except `content` and `diff`,
    /// which are verbatim.
    ///
    /// Returns a model-facing error message when a required parameter is
    /// missing.
    pub fn from_params(tool: &str, params: &BTreeMap<String, String>) -> Result<ToolUse, String> {
        let req = |key: &str| -> Result<String, String> {
            params
                .get(key)
                .cloned()
                .ok_or_else(|| format!("Missing required parameter '{key}' for tool '{tool}'"))
        };
        let opt = |key: &str| params.get(key).cloned().filter(|v| !v.is_empty());
        // Booleans are case-sensitive: only the literal "true" is true.
        let flag = |key: &str| params.get(key).map(|v| v == "true").unwrap_or(false);

        Ok(match tool {
            "execute_command" => ToolUse::ExecuteCommand {
                command: req("command")?,
                requires_approval: flag("requires_approval"),
            },
            "read_file" => ToolUse::ReadFile { path: req("path")? },
            "write_to_file" => ToolUse::WriteToFile {
                path: req("path")?,
                content: req("content")?,
            },
            "replace_in_file" => ToolUse::ReplaceInFile {
                path: req("path")?,
                diff: req("diff")?,
            },
            "search_files" => ToolUse::SearchFiles {
                path: req("path")?,
                regex: req("regex")?,
                file_pattern: opt("file_pattern"),
            },
            "list_files" => ToolUse::ListFiles {
                path: req("path")?,
                recursive: flag("recursive"),
            },
            "list_code_definition_names" => {
                ToolUse::ListCodeDefinitionNames { path: req("path")? }
            }
            "find_files" => ToolUse::FindFiles {
                path: req("path")?,
                pattern: req("pattern")?,
            },
            "git_commit" => ToolUse::GitCommit {
                message: req("message")?,
                files: opt("files")
                    .map(|f| {
                        f.lines()
                            .map(str::trim)
                            .filter(|l| !l.is_empty())
                            .map(str::to_string)
                            .collect()
                    })
                    .unwrap_or_default(),
            },
            "fetch_web_content" => ToolUse::FetchWebContent { url: req("url")? },
            "attempt_completion" => ToolUse::AttemptCompletion {
                result: req("result")?,
                command: opt("command"),
            },
            "ask_followup_question" => ToolUse::AskFollowupQuestion {
                question: req("question")?,
            },
            "ask_mode_response" => ToolUse::AskModeResponse {
                response: req("response")?,
            },
            "use_mcp_tool" => ToolUse::UseMcpTool {
                server_name: req("server_name")?,
                tool_name: req("tool_name")?,
                arguments: opt("arguments"),
            },
            "access_mcp_resource" => ToolUse::AccessMcpResource {
                server_name: req("server_name")?,
                uri: req("uri")?,
            },
            other => return Err(format!("Unknown tool '{other}'")),
        })
    }

    /// The wire name of this tool.
    pub fn name(&self) -> &'static str {
        match self {
            ToolUse::ExecuteCommand { .. } => "execute_command",
            ToolUse::ReadFile { .. } => "read_file",
            ToolUse::WriteToFile { .. } => "write_to_file",
            ToolUse::ReplaceInFile { .. } => "replace_in_file",
            ToolUse::SearchFiles { .. } => "search_files",
            ToolUse::ListFiles { .. } => "list_files",
            ToolUse::ListCodeDefinitionNames { .. } => "list_code_definition_names",
            ToolUse::FindFiles { .. } => "find_files",
            ToolUse::GitCommit { .. } => "git_commit",
            ToolUse::FetchWebContent { .. } => "fetch_web_content",
            ToolUse::AttemptCompletion { .. } => "attempt_completion",
            ToolUse::AskFollowupQuestion { .. } => "ask_followup_question",
            ToolUse::AskModeResponse { .. } => "ask_mode_response",
            ToolUse::UseMcpTool { .. } => "use_mcp_tool",
            ToolUse::AccessMcpResource { .. } => "access_mcp_resource",
        }
    }

    /// Terminal tools end the turn without a follow-up user message.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ToolUse::AttemptCompletion { .. }
                | ToolUse::AskFollowupQuestion { .. }
                | ToolUse::AskModeResponse { .. }
        )
    }

    /// The file path this tool mutates directly, if any.  Used by the agent
    /// to snapshot old content into the checkpoint journal before execution.
    pub fn mutated_path(&self) -> Option<&str> {
        match self {
            ToolUse::WriteToFile { path, .. } | ToolUse::ReplaceInFile { path, .. } => {
                Some(path)
            }
            _ => None,
        }
    }
}

/// The outcome of executing a tool.  Errors are carried as content so the
/// model can react; nothing here aborts the turn.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolResult {
    pub content: String,
    pub is_error: bool,
}

impl ToolResult {
    pub fn ok(content: impl Into<String>) -> Self {
        Self { content: content.into(), is_error: false }
    }

    pub fn err(msg: impl Into<String>) -> Self {
        Self { content: msg.into(), is_error: true }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
