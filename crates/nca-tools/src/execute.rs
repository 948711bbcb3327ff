// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::time::Duration;

use tokio::process::Command;
use tracing::debug;

use crate::invocation::ToolResult;

const OUTPUT_LIMIT: usize = 100_000;
const COMMAND_TIMEOUT_SECS: u64 = 120;

/// Run a shell command and format stdout/stderr/exit code into a tool result.
///
/// Non-zero exit codes come back as error results so the model sees the
/// failure; the output itself is still included.
pub async fn execute_command(command: &str) -> ToolResult {
    debug!(cmd = %command, "execute_command tool");

    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(command);

    let result = tokio::time::timeout(
        Duration::from_secs(COMMAND_TIMEOUT_SECS),
        cmd.output(),
    )
    .await;

    match result {
        Ok(Ok(output)) => {
            let mut content = String::new();
            let stdout = String::from_utf8_lossy(&output.stdout);
            let stderr = String::from_utf8_lossy(&output.stderr);

            if !stdout.is_empty() {
                content.push_str(&truncate(&stdout, OUTPUT_LIMIT));
            }
            if !stderr.is_empty() {
                if !content.is_empty() {
                    content.push('\n');
                }
                content.push_str("[stderr]\n");
                content.push_str(&truncate(&stderr, OUTPUT_LIMIT));
            }
            if content.is_empty() {
                content = format!("[exit {}]", output.status.code().unwrap_or(-1));
            }

            if output.status.success() {
                ToolResult::ok(content)
            } else {
                let code = output.status.code().unwrap_or(-1);
                ToolResult::err(format!("[exit {code}]\n{content}"))
            }
        }
        Ok(Err(e)) => ToolResult::err(format!("spawn error: {e}")),
        Err(_) => ToolResult::err(format!("timeout after {COMMAND_TIMEOUT_SECS}s")),
    }
}

/// Paths a delete-style command would remove, or empty when the command is
/// not a delete.
///
/// The agent snapshots these files into the checkpoint journal before
/// running the command so the deletion can be undone.  Only plain `rm`
/// invocations are recognized; anything shell-composed (pipes, subshells,
/// xargs) is beyond what a snapshot can promise.
pub fn delete_targets(command: &str) -> Vec<String> {
    let trimmed = command.trim();
    let mut parts = trimmed.split_whitespace();
    match parts.next() {
        Some("rm") => {}
        _ => return Vec::new(),
    }
    parts
        .filter(|p| !p.starts_with('-'))
        .map(str::to_string)
        .collect()
}

fn truncate(s: &str, limit: usize) -> String {
    if s.len() <= limit {
        s.to_string()
    } else {
        format!("{}...[truncated {} bytes]", &s[..limit], s.len() - limit)
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
