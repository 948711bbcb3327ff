// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::Path;

use tokio::process::Command;
use tracing::debug;

use crate::invocation::ToolResult;

/// Stage the listed files (everything when the list is empty) and commit in
/// the process working directory.
///
/// Returns the commit output, which includes the short hash in git's
/// `[branch abc1234] message` header line.
pub async fn git_commit(message: &str, files: &[String]) -> ToolResult {
    git_commit_in(None, message, files).await
}

/// Like [`git_commit`] but pinned to an explicit repository directory.
pub async fn git_commit_in(repo: Option<&Path>, message: &str, files: &[String]) -> ToolResult {
    if message.trim().is_empty() {
        return ToolResult::err("commit message is empty");
    }
    debug!(files = files.len(), "git_commit tool");

    let mut add = Command::new("git");
    if let Some(dir) = repo {
        add.current_dir(dir);
    }
    add.arg("add");
    if files.is_empty() {
        add.arg("-A");
    } else {
        add.arg("--").args(files);
    }
    match add.output().await {
        Ok(out) if !out.status.success() => {
            return ToolResult::err(format!(
                "git add failed: {}",
                String::from_utf8_lossy(&out.stderr).trim()
            ));
        }
        Err(e) => return ToolResult::err(format!("git add failed: {e}")),
        Ok(_) => {}
    }

    let mut commit = Command::new("git");
    if let Some(dir) = repo {
        commit.current_dir(dir);
    }
    commit.args(["commit", "-m", message]);
    match commit.output().await {
        Ok(out) if out.status.success() => {
            ToolResult::ok(String::from_utf8_lossy(&out.stdout).trim().to_string())
        }
        Ok(out) => {
            let stdout = String::from_utf8_lossy(&out.stdout);
            let stderr = String::from_utf8_lossy(&out.stderr);
            ToolResult::err(format!("git commit failed: {}{}", stdout.trim(), stderr.trim()))
        }
        Err(e) => ToolResult::err(format!("git commit failed: {e}")),
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
