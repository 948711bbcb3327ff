// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::McpError;
use crate::transport::{serialize_message, ReadBuffer, Transport, TransportHandlers};

/// Grace period between closing stdin and killing the process group.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// JSON-RPC over the stdin/stdout pipes of a child process.
///
/// The child runs in its own process group so the whole tree can be
/// signalled without touching the agent itself.  Stderr is not part of the
/// protocol; it is scanned for alarming lines and surfaced through the
/// error handler.
pub struct StdioTransport {
    command: String,
    args: Vec<String>,
    env: HashMap<String, String>,
    state: Mutex<Option<StdioState>>,
}

struct StdioState {
    child: Child,
    stdin: ChildStdin,
    read_task: JoinHandle<()>,
    stderr_task: JoinHandle<()>,
}

impl StdioTransport {
    pub fn new(command: String, args: Vec<String>, env: HashMap<String, String>) -> Self {
        Self {
            command,
            args,
            env,
            state: Mutex::new(None),
        }
    }
}

#[async_trait]
impl Transport for StdioTransport {
    async fn start(&self, handlers: TransportHandlers) -> Result<(), McpError> {
        let mut cmd = Command::new(&self.command);
        cmd.args(&self.args)
            .envs(&self.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd.spawn().map_err(|source| McpError::Spawn {
            command: self.command.clone(),
            source,
        })?;
        debug!(command = %self.command, pid = ?child.id(), "spawned MCP server");

        let stdin = child.stdin.take().ok_or_else(|| {
            McpError::Transport("child has no stdin pipe".to_string())
        })?;
        let stdout = child.stdout.take().ok_or_else(|| {
            McpError::Transport("child has no stdout pipe".to_string())
        })?;
        let stderr = child.stderr.take().ok_or_else(|| {
            McpError::Transport("child has no stderr pipe".to_string())
        })?;

        let TransportHandlers { on_message, on_error, on_close } = handlers;
        let on_error = Arc::new(on_error);

        // stdout → ReadBuffer → one JSON-RPC message per line.
        let read_on_error = Arc::clone(&on_error);
        let read_task = tokio::spawn(async move {
            let mut stdout = stdout;
            let mut buf = ReadBuffer::new();
            let mut chunk = [0u8; 8192];
            loop {
                match stdout.read(&mut chunk).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        buf.append(&chunk[..n]);
                        loop {
                            match buf.read_message() {
                                Ok(Some(msg)) => (on_message)(msg),
                                Ok(None) => break,
                                Err(e) => (read_on_error)(e),
                            }
                        }
                    }
                }
            }
            (on_close)();
        });

        // stderr is scanned for alarming lines and reported, never parsed.
        let stderr_on_error = Arc::clone(&on_error);
        let stderr_task = tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let lower = line.to_lowercase();
                if lower.contains("error") || lower.contains("fatal") || lower.contains("panic") {
                    (stderr_on_error)(McpError::Transport(line));
                }
            }
        });

        let mut state = self.state.lock().await;
        *state = Some(StdioState { child, stdin, read_task, stderr_task });
        Ok(())
    }

    async fn send(&self, message: Value) -> Result<(), McpError> {
        let bytes = serialize_message(&message)?;
        let mut state = self.state.lock().await;
        let state = state
            .as_mut()
            .ok_or_else(|| McpError::Transport("transport not started".to_string()))?;
        state
            .stdin
            .write_all(&bytes)
            .await
            .map_err(|e| McpError::Transport(format!("stdin write failed: {e}")))?;
        state
            .stdin
            .flush()
            .await
            .map_err(|e| McpError::Transport(format!("stdin flush failed: {e}")))
    }

    /// Close stdin, wait briefly for a graceful exit, then kill the process
    /// group.
    async fn close(&self) -> Result<(), McpError> {
        let Some(mut state) = self.state.lock().await.take() else {
            return Ok(());
        };
        let pid = state.child.id();
        drop(state.stdin); // EOF tells a well-behaved server to exit

        match tokio::time::timeout(SHUTDOWN_GRACE, state.child.wait()).await {
            Ok(Ok(status)) => debug!(?status, "MCP server exited"),
            Ok(Err(e)) => warn!(error = %e, "waiting for MCP server failed"),
            Err(_) => {
                warn!(?pid, "MCP server did not exit; killing process group");
                #[cfg(unix)]
                if let Some(pid) = pid {
                    // The child is its own process group leader.
                    unsafe {
                        libc::killpg(pid as libc::pid_t, libc::SIGKILL);
                    }
                }
                let _ = state.child.kill().await;
            }
        }
        state.stderr_task.abort();
        // The read task ends on its own at stdout EOF and fires on_close.
        let _ = state.read_task.await;
        Ok(())
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
