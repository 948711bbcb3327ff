// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex as StdMutex};

use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use nca_mcp::McpHub;
use nca_model::{
    ChatProvider, ChatResponse, FinishReason, ModelInfo, ProviderError, StreamEvent, Usage,
};
use nca_tools::{delete_targets, ToolResult, ToolUse};

use crate::checkpoint::{CheckpointManager, FileOperationKind};
use crate::conversation::{policy_for_usage, Conversation, TruncationPolicy};
use crate::events::AgentEvent;
use crate::mentions::expand_mentions;
use crate::parser::parse_assistant_message;
use crate::prompts;

/// Model-call budget for one user prompt.
pub const MAX_TURNS: u32 = 25;

/// Consecutive tool-free replies tolerated before the turn aborts.
pub const MAX_NO_TOOL_ATTEMPTS: u32 = 3;

/// Operating mode, toggled from the REPL between prompts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentMode {
    Agent,
    Ask,
}

impl AgentMode {
    pub fn toggled(self) -> Self {
        match self {
            AgentMode::Agent => AgentMode::Ask,
            AgentMode::Ask => AgentMode::Agent,
        }
    }
}

impl std::fmt::Display for AgentMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentMode::Agent => write!(f, "agent"),
            AgentMode::Ask => write!(f, "ask"),
        }
    }
}

/// How one user turn ended.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome {
    /// A terminal tool ended the turn normally.
    Completed,
    /// The user cancelled; the partial assistant turn was discarded.
    Aborted,
    /// The turn aborted with a user-facing message.
    Failed(String),
    /// The 25-call budget ran out.
    BudgetExhausted,
}

/// Shared slot the SIGINT task fires to cancel the in-flight model call.
pub type CancelSlot = Arc<StdMutex<Option<oneshot::Sender<()>>>>;

/// The per-turn control loop and everything it owns.
pub struct Agent {
    provider: Arc<dyn ChatProvider>,
    model_info: ModelInfo,
    conversation: Conversation,
    checkpoints: CheckpointManager,
    hub: Option<Arc<McpHub>>,
    pub mode: AgentMode,
    workdir: PathBuf,
    cancel_slot: CancelSlot,
}

impl Agent {
    pub fn new(
        provider: Arc<dyn ChatProvider>,
        model_info: ModelInfo,
        checkpoints: CheckpointManager,
        hub: Option<Arc<McpHub>>,
        mode: AgentMode,
        workdir: PathBuf,
    ) -> Self {
        Self {
            provider,
            model_info,
            conversation: Conversation::new(prompts::system_prompt()),
            checkpoints,
            hub,
            mode,
            workdir,
            cancel_slot: Arc::new(StdMutex::new(None)),
        }
    }

    /// The slot a SIGINT handler fires to cancel the current model call.
    pub fn cancel_slot(&self) -> CancelSlot {
        Arc::clone(&self.cancel_slot)
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn conversation_mut(&mut self) -> &mut Conversation {
        &mut self.conversation
    }

    pub fn checkpoints(&self) -> &CheckpointManager {
        &self.checkpoints
    }

    /// Run one user prompt to completion.
    ///
    /// `Err` is reserved for transport-level failures the REPL reports
    /// before returning to the prompt; everything the loop can recover from
    /// or conclude on its own comes back as a [`TaskOutcome`].
    pub async fn run_task(
        &mut self,
        prompt: &str,
        events: mpsc::Sender<AgentEvent>,
    ) -> anyhow::Result<TaskOutcome> {
        let expanded = expand_mentions(prompt).await;
        let checkpoint_id = self.checkpoints.create_checkpoint(prompt)?;
        let _ = events
            .send(AgentEvent::CheckpointCreated(checkpoint_id))
            .await;

        let env = prompts::environment_details(self.mode, &self.workdir.display().to_string());
        self.conversation.push_user(format!("{expanded}\n\n{env}"));

        let mut no_tool_attempts = 0u32;

        for turn in 0..MAX_TURNS {
            debug!(turn, "model call");
            let response = match self.stream_once(&events).await {
                Ok(r) => r,
                Err(e) if e.is_cancelled() => {
                    // Discard the partial assistant turn; the conversation
                    // still ends with the pending user message.
                    return Ok(TaskOutcome::Aborted);
                }
                Err(e) => {
                    let _ = events.send(AgentEvent::Error(e.to_string())).await;
                    return Err(e.into());
                }
            };

            if matches!(response.finish_reason, Some(FinishReason::Length)) {
                // The reply was cut off by the context window: drop the
                // partial output, shrink, retry.
                match self.truncate(TruncationPolicy::Quarter, &events).await {
                    Ok(()) => continue,
                    Err(msg) => return Ok(TaskOutcome::Failed(msg)),
                }
            }

            self.conversation.push_assistant(response.content.clone());

            let Some(invocation) = parse_assistant_message(&response.content) else {
                no_tool_attempts += 1;
                if no_tool_attempts >= MAX_NO_TOOL_ATTEMPTS {
                    let msg = format!(
                        "[FATAL ERROR] No tool use in {MAX_NO_TOOL_ATTEMPTS} consecutive \
                         replies; giving up on this task. Use /clear to start fresh."
                    );
                    let _ = events.send(AgentEvent::Error(msg.clone())).await;
                    return Ok(TaskOutcome::Failed(msg));
                }
                self.conversation.push_user(format!(
                    "[ERROR] You did not use a tool in your previous response. You MUST \
                     retry with a tool use (Attempt {no_tool_attempts}/{MAX_NO_TOOL_ATTEMPTS})."
                ));
                if let Err(outcome) = self.settle_usage(response.usage.as_ref(), &events).await {
                    return Ok(outcome);
                }
                continue;
            };

            no_tool_attempts = 0;

            let tool_use = match invocation.to_tool_use() {
                Ok(t) => t,
                Err(msg) => {
                    // A malformed invocation is tool feedback, not a crash.
                    self.conversation
                        .push_user(format!("[{}] Error: {msg}", invocation.name));
                    if let Err(outcome) =
                        self.settle_usage(response.usage.as_ref(), &events).await
                    {
                        return Ok(outcome);
                    }
                    continue;
                }
            };

            if tool_use.is_terminal() {
                return Ok(TaskOutcome::Completed);
            }

            let _ = events
                .send(AgentEvent::ToolStarted {
                    name: tool_use.name().to_string(),
                    summary: tool_summary(&tool_use),
                })
                .await;
            let result = self.execute_tool(&tool_use).await;
            let _ = events
                .send(AgentEvent::ToolFinished {
                    name: tool_use.name().to_string(),
                    is_error: result.is_error,
                })
                .await;

            let label = if result.is_error { "Error" } else { "Result" };
            let mut feedback = format!("[{}] {label}:\n{}", tool_use.name(), result.content);
            if invocation.multi {
                feedback.push_str(&format!(
                    "\n\n[ERROR] Multiple tool uses detected ({}). Only one tool may be \
                     used per message.",
                    invocation.detected_tools
                ));
            }
            self.conversation.push_user(feedback);

            if let Err(outcome) = self.settle_usage(response.usage.as_ref(), &events).await {
                return Ok(outcome);
            }
        }

        let msg = format!("Task stopped after {MAX_TURNS} tool calls without completing.");
        let _ = events.send(AgentEvent::Error(msg)).await;
        Ok(TaskOutcome::BudgetExhausted)
    }

    /// One provider call with display forwarding and a fresh cancel handle
    /// parked in the shared slot.
    async fn stream_once(
        &mut self,
        events: &mpsc::Sender<AgentEvent>,
    ) -> Result<ChatResponse, ProviderError> {
        let (tx, mut rx) = mpsc::channel::<StreamEvent>(64);
        let display = events.clone();
        let forwarder = tokio::spawn(async move {
            while let Some(ev) = rx.recv().await {
                let mapped = match ev {
                    StreamEvent::Reasoning(s) => AgentEvent::ReasoningChunk(s),
                    StreamEvent::Content(s) => AgentEvent::ContentChunk(s),
                    StreamEvent::Done => AgentEvent::StreamEnded,
                };
                if display.send(mapped).await.is_err() {
                    break;
                }
            }
        });

        let (cancel_tx, mut cancel_rx) = oneshot::channel();
        *self.cancel_slot.lock().expect("cancel slot poisoned") = Some(cancel_tx);

        let messages = self.conversation.effective_messages();
        let result = self.provider.stream_chat(&messages, tx, &mut cancel_rx).await;

        // Disarm the handle; it may already be gone if SIGINT fired.
        self.cancel_slot.lock().expect("cancel slot poisoned").take();
        let _ = forwarder.await;
        result
    }

    /// Apply the post-turn truncation policy derived from the usage report.
    async fn settle_usage(
        &mut self,
        usage: Option<&Usage>,
        events: &mpsc::Sender<AgentEvent>,
    ) -> Result<(), TaskOutcome> {
        let Some(usage) = usage else {
            return Ok(());
        };
        let Some(policy) = policy_for_usage(usage, &self.model_info) else {
            return Ok(());
        };
        match self.truncate(policy, events).await {
            Ok(()) => Ok(()),
            Err(msg) => Err(TaskOutcome::Failed(msg)),
        }
    }

    async fn truncate(
        &mut self,
        policy: TruncationPolicy,
        events: &mpsc::Sender<AgentEvent>,
    ) -> Result<(), String> {
        match self.conversation.truncate(policy) {
            Ok((lo, hi)) => {
                let _ = events.send(AgentEvent::Truncated { policy, lo, hi }).await;
                Ok(())
            }
            Err(e) => {
                let msg = e.to_string();
                let _ = events.send(AgentEvent::Error(msg.clone())).await;
                Err(msg)
            }
        }
    }

    /// Dispatch one tool, journaling filesystem mutations around it.
    async fn execute_tool(&mut self, tool_use: &ToolUse) -> ToolResult {
        match tool_use {
            ToolUse::WriteToFile { path, content } => {
                let old = std::fs::read_to_string(path).unwrap_or_default();
                let result = nca_tools::dispatch(tool_use).await;
                if !result.is_error {
                    self.record(FileOperationKind::Write, path, content.clone(), old);
                }
                result
            }
            ToolUse::ReplaceInFile { path, .. } => {
                let old = std::fs::read_to_string(path).unwrap_or_default();
                let result = nca_tools::dispatch(tool_use).await;
                if !result.is_error {
                    let new = std::fs::read_to_string(path).unwrap_or_default();
                    self.record(FileOperationKind::Replace, path, new, old);
                }
                result
            }
            ToolUse::ExecuteCommand { command, .. } => {
                // Snapshot anything a delete command would remove so the
                // checkpoint can bring it back.
                let snapshots: Vec<(String, String)> = delete_targets(command)
                    .into_iter()
                    .filter_map(|p| std::fs::read_to_string(&p).ok().map(|c| (p, c)))
                    .collect();
                let result = nca_tools::dispatch(tool_use).await;
                for (path, old) in snapshots {
                    if !Path::new(&path).exists() {
                        self.record(FileOperationKind::Delete, &path, String::new(), old);
                    }
                }
                result
            }
            ToolUse::UseMcpTool { server_name, tool_name, arguments } => {
                let Some(hub) = &self.hub else {
                    return ToolResult::err(
                        "No MCP servers are configured (mcp_settings.json is missing or empty)",
                    );
                };
                let args: Value = match arguments {
                    None => Value::Object(Default::default()),
                    Some(raw) => match serde_json::from_str(raw) {
                        Ok(v) => v,
                        Err(e) => {
                            return ToolResult::err(format!(
                                "arguments is not valid JSON: {e}"
                            ))
                        }
                    },
                };
                match hub.call_tool(server_name, tool_name, args).await {
                    Ok(out) => ToolResult::ok(out),
                    Err(e) => ToolResult::err(format!("MCP request failed: {e}")),
                }
            }
            ToolUse::AccessMcpResource { server_name, uri } => {
                let Some(hub) = &self.hub else {
                    return ToolResult::err(
                        "No MCP servers are configured (mcp_settings.json is missing or empty)",
                    );
                };
                match hub.read_resource(server_name, uri).await {
                    Ok(out) => ToolResult::ok(out),
                    Err(e) => ToolResult::err(format!("MCP request failed: {e}")),
                }
            }
            _ => nca_tools::dispatch(tool_use).await,
        }
    }

    fn record(&mut self, kind: FileOperationKind, path: &str, new: String, old: String) {
        if let Err(e) = self
            .checkpoints
            .record_file_operation(kind, path, new, old)
        {
            warn!(path, error = %e, "failed to journal file operation");
        }
    }
}

/// One-line description of a tool call for progress display.
fn tool_summary(tool_use: &ToolUse) -> String {
    match tool_use {
        ToolUse::ExecuteCommand { command, .. } => command.clone(),
        ToolUse::ReadFile { path }
        | ToolUse::WriteToFile { path, .. }
        | ToolUse::ReplaceInFile { path, .. }
        | ToolUse::ListFiles { path, .. }
        | ToolUse::ListCodeDefinitionNames { path } => path.clone(),
        ToolUse::SearchFiles { regex, path, .. } => format!("{regex} in {path}"),
        ToolUse::FindFiles { pattern, path } => format!("{pattern} in {path}"),
        ToolUse::GitCommit { message, .. } => message.clone(),
        ToolUse::FetchWebContent { url } => url.clone(),
        ToolUse::UseMcpTool { server_name, tool_name, .. } => {
            format!("{server_name}/{tool_name}")
        }
        ToolUse::AccessMcpResource { server_name, uri } => format!("{server_name} {uri}"),
        ToolUse::AttemptCompletion { .. }
        | ToolUse::AskFollowupQuestion { .. }
        | ToolUse::AskModeResponse { .. } => String::new(),
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
