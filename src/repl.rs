// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! The interactive loop: read a line, run the agent, render its events.
//!
//! Rendering happens in a separate task fed by the agent's event channel:
//! content chunks pass through the display filter, the first one stops the
//! spinner.  SIGINT is routed to the agent's cancel slot while a request is
//! in flight; between requests it just interrupts the pending input line.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use nca_config::{ConfigScope, ConfigStore};
use nca_core::{Agent, AgentEvent, TagFilter, TaskOutcome};
use nca_mcp::McpHub;

/// Ctrl-A arrives as this byte at the start of an input line and toggles
/// between Agent and Ask mode.
const MODE_TOGGLE: char = '\u{1}';

enum SlashResult {
    Continue,
    Exit,
}

pub struct Repl {
    agent: Agent,
    config: ConfigStore,
    hub: Option<Arc<McpHub>>,
    show_thinking: bool,
    use_color: bool,
}

impl Repl {
    pub fn new(
        agent: Agent,
        config: ConfigStore,
        hub: Option<Arc<McpHub>>,
        show_thinking: bool,
        use_color: bool,
    ) -> Self {
        Self { agent, config, hub, show_thinking, use_color }
    }

    pub async fn run(&mut self, initial: Option<String>, one_shot: bool) -> anyhow::Result<()> {
        // SIGINT fires the current cancel handle when a request is in
        // flight; otherwise the pending read continues and the user gets a
        // fresh prompt.
        let cancel_slot = self.agent.cancel_slot();
        tokio::spawn(async move {
            loop {
                if tokio::signal::ctrl_c().await.is_err() {
                    break;
                }
                let armed = cancel_slot.lock().expect("cancel slot poisoned").take();
                match armed {
                    Some(tx) => {
                        let _ = tx.send(());
                    }
                    None => eprintln!(),
                }
            }
        });

        if let Some(prompt) = initial {
            self.run_prompt(&prompt).await;
            if one_shot {
                self.shutdown().await;
                return Ok(());
            }
        } else if one_shot {
            self.shutdown().await;
            anyhow::bail!("no prompt given for one-shot mode");
        }

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            print!("> ");
            let _ = std::io::stdout().flush();
            let Some(line) = lines.next_line().await? else {
                break; // EOF
            };
            let line = line.trim().to_string();
            if line.is_empty() {
                continue;
            }
            if line.starts_with(MODE_TOGGLE) {
                self.agent.mode = self.agent.mode.toggled();
                println!("Mode: {}", self.agent.mode);
                continue;
            }
            if let Some(rest) = line.strip_prefix('/') {
                match self.handle_slash(rest).await {
                    Ok(SlashResult::Exit) => break,
                    Ok(SlashResult::Continue) => continue,
                    Err(e) => {
                        eprintln!("{e:#}");
                        continue;
                    }
                }
            }
            self.run_prompt(&line).await;
        }

        self.shutdown().await;
        Ok(())
    }

    async fn shutdown(&self) {
        if let Some(hub) = &self.hub {
            hub.dispose().await;
        }
    }

    /// Run one prompt, rendering agent events as they arrive.
    async fn run_prompt(&mut self, prompt: &str) {
        let (tx, rx) = mpsc::channel::<AgentEvent>(256);
        let printer = tokio::spawn(render_events(rx, self.show_thinking, self.use_color));

        let outcome = self.agent.run_task(prompt, tx).await;
        let _ = printer.await;

        match outcome {
            Ok(TaskOutcome::Completed) => {}
            Ok(TaskOutcome::Aborted) => eprintln!("\nRequest cancelled."),
            Ok(TaskOutcome::Failed(_)) => {} // already rendered via Error event
            Ok(TaskOutcome::BudgetExhausted) => {}
            Err(e) => eprintln!("Error: {e:#}"),
        }
        println!();
    }

    async fn handle_slash(&mut self, command: &str) -> anyhow::Result<SlashResult> {
        let mut parts = command.split_whitespace();
        match parts.next().unwrap_or_default() {
            "exit" => return Ok(SlashResult::Exit),
            "clear" => {
                self.agent.conversation_mut().clear();
                println!("Conversation cleared.");
            }
            "help" => print_help(),
            "config" => self.handle_config(&mut parts)?,
            "checkpoint" => self.handle_checkpoint(&mut parts)?,
            "mcp" => self.handle_mcp(&mut parts).await?,
            other => println!("Unknown command /{other}; try /help"),
        }
        Ok(SlashResult::Continue)
    }

    fn handle_config<'a>(
        &mut self,
        parts: &mut impl Iterator<Item = &'a str>,
    ) -> anyhow::Result<()> {
        let mut args: Vec<&str> = parts.collect();
        let global = args.iter().any(|a| *a == "--global");
        args.retain(|a| *a != "--global");
        let scope = if global { ConfigScope::Global } else { ConfigScope::Local };

        match args.as_slice() {
            ["set", key, value] => {
                self.config.set(scope, key, value)?;
                println!("{scope} {key} = {value}");
            }
            ["unset", key] => {
                self.config.unset(scope, key)?;
                println!("{scope} {key} removed");
            }
            ["list"] | [] => {
                for (key, value, scope) in self.config.list() {
                    println!("{key} = {value}  ({scope})");
                }
            }
            _ => println!("Usage: /config {{set|unset|list}} [--global] key [value]"),
        }
        Ok(())
    }

    fn handle_checkpoint<'a>(
        &mut self,
        parts: &mut impl Iterator<Item = &'a str>,
    ) -> anyhow::Result<()> {
        match (parts.next(), parts.next()) {
            (Some("list"), _) | (None, _) => {
                let checkpoints = self.agent.checkpoints().list();
                if checkpoints.is_empty() {
                    println!("No checkpoints yet.");
                }
                for c in checkpoints {
                    println!(
                        "{}  {:>2} op(s)  {}",
                        c.id,
                        c.operations.len(),
                        first_line(&c.user_prompt)
                    );
                }
            }
            (Some("restore"), Some(id)) => println!("{}", self.agent.checkpoints().restore(id)?),
            (Some("redo"), Some(id)) => println!("{}", self.agent.checkpoints().redo(id)?),
            _ => println!("Usage: /checkpoint {{list|restore <id>|redo <id>}}"),
        }
        Ok(())
    }

    async fn handle_mcp<'a>(
        &mut self,
        parts: &mut impl Iterator<Item = &'a str>,
    ) -> anyhow::Result<()> {
        let Some(hub) = &self.hub else {
            println!("No MCP servers configured (mcp_settings.json is missing or empty).");
            return Ok(());
        };
        match parts.next() {
            Some("reload") => {
                hub.reload().await?;
                println!("MCP servers reloaded.");
            }
            Some("list") | None => {
                let rows = hub.server_summaries().await;
                if rows.is_empty() {
                    println!("No MCP servers configured.");
                }
                for row in rows {
                    let tools = if row.tools.is_empty() {
                        "-".to_string()
                    } else {
                        row.tools.join(", ")
                    };
                    print!("{:20} {:10} tools: {tools}", row.name, row.status.to_string());
                    if let Some(err) = row.error {
                        print!("  ({err})");
                    }
                    println!();
                }
            }
            _ => println!("Usage: /mcp {{list|reload}}"),
        }
        Ok(())
    }
}

/// Drain agent events: filter content, manage the spinner, surface errors.
async fn render_events(
    mut rx: mpsc::Receiver<AgentEvent>,
    show_thinking: bool,
    use_color: bool,
) {
    let mut filter = TagFilter::new(show_thinking, use_color);
    let (stop_tx, stop_rx) = oneshot::channel();
    let mut spinner_stop = Some(stop_tx);
    let spinner = if use_color {
        Some(tokio::spawn(spin(stop_rx)))
    } else {
        drop(stop_rx);
        None
    };

    while let Some(event) = rx.recv().await {
        match event {
            AgentEvent::ContentChunk(chunk) => {
                if let Some(stop) = spinner_stop.take() {
                    let _ = stop.send(());
                }
                print!("{}", filter.feed(&chunk));
                let _ = std::io::stdout().flush();
            }
            AgentEvent::ReasoningChunk(chunk) => {
                if show_thinking {
                    if let Some(stop) = spinner_stop.take() {
                        let _ = stop.send(());
                    }
                    eprint!("{chunk}");
                }
            }
            AgentEvent::StreamEnded => {
                let tail = filter.flush();
                if !tail.is_empty() {
                    print!("{tail}");
                }
                println!();
                let _ = std::io::stdout().flush();
                filter = TagFilter::new(show_thinking, use_color);
            }
            AgentEvent::ToolStarted { name, summary } => {
                debug!(tool = %name, %summary, "tool started");
            }
            AgentEvent::ToolFinished { name, is_error } => {
                if is_error {
                    eprintln!("[{name} failed]");
                }
            }
            AgentEvent::Truncated { lo, hi, .. } => {
                eprintln!("[conversation truncated: messages {lo}-{hi} dropped]");
            }
            AgentEvent::CheckpointCreated(id) => {
                debug!(checkpoint = %id, "checkpoint created");
            }
            AgentEvent::Error(msg) => eprintln!("{msg}"),
        }
    }
    if let Some(stop) = spinner_stop.take() {
        let _ = stop.send(());
    }
    if let Some(task) = spinner {
        let _ = task.await;
    }
}

/// Terminal activity indicator until the first content chunk lands.
async fn spin(mut stop: oneshot::Receiver<()>) {
    const FRAMES: [&str; 8] = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠇"];
    let mut i = 0usize;
    loop {
        tokio::select! {
            _ = &mut stop => break,
            _ = tokio::time::sleep(Duration::from_millis(120)) => {
                eprint!("\r{} waiting for model...", FRAMES[i % FRAMES.len()]);
                i += 1;
            }
        }
    }
    eprint!("\r                        \r");
}

fn first_line(s: &str) -> &str {
    s.lines().next().unwrap_or_default()
}

fn print_help() {
    println!(
        "Commands:\n\
         /clear                        reset the conversation\n\
         /help                         show this help\n\
         /exit                         quit\n\
         /config set [--global] k v    set a configuration key\n\
         /config unset [--global] k    remove a configuration key\n\
         /config list                  show the merged configuration\n\
         /checkpoint list              list file-change checkpoints\n\
         /checkpoint restore <id>      undo changes back to a checkpoint\n\
         /checkpoint redo <id>         re-apply changes from a checkpoint\n\
         /mcp list                     show MCP server status\n\
         /mcp reload                   reconnect MCP servers from settings\n\
         Ctrl-A (then Enter)           toggle Agent/Ask mode"
    );
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
