// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
mod cli;
mod repl;

use std::io::{IsTerminal, Read};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{CommandFactory, Parser};
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use cli::{Cli, Commands, ConfigAction};
use nca_config::{ConfigScope, ConfigStore};
use nca_core::{Agent, AgentMode, CheckpointManager};
use nca_mcp::McpHub;
use nca_model::{lookup_model, Provider, ProviderConfig};
use repl::Repl;

/// Fixed prompt behind the `nca commit` subcommand.
const COMMIT_PROMPT: &str = "\
Review the current git changes: run `git status` and `git diff` (staged and \
unstaged) with execute_command, summarize what changed, then create a single \
commit with the git_commit tool using a concise message that captures the \
intent of the changes. Do not push.";

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("nca: {e:#}");
            ExitCode::from(1)
        }
    }
}

async fn run() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    if cli.version {
        println!(
            "nca {} (commit {}, built {})",
            env!("CARGO_PKG_VERSION"),
            option_env!("NCA_BUILD_COMMIT").unwrap_or("unknown"),
            option_env!("NCA_BUILD_DATE").unwrap_or("unknown"),
        );
        return Ok(ExitCode::SUCCESS);
    }

    init_logging(cli.debug)?;

    if let Some(Commands::Help) = cli.command {
        Cli::command().print_long_help()?;
        return Ok(ExitCode::SUCCESS);
    }

    let workdir = std::env::current_dir().context("resolving working directory")?;
    let mut config = ConfigStore::load(&workdir)?;

    if let Some(Commands::Config { action }) = &cli.command {
        run_config_action(&mut config, action)?;
        return Ok(ExitCode::SUCCESS);
    }

    // Piped input becomes part of the prompt and forces one-shot mode.
    let mut prompt = cli.initial_prompt();
    let mut one_shot = cli.print;
    if !std::io::stdin().is_terminal() {
        let mut piped = String::new();
        std::io::stdin()
            .read_to_string(&mut piped)
            .context("reading piped stdin")?;
        let piped = piped.trim().to_string();
        if !piped.is_empty() {
            prompt = Some(match prompt {
                Some(p) => format!("{p}\n\n{piped}"),
                None => piped,
            });
        }
        one_shot = true;
    }
    if matches!(cli.command, Some(Commands::Commit)) {
        prompt = Some(COMMIT_PROMPT.to_string());
        one_shot = true;
    }

    let provider = Provider::new(ProviderConfig {
        base_url: config.api_base_url().to_string(),
        api_key: config.api_key().map(str::to_string),
        model: config.model().to_string(),
        temperature: config.temperature(),
        disable_stream_timeout: config.disable_stream_timeout(),
    });
    let model_info = lookup_model(config.model());
    let checkpoints = CheckpointManager::load(&workdir)?;

    // An unusable MCP configuration disables the hub but not the agent.
    let hub = match McpHub::new(&workdir).await {
        Ok(hub) => Some(Arc::new(hub)),
        Err(e) => {
            eprintln!("MCP disabled: {e:#}");
            None
        }
    };

    let use_color = std::io::stdout().is_terminal();
    let agent = Agent::new(
        Arc::new(provider),
        model_info,
        checkpoints,
        hub.clone(),
        AgentMode::Agent,
        workdir,
    );

    let mut repl = Repl::new(agent, config, hub, cli.show_thinking, use_color);
    repl.run(prompt, one_shot).await?;
    Ok(ExitCode::SUCCESS)
}

fn run_config_action(config: &mut ConfigStore, action: &ConfigAction) -> anyhow::Result<()> {
    match action {
        ConfigAction::Set { global, key, value } => {
            let scope = scope_for(*global);
            config.set(scope, key, value)?;
            println!("{scope} {key} = {value}");
        }
        ConfigAction::Unset { global, key } => {
            let scope = scope_for(*global);
            config.unset(scope, key)?;
            println!("{scope} {key} removed");
        }
        ConfigAction::List => {
            for (key, value, scope) in config.list() {
                println!("{key} = {value}  ({scope})");
            }
        }
    }
    Ok(())
}

fn scope_for(global: bool) -> ConfigScope {
    if global {
        ConfigScope::Global
    } else {
        ConfigScope::Local
    }
}

/// Default logging goes to stderr at warn level; `--debug` adds a
/// per-session file under `~/.nca/debug/<date>/`.
fn init_logging(debug: bool) -> anyhow::Result<()> {
    if debug {
        let now = chrono::Local::now();
        let dir = dirs::home_dir()
            .unwrap_or_else(|| std::path::PathBuf::from("."))
            .join(".nca")
            .join("debug")
            .join(now.format("%Y-%m-%d").to_string());
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("creating {}", dir.display()))?;
        let path = dir.join(format!("session_{}.log", now.format("%H%M%S-%3f")));
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("opening {}", path.display()))?;
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_ansi(false)
                    .with_writer(std::sync::Mutex::new(file)),
            )
            .with(filter)
            .try_init()
            .ok();
        eprintln!("debug log: {}", path.display());
    } else {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
        tracing_subscriber::registry()
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .with(filter)
            .try_init()
            .ok();
    }
    Ok(())
}
