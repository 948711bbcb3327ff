// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use clap::{Parser, Subcommand};

/// nca — a terminal-hosted AI coding agent.
#[derive(Parser, Debug)]
#[command(name = "nca", disable_version_flag = true, disable_help_subcommand = true)]
pub struct Cli {
    /// Print one task's result and exit instead of starting the REPL.
    #[arg(short = 'p', long = "print")]
    pub print: bool,

    /// Print version/build information and exit.
    #[arg(short = 'v', long = "version")]
    pub version: bool,

    /// Write a per-session debug log under ~/.nca/debug/.
    #[arg(long = "debug")]
    pub debug: bool,

    /// Show the model's thinking blocks instead of hiding them.
    #[arg(long = "show-thinking")]
    pub show_thinking: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Initial prompt; the remaining arguments are joined with spaces.
    #[arg(trailing_var_arg = true)]
    pub prompt: Vec<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show usage help and exit.
    Help,
    /// Read or edit the configuration stores.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Summarize the current git changes and commit them.
    Commit,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Set a key in the local store (or the global store with --global).
    Set {
        #[arg(long)]
        global: bool,
        key: String,
        value: String,
    },
    /// Remove a key.
    Unset {
        #[arg(long)]
        global: bool,
        key: String,
    },
    /// List the merged configuration, local over global.
    List,
}

impl Cli {
    pub fn initial_prompt(&self) -> Option<String> {
        if self.prompt.is_empty() {
            None
        } else {
            Some(self.prompt.join(" "))
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
