// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;
use std::path::Path;

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};

/// Minimum permitted per-server request timeout.
pub const MIN_MCP_TIMEOUT_SECS: u64 = 10;

/// Default per-server request timeout when the settings file omits it.
pub const DEFAULT_MCP_TIMEOUT_SECS: u64 = 60;

/// How a configured MCP server is reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum McpTransportKind {
    #[default]
    Stdio,
    Sse,
}

/// One server entry from `mcp_settings.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct McpServerConfig {
    /// Filled in from the map key after load.
    #[serde(skip)]
    pub name: String,
    #[serde(default)]
    pub transport: McpTransportKind,
    /// Executable for stdio servers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    /// Event-stream URL for SSE servers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    /// Extra HTTP headers for SSE servers.
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    /// Tool names that may be called without interactive approval.
    #[serde(default)]
    pub auto_approve: Vec<String>,
    #[serde(default)]
    pub disabled: bool,
}

fn default_timeout() -> u64 {
    DEFAULT_MCP_TIMEOUT_SECS
}

impl McpServerConfig {
    /// Validate the invariants the hub depends on.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.timeout < MIN_MCP_TIMEOUT_SECS {
            bail!(
                "server {:?}: timeout {}s is below the minimum of {}s",
                self.name,
                self.timeout,
                MIN_MCP_TIMEOUT_SECS
            );
        }
        match self.transport {
            McpTransportKind::Stdio => {
                if self.command.as_deref().unwrap_or("").is_empty() {
                    bail!("server {:?}: stdio transport requires a command", self.name);
                }
            }
            McpTransportKind::Sse => {
                if self.url.as_deref().unwrap_or("").is_empty() {
                    bail!("server {:?}: sse transport requires a url", self.name);
                }
            }
        }
        Ok(())
    }
}

/// The parsed `mcp_settings.json` document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct McpSettings {
    #[serde(default)]
    pub mcp_servers: HashMap<String, McpServerConfig>,
}

impl McpSettings {
    /// Enabled servers in name order, each validated.
    pub fn enabled_servers(&self) -> anyhow::Result<Vec<McpServerConfig>> {
        let mut servers: Vec<McpServerConfig> = self
            .mcp_servers
            .values()
            .filter(|s| !s.disabled)
            .cloned()
            .collect();
        servers.sort_by(|a, b| a.name.cmp(&b.name));
        for s in &servers {
            s.validate()?;
        }
        Ok(servers)
    }
}

/// Load and validate `mcp_settings.json` from `workdir`.
///
/// A missing file is an empty configuration, not an error; the hub simply
/// has no servers to connect.
pub fn load_mcp_settings(workdir: &Path) -> anyhow::Result<McpSettings> {
    let path = workdir.join("mcp_settings.json");
    if !path.is_file() {
        return Ok(McpSettings::default());
    }
    let text = std::fs::read_to_string(&path)
        .with_context(|| format!("reading {}", path.display()))?;
    let mut settings: McpSettings = serde_json::from_str(&text)
        .with_context(|| format!("parsing {}", path.display()))?;
    for (name, server) in settings.mcp_servers.iter_mut() {
        server.name = name.clone();
        server.validate()?;
    }
    Ok(settings)
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
