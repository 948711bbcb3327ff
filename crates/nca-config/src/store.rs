// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::debug;

/// Which store a key was read from or should be written to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigScope {
    Local,
    Global,
}

impl std::fmt::Display for ConfigScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigScope::Local => write!(f, "local"),
            ConfigScope::Global => write!(f, "global"),
        }
    }
}

/// Layered key/value configuration.
///
/// Both layers are flat JSON objects of string→string.  Missing files are
/// treated as empty stores; a malformed file is an error at load time so the
/// user fixes it rather than silently losing settings.
#[derive(Debug)]
pub struct ConfigStore {
    local: BTreeMap<String, String>,
    global: BTreeMap<String, String>,
    local_path: PathBuf,
    global_path: PathBuf,
}

impl ConfigStore {
    /// Load both layers relative to `workdir` (local) and the home directory
    /// (global).
    pub fn load(workdir: &Path) -> anyhow::Result<Self> {
        let local_path = workdir.join(".nca").join("config");
        let global_path = global_config_path();
        Self::load_from(local_path, global_path)
    }

    /// Load from explicit paths.  Used directly by tests.
    pub fn load_from(local_path: PathBuf, global_path: PathBuf) -> anyhow::Result<Self> {
        let local = read_store(&local_path)?;
        let global = read_store(&global_path)?;
        debug!(
            local = %local_path.display(),
            global = %global_path.display(),
            local_keys = local.len(),
            global_keys = global.len(),
            "loaded config stores"
        );
        Ok(Self {
            local,
            global,
            local_path,
            global_path,
        })
    }

    /// Look a key up; local wins over global.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.local
            .get(key)
            .or_else(|| self.global.get(key))
            .map(String::as_str)
    }

    /// Set a key in the chosen scope and persist that store.
    pub fn set(&mut self, scope: ConfigScope, key: &str, value: &str) -> anyhow::Result<()> {
        match scope {
            ConfigScope::Local => {
                self.local.insert(key.to_string(), value.to_string());
                write_store(&self.local_path, &self.local)
            }
            ConfigScope::Global => {
                self.global.insert(key.to_string(), value.to_string());
                write_store(&self.global_path, &self.global)
            }
        }
    }

    /// Remove a key from the chosen scope and persist.  Removing a key that
    /// is absent is not an error.
    pub fn unset(&mut self, scope: ConfigScope, key: &str) -> anyhow::Result<()> {
        match scope {
            ConfigScope::Local => {
                self.local.remove(key);
                write_store(&self.local_path, &self.local)
            }
            ConfigScope::Global => {
                self.global.remove(key);
                write_store(&self.global_path, &self.global)
            }
        }
    }

    /// Merged view sorted by key, with the winning scope for each entry.
    /// The `api_key` value is masked for display.
    pub fn list(&self) -> Vec<(String, String, ConfigScope)> {
        let mut merged: BTreeMap<String, (String, ConfigScope)> = BTreeMap::new();
        for (k, v) in &self.global {
            merged.insert(k.clone(), (v.clone(), ConfigScope::Global));
        }
        for (k, v) in &self.local {
            merged.insert(k.clone(), (v.clone(), ConfigScope::Local));
        }
        merged
            .into_iter()
            .map(|(k, (v, scope))| {
                let display = if k == "api_key" { mask_secret(&v) } else { v };
                (k, display, scope)
            })
            .collect()
    }

    // ── Typed accessors ──────────────────────────────────────────────────────

    pub fn api_key(&self) -> Option<&str> {
        self.get("api_key")
    }

    /// Endpoint resolution: an explicit `api_base_url` wins; otherwise a
    /// known `provider` name selects its OpenAI-compatible endpoint.
    pub fn api_base_url(&self) -> &str {
        if let Some(url) = self.get("api_base_url") {
            return url;
        }
        match self.provider() {
            Some("qwen") => crate::QWEN_API_BASE_URL,
            Some("doubao") => crate::DOUBAO_API_BASE_URL,
            _ => crate::DEFAULT_API_BASE_URL,
        }
    }

    pub fn model(&self) -> &str {
        self.get("model").unwrap_or(crate::DEFAULT_MODEL)
    }

    pub fn provider(&self) -> Option<&str> {
        self.get("provider")
    }

    /// Sampling temperature.  Unparseable values fall back to the default
    /// rather than failing the turn.
    pub fn temperature(&self) -> f32 {
        self.get("temperature")
            .and_then(|v| v.parse::<f32>().ok())
            .unwrap_or(0.0)
    }

    /// When set (to anything but "false"), the streaming call has no overall
    /// deadline.
    pub fn disable_stream_timeout(&self) -> bool {
        matches!(self.get("disable_stream_timeout"), Some(v) if v != "false")
    }
}

fn global_config_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".nca_config")
}

fn read_store(path: &Path) -> anyhow::Result<BTreeMap<String, String>> {
    if !path.is_file() {
        return Ok(BTreeMap::new());
    }
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    if text.trim().is_empty() {
        return Ok(BTreeMap::new());
    }
    serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

fn write_store(path: &Path, store: &BTreeMap<String, String>) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    let text = serde_json::to_string_pretty(store)?;
    std::fs::write(path, text).with_context(|| format!("writing {}", path.display()))
}

/// Keep the first and last two characters of a secret, mask the rest.
fn mask_secret(s: &str) -> String {
    if s.len() <= 6 {
        return "*".repeat(s.len());
    }
    format!("{}{}{}", &s[..2], "*".repeat(s.len() - 4), &s[s.len() - 2..])
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
