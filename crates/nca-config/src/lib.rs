// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Configuration stores for the nca agent.
//!
//! Two flat JSON documents of string→string pairs are merged at lookup time:
//! the workspace-local `.nca/config` and the global `~/.nca_config`.  Local
//! keys override global keys.  A third file, `mcp_settings.json`, configures
//! the MCP tool servers and has its own typed schema.

mod mcp;
mod store;

pub use mcp::{load_mcp_settings, McpServerConfig, McpSettings, McpTransportKind};
pub use store::{ConfigScope, ConfigStore};

/// Default chat completions endpoint used when neither `api_base_url` nor a
/// known `provider` is set.
pub const DEFAULT_API_BASE_URL: &str = "https://api.deepseek.com";

/// OpenAI-compatible endpoint for `provider = "qwen"`.
pub const QWEN_API_BASE_URL: &str = "https://dashscope.aliyuncs.com/compatible-mode/v1";

/// OpenAI-compatible endpoint for `provider = "doubao"`.
pub const DOUBAO_API_BASE_URL: &str = "https://ark.cn-beijing.volces.com/api/v3";

/// Default model used when `model` is not set.
pub const DEFAULT_MODEL: &str = "deepseek-chat";
