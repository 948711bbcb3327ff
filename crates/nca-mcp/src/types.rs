// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Lifecycle state of one configured server connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connecting,
    Ready,
    Failed,
    Closed,
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionStatus::Connecting => write!(f, "connecting"),
            ConnectionStatus::Ready => write!(f, "ready"),
            ConnectionStatus::Failed => write!(f, "failed"),
            ConnectionStatus::Closed => write!(f, "closed"),
        }
    }
}

/// A tool advertised by a server's `tools/list`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpToolInfo {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, rename = "inputSchema")]
    pub input_schema: Option<Value>,
    /// Derived from the server's `autoApprove` config, not from the wire.
    #[serde(skip)]
    pub auto_approve: bool,
}

/// A resource advertised by `resources/list`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpResourceInfo {
    pub uri: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, rename = "mimeType")]
    pub mime_type: Option<String>,
}

/// A parameterized resource from `resources/templates/list`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpResourceTemplate {
    #[serde(rename = "uriTemplate")]
    pub uri_template: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, rename = "mimeType")]
    pub mime_type: Option<String>,
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn tool_info_parses_camel_case_schema() {
        let v = json!({
            "name": "search",
            "description": "find things",
            "inputSchema": {"type": "object"},
        });
        let t: McpToolInfo = serde_json::from_value(v).unwrap();
        assert_eq!(t.name, "search");
        assert!(t.input_schema.is_some());
        assert!(!t.auto_approve, "wire data never sets auto_approve");
    }

    #[test]
    fn resource_info_tolerates_missing_optionals() {
        let r: McpResourceInfo = serde_json::from_value(json!({"uri": "db://x"})).unwrap();
        assert_eq!(r.uri, "db://x");
        assert!(r.mime_type.is_none());
    }

    #[test]
    fn template_requires_uri_template() {
        assert!(serde_json::from_value::<McpResourceTemplate>(json!({"name": "x"})).is_err());
    }

    #[test]
    fn status_displays_lowercase() {
        assert_eq!(ConnectionStatus::Ready.to_string(), "ready");
        assert_eq!(ConnectionStatus::Failed.to_string(), "failed");
    }
}
