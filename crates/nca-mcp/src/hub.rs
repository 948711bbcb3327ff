// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Registry of connected MCP servers.
//!
//! The hub owns every connection as a value in a name-keyed map; transports
//! never hold references back up the stack.  It is constructed explicitly
//! (no process-wide singleton) and must be disposed to reap child
//! processes.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use nca_config::{load_mcp_settings, McpServerConfig, McpTransportKind};

use crate::error::{codes, McpError};
use crate::protocol::{Protocol, RequestOptions};
use crate::sse::SseTransport;
use crate::stdio::StdioTransport;
use crate::transport::Transport;
use crate::types::{ConnectionStatus, McpResourceInfo, McpResourceTemplate, McpToolInfo};
use crate::PROTOCOL_VERSION;

/// Deadline for the initialize handshake; discovery calls use the server's
/// configured timeout.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);

struct McpConnection {
    config: McpServerConfig,
    protocol: Option<Arc<Protocol>>,
    status: ConnectionStatus,
    tools: Vec<McpToolInfo>,
    resources: Vec<McpResourceInfo>,
    templates: Vec<McpResourceTemplate>,
    error: Option<String>,
}

/// Display row for `/mcp list`.
#[derive(Debug, Clone)]
pub struct ServerSummary {
    pub name: String,
    pub status: ConnectionStatus,
    pub tools: Vec<String>,
    pub resource_count: usize,
    pub template_count: usize,
    pub error: Option<String>,
}

/// Process-wide MCP server registry with explicit lifecycle.
pub struct McpHub {
    workdir: PathBuf,
    connections: Mutex<HashMap<String, McpConnection>>,
}

impl McpHub {
    /// Read `mcp_settings.json` under `workdir` and connect every enabled
    /// server.  Individual connection failures are recorded per server, not
    /// raised; an unreadable settings file is fatal.
    pub async fn new(workdir: &Path) -> anyhow::Result<Self> {
        let hub = Self {
            workdir: workdir.to_path_buf(),
            connections: Mutex::new(HashMap::new()),
        };
        hub.connect_from_settings().await?;
        Ok(hub)
    }

    async fn connect_from_settings(&self) -> anyhow::Result<()> {
        let settings = load_mcp_settings(&self.workdir)?;
        self.connect_servers(settings).await;
        Ok(())
    }

    async fn connect_servers(&self, settings: nca_config::McpSettings) {
        let mut table = self.connections.lock().await;
        for (name, config) in settings.mcp_servers {
            if config.disabled {
                table.insert(
                    name,
                    McpConnection {
                        config,
                        protocol: None,
                        status: ConnectionStatus::Closed,
                        tools: Vec::new(),
                        resources: Vec::new(),
                        templates: Vec::new(),
                        error: None,
                    },
                );
                continue;
            }
            let conn = connect_server(config).await;
            table.insert(name, conn);
        }
    }

    /// Forward a `tools/call` to the named server, honoring its configured
    /// timeout.  Fails fast when the server is unknown, disabled, or down.
    pub async fn call_tool(
        &self,
        server: &str,
        tool: &str,
        arguments: Value,
    ) -> Result<String, McpError> {
        let (protocol, timeout) = self.ready_protocol(server).await?;
        let result = protocol
            .request(
                "tools/call",
                json!({ "name": tool, "arguments": arguments }),
                RequestOptions::with_timeout(Duration::from_secs(timeout)),
            )
            .await?;
        Ok(render_tool_result(&result))
    }

    /// Forward a `resources/read` to the named server.
    pub async fn read_resource(&self, server: &str, uri: &str) -> Result<String, McpError> {
        let (protocol, timeout) = self.ready_protocol(server).await?;
        let result = protocol
            .request(
                "resources/read",
                json!({ "uri": uri }),
                RequestOptions::with_timeout(Duration::from_secs(timeout)),
            )
            .await?;
        Ok(render_resource_contents(&result))
    }

    /// Dispose every connection and rebuild from the settings file.
    ///
    /// The file is read and validated first, so a broken edit leaves the
    /// existing connections untouched.
    pub async fn reload(&self) -> anyhow::Result<()> {
        let settings = load_mcp_settings(&self.workdir)?;
        self.dispose().await;
        self.connect_servers(settings).await;
        Ok(())
    }

    /// Close every transport and clear the registry.  Safe to call twice.
    pub async fn dispose(&self) {
        let drained: Vec<McpConnection> = {
            let mut table = self.connections.lock().await;
            table.drain().map(|(_, c)| c).collect()
        };
        for conn in drained {
            if let Some(protocol) = conn.protocol {
                if let Err(e) = protocol.close().await {
                    warn!(server = %conn.config.name, error = %e, "close failed");
                }
            }
        }
    }

    /// Current state of every configured server.
    pub async fn server_summaries(&self) -> Vec<ServerSummary> {
        let table = self.connections.lock().await;
        let mut rows: Vec<ServerSummary> = table
            .values()
            .map(|c| ServerSummary {
                name: c.config.name.clone(),
                status: c.status,
                tools: c.tools.iter().map(|t| t.name.clone()).collect(),
                resource_count: c.resources.len(),
                template_count: c.templates.len(),
                error: c.error.clone(),
            })
            .collect();
        rows.sort_by(|a, b| a.name.cmp(&b.name));
        rows
    }

    async fn ready_protocol(&self, server: &str) -> Result<(Arc<Protocol>, u64), McpError> {
        let table = self.connections.lock().await;
        let conn = table
            .get(server)
            .ok_or_else(|| McpError::ServerNotFound(server.to_string()))?;
        if conn.config.disabled {
            return Err(McpError::ServerDisabled(server.to_string()));
        }
        match (&conn.protocol, conn.status) {
            (Some(p), ConnectionStatus::Ready) => Ok((Arc::clone(p), conn.config.timeout)),
            _ => Err(McpError::Transport(format!(
                "server {server:?} is not connected ({})",
                conn.status
            ))),
        }
    }
}

/// Spawn a transport, run the initialize handshake, and populate the
/// discovery caches.  Failures produce a `Failed` connection entry rather
/// than an error.
async fn connect_server(config: McpServerConfig) -> McpConnection {
    let mut conn = McpConnection {
        config,
        protocol: None,
        status: ConnectionStatus::Connecting,
        tools: Vec::new(),
        resources: Vec::new(),
        templates: Vec::new(),
        error: None,
    };

    let transport: Arc<dyn Transport> = match conn.config.transport {
        McpTransportKind::Stdio => Arc::new(StdioTransport::new(
            conn.config.command.clone().unwrap_or_default(),
            conn.config.args.clone(),
            conn.config.env.clone(),
        )),
        McpTransportKind::Sse => Arc::new(SseTransport::new(
            conn.config.url.clone().unwrap_or_default(),
            conn.config.headers.clone(),
        )),
    };
    let protocol = Arc::new(Protocol::new(transport));

    match initialize(&protocol, &conn.config).await {
        Ok(()) => {
            conn.tools = list_tools(&protocol, &conn.config).await;
            conn.resources = list_resources(&protocol, &conn.config).await;
            conn.templates = list_templates(&protocol, &conn.config).await;
            conn.protocol = Some(protocol);
            conn.status = ConnectionStatus::Ready;
            debug!(
                server = %conn.config.name,
                tools = conn.tools.len(),
                resources = conn.resources.len(),
                "MCP server ready"
            );
        }
        Err(e) => {
            warn!(server = %conn.config.name, error = %e, "MCP connection failed");
            let _ = protocol.close().await;
            conn.status = ConnectionStatus::Failed;
            conn.error = Some(e.to_string());
        }
    }
    conn
}

async fn initialize(protocol: &Arc<Protocol>, config: &McpServerConfig) -> Result<(), McpError> {
    protocol.connect().await?;
    let result = protocol
        .request(
            "initialize",
            json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": {},
                "clientInfo": {
                    "name": "nca",
                    "version": env!("CARGO_PKG_VERSION"),
                },
            }),
            RequestOptions::with_timeout(HANDSHAKE_TIMEOUT),
        )
        .await
        .map_err(|e| McpError::Handshake(format!("{} ({})", e, config.name)))?;
    if result.get("protocolVersion").and_then(Value::as_str).is_none() {
        return Err(McpError::Handshake(format!(
            "server {:?} returned no protocolVersion",
            config.name
        )));
    }
    protocol.notify("notifications/initialized", json!({})).await
}

/// A server without the capability answers method-not-found; that is an
/// empty cache, not a failure.
async fn discovery_request(
    protocol: &Arc<Protocol>,
    config: &McpServerConfig,
    method: &str,
) -> Option<Value> {
    match protocol
        .request(
            method,
            json!({}),
            RequestOptions::with_timeout(Duration::from_secs(config.timeout)),
        )
        .await
    {
        Ok(v) => Some(v),
        Err(McpError::Rpc(e)) if e.code == codes::METHOD_NOT_FOUND => None,
        Err(e) => {
            warn!(server = %config.name, method, error = %e, "discovery failed");
            None
        }
    }
}

async fn list_tools(protocol: &Arc<Protocol>, config: &McpServerConfig) -> Vec<McpToolInfo> {
    let Some(result) = discovery_request(protocol, config, "tools/list").await else {
        return Vec::new();
    };
    let mut tools: Vec<McpToolInfo> = result
        .get("tools")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|t| serde_json::from_value(t.clone()).ok())
                .collect()
        })
        .unwrap_or_default();
    for tool in &mut tools {
        tool.auto_approve = config.auto_approve.iter().any(|n| n == &tool.name);
    }
    tools
}

async fn list_resources(
    protocol: &Arc<Protocol>,
    config: &McpServerConfig,
) -> Vec<McpResourceInfo> {
    let Some(result) = discovery_request(protocol, config, "resources/list").await else {
        return Vec::new();
    };
    result
        .get("resources")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|r| serde_json::from_value(r.clone()).ok())
                .collect()
        })
        .unwrap_or_default()
}

async fn list_templates(
    protocol: &Arc<Protocol>,
    config: &McpServerConfig,
) -> Vec<McpResourceTemplate> {
    let Some(result) = discovery_request(protocol, config, "resources/templates/list").await
    else {
        return Vec::new();
    };
    result
        .get("resourceTemplates")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|t| serde_json::from_value(t.clone()).ok())
                .collect()
        })
        .unwrap_or_default()
}

/// Flatten a `tools/call` result into the string the agent feeds back to
/// the model.
fn render_tool_result(result: &Value) -> String {
    let mut parts: Vec<String> = Vec::new();
    if let Some(items) = result.get("content").and_then(Value::as_array) {
        for item in items {
            match item.get("type").and_then(Value::as_str) {
                Some("text") => {
                    if let Some(text) = item.get("text").and_then(Value::as_str) {
                        parts.push(text.to_string());
                    }
                }
                Some(other) => parts.push(format!("[unsupported content type: {other}]")),
                None => {}
            }
        }
    }
    let mut out = if parts.is_empty() {
        result.to_string()
    } else {
        parts.join("\n")
    };
    if result.get("isError").and_then(Value::as_bool).unwrap_or(false) {
        out = format!("[tool reported an error]\n{out}");
    }
    out
}

/// Flatten a `resources/read` result.
fn render_resource_contents(result: &Value) -> String {
    let mut parts: Vec<String> = Vec::new();
    if let Some(items) = result.get("contents").and_then(Value::as_array) {
        for item in items {
            if let Some(text) = item.get("text").and_then(Value::as_str) {
                parts.push(text.to_string());
            } else if let Some(blob) = item.get("blob").and_then(Value::as_str) {
                parts.push(format!("[binary resource, {} base64 bytes]", blob.len()));
            }
        }
    }
    if parts.is_empty() {
        result.to_string()
    } else {
        parts.join("\n")
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
