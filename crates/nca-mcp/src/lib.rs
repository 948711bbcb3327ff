// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! `nca-mcp` — MCP (Model Control Protocol) client stack.
//!
//! Federates external tool servers over **stdio** (line-delimited JSON-RPC
//! to a child process) or **SSE** (an event-stream GET paired with a POST
//! endpoint the server advertises).  Three layers:
//!
//! ```text
//! McpHub            connect / reload / dispose; tool & resource discovery
//!   │
//! Protocol          JSON-RPC 2.0 framing, id correlation, timeouts,
//!   │               progress resets, cancellation notifications
//! Transport         stdio child process  |  SSE endpoint
//! ```
//!
//! Connections are plain values keyed by server name inside the hub; the
//! transport never holds a reference back up the stack.

mod error;
mod hub;
mod protocol;
mod sse;
mod stdio;
mod transport;
mod types;

pub use error::{codes, JsonRpcError, McpError};
pub use hub::{McpHub, ServerSummary};
pub use protocol::{Protocol, RequestOptions};
pub use sse::SseTransport;
pub use stdio::StdioTransport;
pub use transport::{ReadBuffer, Transport, TransportHandlers};
pub use types::{ConnectionStatus, McpResourceInfo, McpResourceTemplate, McpToolInfo};

/// MCP protocol revision implemented by this client.
pub const PROTOCOL_VERSION: &str = "2024-11-05";
