// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::io;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Standard JSON-RPC 2.0 error codes plus the MCP request-timeout extension.
pub mod codes {
    pub const PARSE_ERROR: i64 = -32700;
    pub const INVALID_REQUEST: i64 = -32600;
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const INTERNAL_ERROR: i64 = -32603;
    pub const REQUEST_TIMEOUT: i64 = -32000;
}

/// A typed JSON-RPC error object, as carried in a response envelope.
#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq)]
#[error("JSON-RPC error {code}: {message}")]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self { code, message: message.into(), data: None }
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(codes::METHOD_NOT_FOUND, format!("method not found: {method}"))
    }

    pub fn timeout(elapsed: Duration) -> Self {
        Self::new(
            codes::REQUEST_TIMEOUT,
            format!("request timed out after {:.0?}", elapsed),
        )
    }
}

/// Errors surfaced while managing MCP transports and requests.
#[derive(Debug, Error)]
pub enum McpError {
    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },
    #[error("server did not complete the initialize handshake: {0}")]
    Handshake(String),
    #[error("transport failed: {0}")]
    Transport(String),
    #[error(transparent)]
    Rpc(#[from] JsonRpcError),
    #[error("request was cancelled")]
    Cancelled,
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("transport channel closed unexpectedly")]
    ChannelClosed,
    #[error("no MCP server named {0:?}")]
    ServerNotFound(String),
    #[error("MCP server {0:?} is disabled")]
    ServerDisabled(String),
}

impl McpError {
    /// True for the timeout shape the protocol layer produces.
    pub fn is_timeout(&self) -> bool {
        matches!(self, McpError::Rpc(e) if e.code == codes::REQUEST_TIMEOUT)
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_rpc_error_round_trips() {
        let e = JsonRpcError::new(codes::INVALID_PARAMS, "bad params");
        let back: JsonRpcError =
            serde_json::from_str(&serde_json::to_string(&e).unwrap()).unwrap();
        assert_eq!(back, e);
    }

    #[test]
    fn data_field_is_omitted_when_none() {
        let e = JsonRpcError::new(codes::INTERNAL_ERROR, "boom");
        let json = serde_json::to_string(&e).unwrap();
        assert!(!json.contains("data"), "{json}");
    }

    #[test]
    fn timeout_shape_is_detectable() {
        let e = McpError::Rpc(JsonRpcError::timeout(Duration::from_secs(60)));
        assert!(e.is_timeout());
        assert!(!McpError::Cancelled.is_timeout());
    }

    #[test]
    fn method_not_found_uses_standard_code() {
        assert_eq!(JsonRpcError::method_not_found("x").code, -32601);
    }
}
