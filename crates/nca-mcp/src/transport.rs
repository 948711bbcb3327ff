// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use async_trait::async_trait;
use serde_json::Value;

use crate::error::McpError;

/// Callbacks a transport drives as the connection lives.
///
/// `on_message` receives every decoded JSON-RPC envelope in arrival order;
/// `on_error` reports non-fatal conditions (undecodable lines, noisy
/// stderr); `on_close` fires exactly once when the connection ends, however
/// it ends.
pub struct TransportHandlers {
    pub on_message: Box<dyn Fn(Value) + Send + Sync>,
    pub on_error: Box<dyn Fn(McpError) + Send + Sync>,
    pub on_close: Box<dyn Fn() + Send + Sync>,
}

/// A bidirectional JSON-RPC conduit.
///
/// Both concrete transports (stdio child process, SSE endpoint) expose the
/// same surface: install handlers and start the read side, send one
/// envelope, close and release every resource.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn start(&self, handlers: TransportHandlers) -> Result<(), McpError>;
    async fn send(&self, message: Value) -> Result<(), McpError>;
    async fn close(&self) -> Result<(), McpError>;
}

/// Accumulates raw bytes and yields one newline-delimited JSON-RPC message
/// at a time.
///
/// Reads from a pipe arrive in arbitrary chunk sizes; a message is complete
/// only once its `\n` terminator has been seen.  Blank lines are skipped.
#[derive(Debug, Default)]
pub struct ReadBuffer {
    buf: Vec<u8>,
}

impl ReadBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Pop the next complete message, `Ok(None)` when no full line is
    /// buffered yet, `Err` when a complete line is not valid JSON.
    pub fn read_message(&mut self) -> Result<Option<Value>, McpError> {
        loop {
            let Some(pos) = self.buf.iter().position(|&b| b == b'\n') else {
                return Ok(None);
            };
            let line: Vec<u8> = self.buf.drain(..=pos).collect();
            let text = String::from_utf8_lossy(&line[..line.len() - 1]);
            let text = text.trim_end_matches('\r').trim();
            if text.is_empty() {
                continue;
            }
            return serde_json::from_str::<Value>(text)
                .map(Some)
                .map_err(McpError::Serialization);
        }
    }

    pub fn clear(&mut self) {
        self.buf.clear();
    }
}

/// Serialize an envelope into its newline-delimited wire form.
pub fn serialize_message(message: &Value) -> Result<Vec<u8>, McpError> {
    let mut bytes = serde_json::to_vec(message)?;
    bytes.push(b'\n');
    Ok(bytes)
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_buffer_yields_nothing() {
        let mut rb = ReadBuffer::new();
        assert!(rb.read_message().unwrap().is_none());
    }

    #[test]
    fn partial_line_waits_for_newline() {
        let mut rb = ReadBuffer::new();
        rb.append(b"{\"jsonrpc\":\"2.0\",");
        assert!(rb.read_message().unwrap().is_none());
        rb.append(b"\"id\":1}\n");
        let msg = rb.read_message().unwrap().unwrap();
        assert_eq!(msg["id"], 1);
    }

    #[test]
    fn two_messages_in_one_chunk() {
        let mut rb = ReadBuffer::new();
        rb.append(b"{\"id\":1}\n{\"id\":2}\n");
        assert_eq!(rb.read_message().unwrap().unwrap()["id"], 1);
        assert_eq!(rb.read_message().unwrap().unwrap()["id"], 2);
        assert!(rb.read_message().unwrap().is_none());
    }

    #[test]
    fn blank_lines_are_skipped() {
        let mut rb = ReadBuffer::new();
        rb.append(b"\n\r\n{\"id\":7}\n");
        assert_eq!(rb.read_message().unwrap().unwrap()["id"], 7);
    }

    #[test]
    fn invalid_json_line_is_an_error() {
        let mut rb = ReadBuffer::new();
        rb.append(b"{nope}\n{\"id\":3}\n");
        assert!(rb.read_message().is_err());
        // The bad line is consumed; the next one still decodes.
        assert_eq!(rb.read_message().unwrap().unwrap()["id"], 3);
    }

    #[test]
    fn crlf_terminated_lines_decode() {
        let mut rb = ReadBuffer::new();
        rb.append(b"{\"id\":9}\r\n");
        assert_eq!(rb.read_message().unwrap().unwrap()["id"], 9);
    }

    #[test]
    fn serialize_appends_newline() {
        let bytes = serialize_message(&json!({"id": 1})).unwrap();
        assert_eq!(bytes.last(), Some(&b'\n'));
        // Round trip through the read buffer.
        let mut rb = ReadBuffer::new();
        rb.append(&bytes);
        assert_eq!(rb.read_message().unwrap().unwrap()["id"], 1);
    }
}
