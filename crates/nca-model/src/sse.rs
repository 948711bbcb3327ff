// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! SSE frame decoding for the chat completions stream.
//!
//! SSE events can be split across TCP packets, so the reader maintains a
//! line buffer across chunks and only complete `\n`-terminated lines are
//! decoded.  Malformed frames (keepalives, comments, partial writes) are
//! skipped silently; they are an expected artifact of the wire format.

use serde_json::Value;

use crate::types::Usage;

/// One decoded `data:` frame.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum SseFrame {
    /// The `data: [DONE]` terminator.
    Done,
    /// A delta-bearing chunk.  Any of the fields may be absent.
    Chunk {
        reasoning: Option<String>,
        content: Option<String>,
        usage: Option<Usage>,
        finish_reason: Option<String>,
    },
}

/// Drain all complete `\n`-terminated lines from `buf`, decoding each.
///
/// A trailing incomplete line stays in `buf` so the next TCP chunk can
/// extend it.
pub(crate) fn drain_frames(buf: &mut String) -> Vec<SseFrame> {
    let mut frames = Vec::new();
    while let Some(nl_pos) = buf.find('\n') {
        let line = buf[..nl_pos].trim_end_matches('\r').to_string();
        *buf = buf[nl_pos + 1..].to_string();
        if let Some(frame) = parse_data_line(&line) {
            frames.push(frame);
        }
    }
    frames
}

/// Decode a single complete SSE line.
///
/// Returns `None` for empty lines, comments, non-`data:` fields, and frames
/// that do not parse as JSON.
fn parse_data_line(line: &str) -> Option<SseFrame> {
    let data = line.strip_prefix("data: ").or_else(|| line.strip_prefix("data:"))?;
    let data = data.trim();
    if data.is_empty() {
        return None;
    }
    if data == "[DONE]" {
        return Some(SseFrame::Done);
    }
    let v: Value = serde_json::from_str(data).ok()?;
    Some(parse_chunk(&v))
}

fn parse_chunk(v: &Value) -> SseFrame {
    // A frame whose choices array is empty but which carries a usage object
    // supplies the final token count (stream_options.include_usage).
    let choices_empty = v["choices"].as_array().map(|a| a.is_empty()).unwrap_or(true);
    let usage = v
        .get("usage")
        .filter(|u| !u.is_null())
        .and_then(|u| serde_json::from_value::<Usage>(u.clone()).ok());
    if choices_empty {
        return SseFrame::Chunk {
            reasoning: None,
            content: None,
            usage,
            finish_reason: None,
        };
    }

    let choice = &v["choices"][0];
    let delta = &choice["delta"];
    SseFrame::Chunk {
        reasoning: delta["reasoning_content"].as_str().map(str::to_string),
        content: delta["content"].as_str().map(str::to_string),
        usage,
        finish_reason: choice["finish_reason"].as_str().map(str::to_string),
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn done_sentinel_is_decoded() {
        let mut buf = "data: [DONE]\n".to_string();
        assert_eq!(drain_frames(&mut buf), vec![SseFrame::Done]);
        assert!(buf.is_empty());
    }

    #[test]
    fn content_delta_is_extracted() {
        let mut buf =
            "data: {\"choices\":[{\"delta\":{\"content\":\"hello\"}}]}\n".to_string();
        match &drain_frames(&mut buf)[0] {
            SseFrame::Chunk { content, .. } => assert_eq!(content.as_deref(), Some("hello")),
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[test]
    fn reasoning_delta_is_extracted() {
        let mut buf =
            "data: {\"choices\":[{\"delta\":{\"reasoning_content\":\"hmm\"}}]}\n".to_string();
        match &drain_frames(&mut buf)[0] {
            SseFrame::Chunk { reasoning, content, .. } => {
                assert_eq!(reasoning.as_deref(), Some("hmm"));
                assert!(content.is_none());
            }
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[test]
    fn usage_only_frame_with_empty_choices() {
        let mut buf = "data: {\"choices\":[],\"usage\":{\"prompt_tokens\":10,\
                       \"completion_tokens\":5,\"total_tokens\":15}}\n"
            .to_string();
        match &drain_frames(&mut buf)[0] {
            SseFrame::Chunk { usage: Some(u), .. } => assert_eq!(u.total_tokens, 15),
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[test]
    fn finish_reason_is_extracted() {
        let mut buf =
            "data: {\"choices\":[{\"delta\":{},\"finish_reason\":\"length\"}]}\n".to_string();
        match &drain_frames(&mut buf)[0] {
            SseFrame::Chunk { finish_reason, .. } => {
                assert_eq!(finish_reason.as_deref(), Some("length"))
            }
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[test]
    fn partial_line_is_kept_in_buffer() {
        let mut buf = "data: {\"choices\":[{\"delta\":{\"content\":\"a\"}}]}\ndata: {\"cho"
            .to_string();
        let frames = drain_frames(&mut buf);
        assert_eq!(frames.len(), 1);
        assert_eq!(buf, "data: {\"cho");
        // Completing the line on the next chunk yields the second frame.
        buf.push_str("ices\":[{\"delta\":{\"content\":\"b\"}}]}\n");
        let frames = drain_frames(&mut buf);
        assert_eq!(frames.len(), 1);
        assert!(buf.is_empty());
    }

    #[test]
    fn malformed_frames_are_skipped() {
        let mut buf = "data: {not json\n: keepalive comment\n\ndata: [DONE]\n".to_string();
        assert_eq!(drain_frames(&mut buf), vec![SseFrame::Done]);
    }

    #[test]
    fn crlf_line_endings_are_handled() {
        let mut buf = "data: [DONE]\r\n".to_string();
        assert_eq!(drain_frames(&mut buf), vec![SseFrame::Done]);
    }

    #[test]
    fn non_data_fields_are_ignored() {
        let mut buf = "event: message\nid: 3\ndata: [DONE]\n".to_string();
        assert_eq!(drain_frames(&mut buf), vec![SseFrame::Done]);
    }
}
