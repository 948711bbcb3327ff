// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Tool-invocation extraction from a completed assistant turn.
//!
//! Works on the raw accumulated content, not the filtered display stream.
//! Only complete `<tool>…</tool>` spans count: an opening tag without its
//! closer means the stream was cut off, and firing a half-parsed tool on an
//! aborted turn would be worse than doing nothing.

use std::collections::BTreeMap;

use nca_tools::tags::{is_opaque_param, TOOL_TAGS};
use nca_tools::ToolUse;

/// One extracted invocation: the earliest complete tool span by byte
/// position, its raw parameters, and whether further tool tags followed.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolInvocation {
    pub name: String,
    pub params: BTreeMap<String, String>,
    /// More than one tool tag appeared in the turn.
    pub multi: bool,
    /// Comma-joined names of every complete tool span, in byte order.
    pub detected_tools: String,
}

impl ToolInvocation {
    /// Convert the raw parameters into the typed invocation.
    pub fn to_tool_use(&self) -> Result<ToolUse, String> {
        ToolUse::from_params(&self.name, &self.params)
    }
}

/// Extract the first tool invocation from `content`, or `None` when no
/// complete tool span exists.
pub fn parse_assistant_message(content: &str) -> Option<ToolInvocation> {
    // Collect every complete root span across the recognized set.
    let mut spans: Vec<(usize, &str, &str)> = Vec::new(); // (start, name, body)
    for &name in TOOL_TAGS {
        let open = format!("<{name}>");
        let close = format!("</{name}>");
        let mut from = 0;
        while let Some(rel) = content[from..].find(&open) {
            let start = from + rel;
            let body_start = start + open.len();
            match content[body_start..].find(&close) {
                Some(body_len) => {
                    spans.push((start, name, &content[body_start..body_start + body_len]));
                    from = body_start + body_len + close.len();
                }
                None => break, // unclosed: aborted stream, span does not count
            }
        }
    }
    if spans.is_empty() {
        return None;
    }
    spans.sort_by_key(|(start, _, _)| *start);

    let (_, name, body) = spans[0];
    let detected: Vec<&str> = spans.iter().map(|(_, n, _)| *n).collect();

    Some(ToolInvocation {
        name: name.to_string(),
        params: parse_params(body),
        multi: spans.len() > 1,
        detected_tools: detected.join(", "),
    })
}

/// Extract `<param>value</param>` pairs from a tool body.
///
/// Values are whitespace-trimmed except for the opaque parameters (`diff`,
/// `content`), which keep their bytes exactly.  An unclosed parameter tag is
/// skipped.  The first occurrence of a parameter wins.
fn parse_params(body: &str) -> BTreeMap<String, String> {
    let mut params = BTreeMap::new();
    let mut pos = 0;
    while let Some(rel) = body[pos..].find('<') {
        let tag_start = pos + rel;
        let Some(name_len) = body[tag_start + 1..].find('>') else {
            break;
        };
        let name = &body[tag_start + 1..tag_start + 1 + name_len];
        if name.is_empty() || name.starts_with('/') || !is_param_name(name) {
            pos = tag_start + 1;
            continue;
        }
        let value_start = tag_start + 1 + name_len + 1;
        let close = format!("</{name}>");
        match body[value_start..].find(&close) {
            Some(value_len) => {
                let raw = &body[value_start..value_start + value_len];
                let value = if is_opaque_param(name) {
                    raw.to_string()
                } else {
                    raw.trim().to_string()
                };
                params.entry(name.to_string()).or_insert(value);
                pos = value_start + value_len + close.len();
            }
            None => {
                pos = tag_start + 1;
            }
        }
    }
    params
}

/// Parameter names are bare identifiers; anything else (`<`, spaces,
/// comparison operators in prose) is body text.
fn is_param_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
