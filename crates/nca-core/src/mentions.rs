// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Backtick mention expansion.
//!
//! Tokens the user wraps in backticks are resolved before the prompt is
//! sent: URLs are fetched and flattened to text, existing file paths are
//! inlined (text files only, capped).  Anything else is left alone.

use std::path::Path;

use tracing::debug;

/// Per-file inline cap.
const MAX_FILE_BYTES: usize = 64 * 1024;

/// How many bytes to sniff when deciding whether a file is text.
const SNIFF_BYTES: usize = 8 * 1024;

/// Resolve every backtick-wrapped token in `input` and append the resolved
/// content below the prompt.
pub async fn expand_mentions(input: &str) -> String {
    let mut sections: Vec<String> = Vec::new();
    for token in backtick_tokens(input) {
        if token.starts_with("http://") || token.starts_with("https://") {
            debug!(url = %token, "expanding URL mention");
            match nca_tools::fetch_url_as_text(&token, MAX_FILE_BYTES).await {
                Ok(text) => {
                    sections.push(format!("[Content of {token}]\n{text}"));
                }
                Err(e) => {
                    sections.push(format!("[Could not fetch {token}: {e}]"));
                }
            }
        } else if Path::new(&token).is_file() {
            debug!(path = %token, "expanding file mention");
            match read_text_file(&token) {
                Ok(text) => {
                    sections.push(format!("[Content of {token}]\n```\n{text}\n```"));
                }
                Err(e) => {
                    sections.push(format!("[Could not read {token}: {e}]"));
                }
            }
        }
    }

    if sections.is_empty() {
        input.to_string()
    } else {
        format!("{input}\n\n{}", sections.join("\n\n"))
    }
}

/// All backtick-wrapped tokens, in order.
fn backtick_tokens(input: &str) -> Vec<String> {
    let parts: Vec<&str> = input.split('`').collect();
    let mut tokens = Vec::new();
    // Odd segments sit between backticks; the final segment never closed.
    for (i, seg) in parts.iter().enumerate() {
        if i % 2 == 1 && i < parts.len() - 1 {
            let token = seg.trim();
            if !token.is_empty() && !token.contains('\n') {
                tokens.push(token.to_string());
            }
        }
    }
    tokens
}

/// Read a file for inlining: UTF-8 text only, capped.
fn read_text_file(path: &str) -> anyhow::Result<String> {
    let bytes = std::fs::read(path)?;
    let sniff = &bytes[..bytes.len().min(SNIFF_BYTES)];
    if sniff.contains(&0) {
        anyhow::bail!("binary file");
    }
    let text = std::str::from_utf8(&bytes).map_err(|_| anyhow::anyhow!("not UTF-8 text"))?;
    if text.len() > MAX_FILE_BYTES {
        let mut cut = MAX_FILE_BYTES;
        while !text.is_char_boundary(cut) {
            cut -= 1;
        }
        Ok(format!(
            "{}\n[... truncated at {MAX_FILE_BYTES} bytes ...]",
            &text[..cut]
        ))
    } else {
        Ok(text.to_string())
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
