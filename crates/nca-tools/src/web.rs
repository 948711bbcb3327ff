// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::time::Duration;

use serde_json::Value;
use tracing::debug;

use crate::invocation::ToolResult;

const DEFAULT_MAX_CHARS: usize = 50_000;

/// Fetch a URL and flatten it to readable text.
pub async fn fetch_web_content(url: &str) -> ToolResult {
    debug!(url = %url, "fetch_web_content tool");
    match fetch_url_as_text(url, DEFAULT_MAX_CHARS).await {
        Ok(content) => ToolResult::ok(content),
        Err(e) => ToolResult::err(format!("fetch error: {e}")),
    }
}

/// Fetch a URL, converting HTML to markdown-ish text and pretty-printing
/// JSON.  Shared by the tool above and backtick-mention expansion.
pub async fn fetch_url_as_text(url: &str, max_chars: usize) -> anyhow::Result<String> {
    if !url.starts_with("http://") && !url.starts_with("https://") {
        anyhow::bail!("only http and https URLs are supported");
    }
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .redirect(reqwest::redirect::Policy::limited(3))
        .user_agent(concat!("nca/", env!("CARGO_PKG_VERSION")))
        .build()?;

    let response = client.get(url).send().await?;
    if !response.status().is_success() {
        anyhow::bail!("HTTP {}", response.status());
    }
    let content_type = response
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_lowercase();

    let body = response.text().await?;

    let content = if content_type.contains("html") {
        html_to_text(&body)
    } else if content_type.contains("json") {
        match serde_json::from_str::<Value>(&body) {
            Ok(v) => serde_json::to_string_pretty(&v).unwrap_or(body),
            Err(_) => body,
        }
    } else {
        body
    };

    if content.len() > max_chars {
        let cut = floor_char_boundary(&content, max_chars);
        Ok(format!(
            "{}...[truncated at {max_chars} chars; total {} chars]",
            &content[..cut],
            content.len()
        ))
    } else {
        Ok(content)
    }
}

fn html_to_text(html: &str) -> String {
    html2text::from_read(html.as_bytes(), 100)
}

/// Largest index `<= at` that is a char boundary.
fn floor_char_boundary(s: &str, at: usize) -> usize {
    let mut i = at.min(s.len());
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
