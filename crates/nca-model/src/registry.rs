// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Static model registry.
//!
//! Maps model names to context-window, output-token, and pricing metadata.
//! The only consumer of the context window is the conversation manager,
//! which derives its truncation threshold from [`ModelInfo::max_allowed_size`].

/// Price per million tokens, display-only.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pricing {
    pub input_per_mtok: f64,
    pub output_per_mtok: f64,
}

/// Metadata for one known model.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelInfo {
    pub name: String,
    pub context_window: u32,
    pub max_tokens: u32,
    pub pricing: Option<Pricing>,
}

impl ModelInfo {
    /// The conversation-size ceiling for this model.
    ///
    /// Subtracts a window-class headroom from the context window: 27k for
    /// 64k-class models, 30k for 128k-class, 40k at 200k and above.  Smaller
    /// windows keep whichever is larger of `cw - 40k` and `cw × 0.8`.
    pub fn max_allowed_size(&self) -> u32 {
        let cw = self.context_window;
        if cw >= 200_000 {
            cw - 40_000
        } else if cw >= 128_000 {
            cw - 30_000
        } else if cw >= 64_000 {
            cw - 27_000
        } else {
            (cw.saturating_sub(40_000)).max((cw as f64 * 0.8) as u32)
        }
    }
}

fn entry(
    name: &str,
    context_window: u32,
    max_tokens: u32,
    pricing: Option<Pricing>,
) -> ModelInfo {
    ModelInfo {
        name: name.to_string(),
        context_window,
        max_tokens,
        pricing,
    }
}

/// Look a model up by name.
///
/// Exact names are matched first, then well-known family prefixes, so a
/// dated release like `claude-3-5-sonnet-20241022` resolves to its family
/// row.  Unknown models get a conservative 64k default.
pub fn lookup_model(name: &str) -> ModelInfo {
    match name {
        "deepseek-chat" => entry(
            name,
            64_000,
            8_192,
            Some(Pricing { input_per_mtok: 0.27, output_per_mtok: 1.10 }),
        ),
        "deepseek-reasoner" => entry(
            name,
            64_000,
            8_192,
            Some(Pricing { input_per_mtok: 0.55, output_per_mtok: 2.19 }),
        ),
        "qwen-max" => entry(name, 32_768, 8_192, None),
        "qwen-plus" => entry(name, 131_072, 8_192, None),
        "doubao-pro-32k" => entry(name, 32_768, 4_096, None),
        "doubao-pro-128k" => entry(name, 131_072, 4_096, None),
        "gpt-4o" | "gpt-4o-mini" => entry(name, 128_000, 16_384, None),
        _ => {
            if name.starts_with("claude-3") || name.starts_with("claude-4") {
                entry(name, 200_000, 8_192, None)
            } else if name.starts_with("qwen") {
                entry(name, 32_768, 8_192, None)
            } else if name.starts_with("doubao") {
                entry(name, 32_768, 4_096, None)
            } else {
                entry(name, 64_000, 8_192, None)
            }
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
