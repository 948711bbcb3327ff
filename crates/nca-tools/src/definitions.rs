// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Top-level code definition scan.
//!
//! A deliberately shallow, line-prefix heuristic per language: enough for
//! the model to orient itself in an unfamiliar tree without a parser
//! dependency.  Nested definitions are out of scope.

use tracing::debug;
use walkdir::WalkDir;

use crate::invocation::ToolResult;

const MAX_FILES: usize = 100;

/// Scan `path` and list the top-level definitions per source file.
pub fn list_code_definition_names(path: &str) -> ToolResult {
    debug!(path = %path, "list_code_definition_names tool");
    let mut sections = Vec::new();
    let mut files_seen = 0usize;

    for entry in WalkDir::new(path)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            !(e.depth() > 0
                && e.file_type().is_dir()
                && matches!(
                    e.file_name().to_str(),
                    Some(".git" | "node_modules" | "target" | ".nca" | "__pycache__")
                ))
        })
        .filter_map(|e| e.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }
        let ext = entry
            .path()
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("");
        let Some(matcher) = matcher_for(ext) else {
            continue;
        };
        let Ok(text) = std::fs::read_to_string(entry.path()) else {
            continue;
        };
        let mut defs = Vec::new();
        for (idx, line) in text.lines().enumerate() {
            if let Some(def) = matcher(line) {
                defs.push(format!("  {}: {}", idx + 1, def));
            }
        }
        if !defs.is_empty() {
            sections.push(format!("{}:\n{}", entry.path().display(), defs.join("\n")));
            files_seen += 1;
            if files_seen >= MAX_FILES {
                sections.push(format!("[... scan capped at {MAX_FILES} files ...]"));
                break;
            }
        }
    }

    if sections.is_empty() {
        ToolResult::ok(format!("No source definitions found under {path}"))
    } else {
        ToolResult::ok(sections.join("\n\n"))
    }
}

type LineMatcher = fn(&str) -> Option<String>;

fn matcher_for(ext: &str) -> Option<LineMatcher> {
    match ext {
        "rs" => Some(match_rust),
        "go" => Some(match_go),
        "py" => Some(match_python),
        "js" | "jsx" | "ts" | "tsx" => Some(match_javascript),
        "c" | "h" | "cpp" | "hpp" | "cc" => Some(match_c_like),
        "java" => Some(match_java),
        _ => None,
    }
}

fn match_rust(line: &str) -> Option<String> {
    let t = line.trim_start();
    // Top level only: indented definitions are methods or nested items.
    if t.len() != line.len() {
        return None;
    }
    for prefix in [
        "pub fn ", "fn ", "pub struct ", "struct ", "pub enum ", "enum ", "pub trait ",
        "trait ", "impl ", "pub mod ", "mod ",
    ] {
        if t.starts_with(prefix) {
            return Some(t.trim_end_matches('{').trim().to_string());
        }
    }
    None
}

fn match_go(line: &str) -> Option<String> {
    if line.starts_with("func ") || line.starts_with("type ") {
        return Some(line.trim_end_matches('{').trim().to_string());
    }
    None
}

fn match_python(line: &str) -> Option<String> {
    if line.starts_with("def ") || line.starts_with("class ") || line.starts_with("async def ") {
        return Some(line.trim_end_matches(':').trim().to_string());
    }
    None
}

fn match_javascript(line: &str) -> Option<String> {
    for prefix in [
        "function ",
        "class ",
        "export function ",
        "export class ",
        "export default function ",
        "export const ",
        "const ",
    ] {
        if line.starts_with(prefix) {
            return Some(line.trim_end_matches('{').trim().to_string());
        }
    }
    None
}

fn match_c_like(line: &str) -> Option<String> {
    let t = line.trim_end();
    if line.starts_with(char::is_whitespace) || t.is_empty() {
        return None;
    }
    if t.starts_with("struct ") || t.starts_with("typedef ") || t.starts_with("enum ") {
        return Some(t.trim_end_matches('{').trim().to_string());
    }
    // A function definition line: identifier(...) ending with `{` or `)`.
    if (t.ends_with('{') || t.ends_with(')')) && t.contains('(') && !t.starts_with("if ")
        && !t.starts_with('#')
    {
        return Some(t.trim_end_matches('{').trim().to_string());
    }
    None
}

fn match_java(line: &str) -> Option<String> {
    let t = line.trim_start();
    for prefix in ["public class ", "class ", "interface ", "public interface "] {
        if t.starts_with(prefix) {
            return Some(t.trim_end_matches('{').trim().to_string());
        }
    }
    None
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
