// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::Path;

use tracing::debug;
use walkdir::WalkDir;

use crate::invocation::ToolResult;

/// Directories never descended into.
const IGNORED_DIRS: &[&str] = &[".git", "node_modules", "target", ".nca", "__pycache__"];

const MAX_MATCHES: usize = 300;
const MAX_ENTRIES: usize = 1_000;

fn is_ignored(entry: &walkdir::DirEntry) -> bool {
    entry.depth() > 0
        && entry.file_type().is_dir()
        && entry
            .file_name()
            .to_str()
            .map(|n| IGNORED_DIRS.contains(&n))
            .unwrap_or(false)
}

/// Regex search over the text files below `path`.
///
/// Output is one `file:line: text` row per match, capped at [`MAX_MATCHES`]
/// with an explicit notice when the cap is hit.
pub fn search_files(path: &str, pattern: &str, file_pattern: Option<&str>) -> ToolResult {
    debug!(path = %path, pattern = %pattern, "search_files tool");
    let re = match regex::Regex::new(pattern) {
        Ok(r) => r,
        Err(e) => return ToolResult::err(format!("invalid regex {pattern:?}: {e}")),
    };
    let name_filter = file_pattern.map(glob_to_regex);
    let name_filter = match name_filter {
        Some(Ok(r)) => Some(r),
        Some(Err(e)) => return ToolResult::err(e),
        None => None,
    };

    let mut rows = Vec::new();
    let mut capped = false;
    'walk: for entry in WalkDir::new(path)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !is_ignored(e))
        .filter_map(|e| e.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }
        if let Some(filter) = &name_filter {
            let name = entry.file_name().to_string_lossy();
            if !filter.is_match(&name) {
                continue;
            }
        }
        let Ok(text) = std::fs::read_to_string(entry.path()) else {
            continue; // binary or unreadable
        };
        for (idx, line) in text.lines().enumerate() {
            if re.is_match(line) {
                rows.push(format!("{}:{}: {}", entry.path().display(), idx + 1, line));
                if rows.len() >= MAX_MATCHES {
                    capped = true;
                    break 'walk;
                }
            }
        }
    }

    if rows.is_empty() {
        return ToolResult::ok(format!("No matches for {pattern:?} under {path}"));
    }
    let mut out = rows.join("\n");
    if capped {
        out.push_str(&format!(
            "\n[... stopped after {MAX_MATCHES} matches; narrow the pattern to see more ...]"
        ));
    }
    ToolResult::ok(out)
}

/// List directory entries below `path`.
///
/// Non-recursive by default; directories carry a trailing `/`.  Output is
/// sorted and capped at [`MAX_ENTRIES`].
pub fn list_files(path: &str, recursive: bool) -> ToolResult {
    debug!(path = %path, recursive, "list_files tool");
    if !Path::new(path).is_dir() {
        return ToolResult::err(format!("{path} is not a directory"));
    }
    let max_depth = if recursive { usize::MAX } else { 1 };
    let mut entries = Vec::new();
    let mut capped = false;
    for entry in WalkDir::new(path)
        .min_depth(1)
        .max_depth(max_depth)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !is_ignored(e))
        .filter_map(|e| e.ok())
    {
        let display = entry.path().display().to_string();
        if entry.file_type().is_dir() {
            entries.push(format!("{display}/"));
        } else {
            entries.push(display);
        }
        if entries.len() >= MAX_ENTRIES {
            capped = true;
            break;
        }
    }
    if entries.is_empty() {
        return ToolResult::ok(format!("{path} is empty"));
    }
    let mut out = entries.join("\n");
    if capped {
        out.push_str(&format!("\n[... listing capped at {MAX_ENTRIES} entries ...]"));
    }
    ToolResult::ok(out)
}

/// Find files whose name matches a `*`-style glob below `path`.
pub fn find_files(path: &str, pattern: &str) -> ToolResult {
    debug!(path = %path, pattern = %pattern, "find_files tool");
    let re = match glob_to_regex(pattern) {
        Ok(r) => r,
        Err(e) => return ToolResult::err(e),
    };
    let mut hits = Vec::new();
    let mut capped = false;
    for entry in WalkDir::new(path)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !is_ignored(e))
        .filter_map(|e| e.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy();
        if re.is_match(&name) {
            hits.push(entry.path().display().to_string());
            if hits.len() >= MAX_ENTRIES {
                capped = true;
                break;
            }
        }
    }
    if hits.is_empty() {
        return ToolResult::ok(format!("No files matching {pattern:?} under {path}"));
    }
    let mut out = hits.join("\n");
    if capped {
        out.push_str(&format!("\n[... capped at {MAX_ENTRIES} files ...]"));
    }
    ToolResult::ok(out)
}

/// Translate a `*`/`?` glob into an anchored regex over file names.
fn glob_to_regex(glob: &str) -> Result<regex::Regex, String> {
    let mut pattern = String::from("^");
    for c in glob.chars() {
        match c {
            '*' => pattern.push_str(".*"),
            '?' => pattern.push('.'),
            other => pattern.push_str(&regex::escape(&other.to_string())),
        }
    }
    pattern.push('$');
    regex::Regex::new(&pattern).map_err(|e| format!("invalid file pattern {glob:?}: {e}"))
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("src")).unwrap();
        std::fs::create_dir_all(dir.path().join(".git")).unwrap();
        std::fs::write(dir.path().join("src/main.rs"), "fn main() {}\nlet x = 1;\n").unwrap();
        std::fs::write(dir.path().join("src/lib.rs"), "pub fn lib() {}\n").unwrap();
        std::fs::write(dir.path().join("README.md"), "# readme\n").unwrap();
        std::fs::write(dir.path().join(".git/config"), "fn hidden() {}\n").unwrap();
        dir
    }

    #[test]
    fn search_finds_matches_with_line_numbers() {
        let dir = fixture();
        let out = search_files(dir.path().to_str().unwrap(), r"fn \w+", None);
        assert!(!out.is_error);
        assert!(out.content.contains("main.rs:1: fn main() {}"));
        assert!(out.content.contains("lib.rs:1: pub fn lib() {}"));
    }

    #[test]
    fn search_skips_ignored_directories() {
        let dir = fixture();
        let out = search_files(dir.path().to_str().unwrap(), "hidden", None);
        assert!(out.content.contains("No matches"));
    }

    #[test]
    fn search_honours_file_pattern() {
        let dir = fixture();
        let out = search_files(dir.path().to_str().unwrap(), "fn", Some("*.md"));
        assert!(out.content.contains("No matches"));
        let out = search_files(dir.path().to_str().unwrap(), "readme", Some("*.md"));
        assert!(out.content.contains("README.md"));
    }

    #[test]
    fn search_rejects_bad_regex() {
        let dir = fixture();
        let out = search_files(dir.path().to_str().unwrap(), "(unclosed", None);
        assert!(out.is_error);
    }

    #[test]
    fn list_non_recursive_stays_at_top_level() {
        let dir = fixture();
        let out = list_files(dir.path().to_str().unwrap(), false);
        assert!(out.content.contains("src/"));
        assert!(!out.content.contains("main.rs"));
    }

    #[test]
    fn list_recursive_descends() {
        let dir = fixture();
        let out = list_files(dir.path().to_str().unwrap(), true);
        assert!(out.content.contains("main.rs"));
        assert!(!out.content.contains(".git"));
    }

    #[test]
    fn list_non_directory_is_error() {
        let out = list_files("/no/such/dir", false);
        assert!(out.is_error);
    }

    #[test]
    fn find_matches_glob() {
        let dir = fixture();
        let out = find_files(dir.path().to_str().unwrap(), "*.rs");
        assert!(out.content.contains("main.rs"));
        assert!(out.content.contains("lib.rs"));
        assert!(!out.content.contains("README"));
    }

    #[test]
    fn find_reports_no_hits() {
        let dir = fixture();
        let out = find_files(dir.path().to_str().unwrap(), "*.zig");
        assert!(out.content.contains("No files matching"));
    }

    #[test]
    fn glob_question_mark_matches_one_char() {
        let re = glob_to_regex("a?.rs").unwrap();
        assert!(re.is_match("ab.rs"));
        assert!(!re.is_match("abc.rs"));
    }
}
