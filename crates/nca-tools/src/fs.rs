// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::Path;

use tracing::debug;

use crate::invocation::ToolResult;

const SEARCH_MARKER: &str = "<<<<<<< SEARCH";
const DIVIDER_MARKER: &str = "=======";
const REPLACE_MARKER: &str = ">>>>>>> REPLACE";

/// Read a file as UTF-8 text.
pub fn read_file(path: &str) -> ToolResult {
    debug!(path = %path, "read_file tool");
    match std::fs::read(path) {
        Ok(bytes) => match String::from_utf8(bytes) {
            Ok(text) => ToolResult::ok(text),
            Err(_) => ToolResult::err(format!("{path} is not valid UTF-8 text")),
        },
        Err(e) => ToolResult::err(format!("cannot read {path}: {e}")),
    }
}

/// Write (or overwrite) a file, creating parent directories as needed.
pub fn write_to_file(path: &str, content: &str) -> ToolResult {
    debug!(path = %path, bytes = content.len(), "write_to_file tool");
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                return ToolResult::err(format!("cannot create {}: {e}", parent.display()));
            }
        }
    }
    match std::fs::write(path, content) {
        Ok(()) => ToolResult::ok(format!("Wrote {} bytes to {path}", content.len())),
        Err(e) => ToolResult::err(format!("cannot write {path}: {e}")),
    }
}

/// Apply SEARCH/REPLACE blocks to an existing file.
///
/// The diff format is a sequence of blocks:
///
/// ```text
/// <<<<<<< SEARCH
/// exact existing text
/// =======
/// replacement text
/// >>>>>>> REPLACE
/// ```
///
/// Blocks apply in order, each replacing the first occurrence of its search
/// text.  A search text that does not occur fails the whole call without
/// touching the file.
pub fn replace_in_file(path: &str, diff: &str) -> ToolResult {
    debug!(path = %path, "replace_in_file tool");
    let original = match std::fs::read_to_string(path) {
        Ok(t) => t,
        Err(e) => return ToolResult::err(format!("cannot read {path}: {e}")),
    };

    let blocks = match parse_diff_blocks(diff) {
        Ok(b) => b,
        Err(e) => return ToolResult::err(e),
    };
    if blocks.is_empty() {
        return ToolResult::err("diff contains no SEARCH/REPLACE blocks".to_string());
    }

    let mut updated = original;
    for (i, (search, replace)) in blocks.iter().enumerate() {
        match updated.find(search.as_str()) {
            Some(pos) => {
                updated.replace_range(pos..pos + search.len(), replace);
            }
            None => {
                return ToolResult::err(format!(
                    "SEARCH block {} does not match {path}; the file may have changed. \
                     Re-read the file and retry with the exact current text.",
                    i + 1
                ));
            }
        }
    }

    match std::fs::write(path, &updated) {
        Ok(()) => ToolResult::ok(format!("Applied {} replacement(s) to {path}", blocks.len())),
        Err(e) => ToolResult::err(format!("cannot write {path}: {e}")),
    }
}

/// Split a diff body into (search, replace) pairs.
fn parse_diff_blocks(diff: &str) -> Result<Vec<(String, String)>, String> {
    let mut blocks = Vec::new();
    let mut lines = diff.lines().peekable();

    while let Some(line) = lines.next() {
        if line.trim_end() != SEARCH_MARKER {
            continue;
        }
        let mut search = String::new();
        let mut replace = String::new();
        let mut in_replace = false;
        let mut closed = false;
        for line in lines.by_ref() {
            let t = line.trim_end();
            if t == DIVIDER_MARKER && !in_replace {
                in_replace = true;
            } else if t == REPLACE_MARKER {
                closed = true;
                break;
            } else if in_replace {
                replace.push_str(line);
                replace.push('\n');
            } else {
                search.push_str(line);
                search.push('\n');
            }
        }
        if !closed {
            return Err("unterminated SEARCH/REPLACE block".to_string());
        }
        // Drop the trailing newline added by the line loop so single-line
        // searches match text that is not newline-terminated.
        if search.ends_with('\n') {
            search.pop();
        }
        if replace.ends_with('\n') {
            replace.pop();
        }
        blocks.push((search, replace));
    }
    Ok(blocks)
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_missing_file_is_error_result() {
        let out = read_file("/definitely/not/here.txt");
        assert!(out.is_error);
        assert!(out.content.contains("cannot read"));
    }

    #[test]
    fn write_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a/b/c.txt");
        let out = write_to_file(path.to_str().unwrap(), "hello");
        assert!(!out.is_error, "{}", out.content);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "hello");
    }

    #[test]
    fn write_then_read_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.txt");
        write_to_file(path.to_str().unwrap(), "content");
        let out = read_file(path.to_str().unwrap());
        assert_eq!(out.content, "content");
    }

    #[test]
    fn replace_applies_single_block() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.rs");
        std::fs::write(&path, "fn main() {\n    old();\n}\n").unwrap();
        let diff = "<<<<<<< SEARCH\n    old();\n=======\n    new();\n>>>>>>> REPLACE\n";
        let out = replace_in_file(path.to_str().unwrap(), diff);
        assert!(!out.is_error, "{}", out.content);
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "fn main() {\n    new();\n}\n"
        );
    }

    #[test]
    fn replace_applies_blocks_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.txt");
        std::fs::write(&path, "one two three").unwrap();
        let diff = "<<<<<<< SEARCH\none\n=======\n1\n>>>>>>> REPLACE\n\
                    <<<<<<< SEARCH\nthree\n=======\n3\n>>>>>>> REPLACE\n";
        let out = replace_in_file(path.to_str().unwrap(), diff);
        assert!(!out.is_error, "{}", out.content);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "1 two 3");
    }

    #[test]
    fn unmatched_search_fails_without_writing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.txt");
        std::fs::write(&path, "original").unwrap();
        let diff = "<<<<<<< SEARCH\nnot present\n=======\nx\n>>>>>>> REPLACE\n";
        let out = replace_in_file(path.to_str().unwrap(), diff);
        assert!(out.is_error);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "original");
    }

    #[test]
    fn unterminated_block_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.txt");
        std::fs::write(&path, "text").unwrap();
        let out = replace_in_file(path.to_str().unwrap(), "<<<<<<< SEARCH\ntext\n=======\nx\n");
        assert!(out.is_error);
        assert!(out.content.contains("unterminated"));
    }

    #[test]
    fn empty_diff_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.txt");
        std::fs::write(&path, "text").unwrap();
        let out = replace_in_file(path.to_str().unwrap(), "no markers here");
        assert!(out.is_error);
    }

    #[test]
    fn replacement_may_be_empty_to_delete_text() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.txt");
        std::fs::write(&path, "keep REMOVE keep").unwrap();
        let diff = "<<<<<<< SEARCH\n REMOVE\n=======\n>>>>>>> REPLACE\n";
        let out = replace_in_file(path.to_str().unwrap(), diff);
        assert!(!out.is_error, "{}", out.content);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "keep keep");
    }
}
