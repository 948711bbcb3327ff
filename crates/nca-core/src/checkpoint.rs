// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Per-prompt journal of filesystem mutations with restore and redo.
//!
//! Every user prompt opens a checkpoint; every mutating tool appends a
//! [`FileOperation`] to it.  `restore` walks checkpoints newest-first down
//! to the target and inverts each operation in reverse commit order; `redo`
//! replays forward.  A restore is not itself journaled; redo re-reads the
//! original operations.
//!
//! The journal is rewritten whole to `.nca/checkpoints.json` after each
//! mutating call.  Individual file failures during restore/redo are
//! collected into the report, never aborting the scan; the user resolves
//! leftovers manually.

use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// How many checkpoints are retained; older ones are evicted from the head.
pub const RETAINED_CHECKPOINTS: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileOperationKind {
    Write,
    Replace,
    Delete,
}

/// One journaled mutation.  `old_content` is empty for a write that created
/// the file (its undo is a delete); `new_content` is empty for a delete.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileOperation {
    pub kind: FileOperationKind,
    pub path: String,
    pub new_content: String,
    pub old_content: String,
    pub timestamp: DateTime<Utc>,
}

/// The journal of one user prompt.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Checkpoint {
    /// Millisecond-resolution timestamp, e.g. `20260801143015123`.
    pub id: String,
    pub user_prompt: String,
    pub timestamp: DateTime<Utc>,
    pub operations: Vec<FileOperation>,
}

/// On-disk document shape.
#[derive(Debug, Default, Serialize, Deserialize)]
struct Journal {
    checkpoints: Vec<Checkpoint>,
}

pub struct CheckpointManager {
    checkpoints: Vec<Checkpoint>,
    path: PathBuf,
}

impl CheckpointManager {
    /// Load the journal from `workdir/.nca/checkpoints.json`; a missing file
    /// is an empty journal.
    pub fn load(workdir: &Path) -> anyhow::Result<Self> {
        let path = workdir.join(".nca").join("checkpoints.json");
        let checkpoints = if path.is_file() {
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("reading {}", path.display()))?;
            let journal: Journal = serde_json::from_str(&text)
                .with_context(|| format!("parsing {}", path.display()))?;
            journal.checkpoints
        } else {
            Vec::new()
        };
        Ok(Self { checkpoints, path })
    }

    /// Open a new checkpoint for `user_prompt`, evicting beyond the
    /// retention bound, and persist.
    pub fn create_checkpoint(&mut self, user_prompt: &str) -> anyhow::Result<String> {
        let now = Utc::now();
        let mut id = now.format("%Y%m%d%H%M%S%3f").to_string();
        // Same-millisecond prompts are unlikely but cheap to disambiguate.
        if self.checkpoints.iter().any(|c| c.id == id) {
            id = format!("{id}-{}", self.checkpoints.len());
        }
        self.checkpoints.push(Checkpoint {
            id: id.clone(),
            user_prompt: user_prompt.to_string(),
            timestamp: now,
            operations: Vec::new(),
        });
        if self.checkpoints.len() > RETAINED_CHECKPOINTS {
            let excess = self.checkpoints.len() - RETAINED_CHECKPOINTS;
            self.checkpoints.drain(..excess);
        }
        self.persist()?;
        debug!(id = %id, "checkpoint created");
        Ok(id)
    }

    /// Append an operation to the current (latest) checkpoint and persist.
    pub fn record_file_operation(
        &mut self,
        kind: FileOperationKind,
        path: &str,
        new_content: String,
        old_content: String,
    ) -> anyhow::Result<()> {
        let current = self
            .checkpoints
            .last_mut()
            .context("no checkpoint open; record after create_checkpoint")?;
        current.operations.push(FileOperation {
            kind,
            path: path.to_string(),
            new_content,
            old_content,
            timestamp: Utc::now(),
        });
        self.persist()
    }

    pub fn list(&self) -> &[Checkpoint] {
        &self.checkpoints
    }

    /// Undo everything from the newest checkpoint back to and including
    /// `id`.  Returns a human-readable report; per-file failures are listed
    /// in it rather than aborting.
    pub fn restore(&self, id: &str) -> anyhow::Result<String> {
        let target = self.index_of(id)?;
        let mut reverted = 0usize;
        let mut errors: Vec<String> = Vec::new();

        for checkpoint in self.checkpoints[target..].iter().rev() {
            for op in checkpoint.operations.iter().rev() {
                match invert_operation(op) {
                    Ok(()) => reverted += 1,
                    Err(e) => errors.push(format!("{}: {e}", op.path)),
                }
            }
        }
        Ok(report("Restored", id, reverted, &errors))
    }

    /// Re-apply everything from `id` forward to the newest checkpoint.
    pub fn redo(&self, id: &str) -> anyhow::Result<String> {
        let target = self.index_of(id)?;
        let mut applied = 0usize;
        let mut errors: Vec<String> = Vec::new();

        for checkpoint in &self.checkpoints[target..] {
            for op in &checkpoint.operations {
                match apply_operation(op) {
                    Ok(()) => applied += 1,
                    Err(e) => errors.push(format!("{}: {e}", op.path)),
                }
            }
        }
        Ok(report("Redone", id, applied, &errors))
    }

    fn index_of(&self, id: &str) -> anyhow::Result<usize> {
        self.checkpoints
            .iter()
            .position(|c| c.id == id)
            .with_context(|| format!("no checkpoint with id {id}"))
    }

    fn persist(&self) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let journal = Journal { checkpoints: self.checkpoints.clone() };
        let text = serde_json::to_string_pretty(&journal)?;
        std::fs::write(&self.path, text)
            .with_context(|| format!("writing {}", self.path.display()))
    }
}

/// Apply the inverse of one operation.
fn invert_operation(op: &FileOperation) -> anyhow::Result<()> {
    match op.kind {
        FileOperationKind::Write => {
            if op.old_content.is_empty() {
                // The write created this file; undo is delete.
                if Path::new(&op.path).exists() {
                    std::fs::remove_file(&op.path)?;
                }
                Ok(())
            } else {
                write_all(&op.path, &op.old_content)
            }
        }
        FileOperationKind::Replace => write_all(&op.path, &op.old_content),
        FileOperationKind::Delete => write_all(&op.path, &op.old_content),
    }
}

/// Re-apply one operation as originally committed.
fn apply_operation(op: &FileOperation) -> anyhow::Result<()> {
    match op.kind {
        FileOperationKind::Write | FileOperationKind::Replace => {
            write_all(&op.path, &op.new_content)
        }
        FileOperationKind::Delete => {
            if Path::new(&op.path).exists() {
                std::fs::remove_file(&op.path)?;
            }
            Ok(())
        }
    }
}

fn write_all(path: &str, content: &str) -> anyhow::Result<()> {
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(path, content)?;
    Ok(())
}

fn report(verb: &str, id: &str, count: usize, errors: &[String]) -> String {
    if errors.is_empty() {
        format!("{verb} checkpoint {id}: {count} file operation(s)")
    } else {
        format!(
            "{verb} checkpoint {id}: {count} file operation(s), {} failed:\n{}",
            errors.len(),
            errors.join("\n")
        )
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn manager(dir: &Path) -> CheckpointManager {
        CheckpointManager::load(dir).unwrap()
    }

    fn file_in(dir: &Path, name: &str) -> String {
        dir.join(name).to_str().unwrap().to_string()
    }

    #[test]
    fn journal_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let mut m = manager(dir.path());
        let id = m.create_checkpoint("build a parser").unwrap();
        m.record_file_operation(
            FileOperationKind::Write,
            "src/parser.rs",
            "new".into(),
            String::new(),
        )
        .unwrap();

        let reloaded = manager(dir.path());
        assert_eq!(reloaded.list(), m.list());
        assert_eq!(reloaded.list()[0].id, id);
        assert_eq!(reloaded.list()[0].user_prompt, "build a parser");
    }

    #[test]
    fn retention_evicts_from_the_head() {
        let dir = tempfile::tempdir().unwrap();
        let mut m = manager(dir.path());
        let mut ids = Vec::new();
        for i in 0..8 {
            ids.push(m.create_checkpoint(&format!("prompt {i}")).unwrap());
        }
        assert_eq!(m.list().len(), RETAINED_CHECKPOINTS);
        assert_eq!(m.list()[0].user_prompt, "prompt 2");
        assert_eq!(m.list().last().unwrap().id, ids[7]);
    }

    #[test]
    fn checkpoint_ids_are_unique_within_a_burst() {
        let dir = tempfile::tempdir().unwrap();
        let mut m = manager(dir.path());
        let a = m.create_checkpoint("one").unwrap();
        let b = m.create_checkpoint("two").unwrap();
        let c = m.create_checkpoint("three").unwrap();
        assert_ne!(a, b);
        assert_ne!(b, c);
    }

    #[test]
    fn record_without_checkpoint_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut m = manager(dir.path());
        let res = m.record_file_operation(
            FileOperationKind::Write,
            "x",
            String::new(),
            String::new(),
        );
        assert!(res.is_err());
    }

    #[test]
    fn restore_undoes_a_creating_write_by_deleting() {
        let dir = tempfile::tempdir().unwrap();
        let target = file_in(dir.path(), "created.txt");
        let mut m = manager(dir.path());
        let id = m.create_checkpoint("create a file").unwrap();

        std::fs::write(&target, "fresh").unwrap();
        m.record_file_operation(FileOperationKind::Write, &target, "fresh".into(), String::new())
            .unwrap();

        m.restore(&id).unwrap();
        assert!(!Path::new(&target).exists());
    }

    #[test]
    fn restore_reverts_replace_to_old_content() {
        let dir = tempfile::tempdir().unwrap();
        let target = file_in(dir.path(), "f.txt");
        std::fs::write(&target, "v1").unwrap();

        let mut m = manager(dir.path());
        let id = m.create_checkpoint("edit").unwrap();
        std::fs::write(&target, "v2").unwrap();
        m.record_file_operation(FileOperationKind::Replace, &target, "v2".into(), "v1".into())
            .unwrap();

        m.restore(&id).unwrap();
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "v1");
    }

    #[test]
    fn restore_recreates_a_deleted_file() {
        let dir = tempfile::tempdir().unwrap();
        let target = file_in(dir.path(), "gone.txt");
        std::fs::write(&target, "precious").unwrap();

        let mut m = manager(dir.path());
        let id = m.create_checkpoint("delete it").unwrap();
        std::fs::remove_file(&target).unwrap();
        m.record_file_operation(
            FileOperationKind::Delete,
            &target,
            String::new(),
            "precious".into(),
        )
        .unwrap();

        m.restore(&id).unwrap();
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "precious");
    }

    #[test]
    fn restore_spans_newer_checkpoints_in_reverse() {
        let dir = tempfile::tempdir().unwrap();
        let target = file_in(dir.path(), "f.txt");
        std::fs::write(&target, "v1").unwrap();

        let mut m = manager(dir.path());
        let first = m.create_checkpoint("first edit").unwrap();
        std::fs::write(&target, "v2").unwrap();
        m.record_file_operation(FileOperationKind::Replace, &target, "v2".into(), "v1".into())
            .unwrap();

        m.create_checkpoint("second edit").unwrap();
        std::fs::write(&target, "v3").unwrap();
        m.record_file_operation(FileOperationKind::Replace, &target, "v3".into(), "v2".into())
            .unwrap();

        // Restoring the first checkpoint rolls back both edits.
        m.restore(&first).unwrap();
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "v1");
    }

    #[test]
    fn restore_then_redo_returns_to_pre_restore_state() {
        let dir = tempfile::tempdir().unwrap();
        let a = file_in(dir.path(), "a.txt");
        let b = file_in(dir.path(), "b.txt");
        std::fs::write(&a, "a-old").unwrap();

        let mut m = manager(dir.path());
        let id = m.create_checkpoint("mutate both").unwrap();
        std::fs::write(&a, "a-new").unwrap();
        m.record_file_operation(FileOperationKind::Replace, &a, "a-new".into(), "a-old".into())
            .unwrap();
        std::fs::write(&b, "b-new").unwrap();
        m.record_file_operation(FileOperationKind::Write, &b, "b-new".into(), String::new())
            .unwrap();

        m.restore(&id).unwrap();
        assert_eq!(std::fs::read_to_string(&a).unwrap(), "a-old");
        assert!(!Path::new(&b).exists());

        m.redo(&id).unwrap();
        assert_eq!(std::fs::read_to_string(&a).unwrap(), "a-new");
        assert_eq!(std::fs::read_to_string(&b).unwrap(), "b-new");
    }

    #[test]
    fn restore_unknown_id_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let m = manager(dir.path());
        assert!(m.restore("20990101000000000").is_err());
    }

    #[test]
    fn restore_accumulates_per_file_errors() {
        let dir = tempfile::tempdir().unwrap();
        let mut m = manager(dir.path());
        let id = m.create_checkpoint("bad path").unwrap();
        m.record_file_operation(
            FileOperationKind::Replace,
            "/proc/definitely/not/writable",
            "x".into(),
            "y".into(),
        )
        .unwrap();

        let good = file_in(dir.path(), "ok.txt");
        std::fs::write(&good, "new").unwrap();
        m.record_file_operation(FileOperationKind::Replace, &good, "new".into(), "old".into())
            .unwrap();

        let out = m.restore(&id).unwrap();
        assert!(out.contains("1 failed"), "{out}");
        // The good file was still restored.
        assert_eq!(std::fs::read_to_string(&good).unwrap(), "old");
    }
}
