// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Conversation history and the truncation policy that keeps it sendable.
//!
//! Truncated messages are not removed from memory; an inclusive deleted
//! range `[lo, hi]` marks the span elided from the provider view.  Keeping
//! the full list stable makes repeated truncations simple bookkeeping
//! (`hi + 1` is always the next removable index) and leaves the transcript
//! available for display.
//!
//! Invariants: index 0 (the system prompt) is never inside the range;
//! `lo ≥ 1`; every truncation ends the range on a user message so that the
//! surviving sequence keeps its user/assistant alternation.

use nca_model::{Message, ModelInfo, Role, Usage};
use thiserror::Error;
use tracing::debug;

/// How much of the removable region one truncation claims.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TruncationPolicy {
    /// Routine pressure: remove half.
    Half,
    /// Heavy pressure (or a `length` stop): remove three quarters.
    Quarter,
}

impl TruncationPolicy {
    fn share(&self) -> f64 {
        match self {
            TruncationPolicy::Half => 0.5,
            TruncationPolicy::Quarter => 0.75,
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum TruncationError {
    #[error("conversation cannot be truncated further; start a new task with /clear")]
    NothingRemovable,
}

/// Ordered message history with an optional deleted range.
#[derive(Debug)]
pub struct Conversation {
    messages: Vec<Message>,
    deleted_range: Option<(usize, usize)>,
}

impl Conversation {
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self {
            messages: vec![Message::system(system_prompt)],
            deleted_range: None,
        }
    }

    pub fn push_user(&mut self, content: impl Into<String>) {
        self.messages.push(Message::user(content));
    }

    pub fn push_assistant(&mut self, content: impl Into<String>) {
        self.messages.push(Message::assistant(content));
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn deleted_range(&self) -> Option<(usize, usize)> {
        self.deleted_range
    }

    /// Drop everything but the system prompt (the `/clear` command).
    pub fn clear(&mut self) {
        self.messages.truncate(1);
        self.deleted_range = None;
    }

    /// The view sent to the provider: index 0 plus every index outside the
    /// deleted range.
    pub fn effective_messages(&self) -> Vec<Message> {
        match self.deleted_range {
            None => self.messages.clone(),
            Some((lo, hi)) => self
                .messages
                .iter()
                .enumerate()
                .filter(|(i, _)| *i == 0 || *i < lo || *i > hi)
                .map(|(_, m)| m.clone())
                .collect(),
        }
    }

    /// Extend the deleted range according to `policy`.
    ///
    /// The removable region starts right after the previous range (index 1
    /// on first truncation).  The claimed count is rounded down to an even
    /// number to respect user/assistant pairing, then the final index is
    /// decremented when it lands on a non-user message so the last removed
    /// message is always a user message.
    pub fn truncate(
        &mut self,
        policy: TruncationPolicy,
    ) -> Result<(usize, usize), TruncationError> {
        let len = self.messages.len();
        let lo = self.deleted_range.map(|(lo, _)| lo).unwrap_or(1);
        let start = self
            .deleted_range
            .map(|(_, hi)| hi + 1)
            .unwrap_or(1)
            .max(1);
        if start >= len {
            return Err(TruncationError::NothingRemovable);
        }

        let remaining = len - start;
        let count = ((remaining as f64 * policy.share() / 2.0).floor() as usize) & !1;
        if count == 0 {
            return Err(TruncationError::NothingRemovable);
        }

        let mut hi = start + count - 1;
        if self.messages[hi].role != Role::User {
            hi -= 1;
        }
        if hi < start {
            return Err(TruncationError::NothingRemovable);
        }

        self.deleted_range = Some((lo, hi));
        debug!(?policy, lo, hi, total = len, "conversation truncated");
        Ok((lo, hi))
    }
}

/// Decide whether the latest usage report forces a truncation.
///
/// Heavier pressure wins: when even half the conversation would overflow
/// the ceiling the `Quarter` policy (remove three quarters) applies;
/// otherwise reaching the ceiling applies `Half`.
pub fn policy_for_usage(usage: &Usage, model: &ModelInfo) -> Option<TruncationPolicy> {
    let max_allowed = model.max_allowed_size();
    if usage.total_tokens / 2 > max_allowed {
        Some(TruncationPolicy::Quarter)
    } else if usage.total_tokens >= max_allowed {
        Some(TruncationPolicy::Half)
    } else {
        None
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use nca_model::lookup_model;

    /// `sys, u1, a1, u2, a2, ...` with `pairs` user/assistant pairs.
    fn conversation_with_pairs(pairs: usize) -> Conversation {
        let mut c = Conversation::new("system prompt");
        for i in 1..=pairs {
            c.push_user(format!("u{i}"));
            c.push_assistant(format!("a{i}"));
        }
        c
    }

    #[test]
    fn nine_message_half_truncation_deletes_one_user_message() {
        // sys, u1, a1, u2, a2, u3, a3, u4, a4 → computed span [1,2] is
        // tie-broken down to end on the user message at index 1.
        let mut c = conversation_with_pairs(4);
        assert_eq!(c.len(), 9);
        let range = c.truncate(TruncationPolicy::Half).unwrap();
        assert_eq!(range, (1, 1));
        assert_eq!(c.deleted_range(), Some((1, 1)));
    }

    #[test]
    fn system_message_survives_any_truncation() {
        let mut c = conversation_with_pairs(8);
        for _ in 0..3 {
            let _ = c.truncate(TruncationPolicy::Quarter);
        }
        let eff = c.effective_messages();
        assert_eq!(eff[0].role, Role::System);
        assert_eq!(eff[0].content, "system prompt");
    }

    #[test]
    fn even_effective_indices_hold_user_messages_after_truncation() {
        let mut c = conversation_with_pairs(6);
        c.truncate(TruncationPolicy::Half).unwrap();
        let eff = c.effective_messages();
        for (i, msg) in eff.iter().enumerate().skip(1) {
            if i % 2 == 0 {
                assert_eq!(msg.role, Role::User, "index {i} should be a user message");
            }
        }
    }

    #[test]
    fn repeated_truncations_extend_the_range() {
        let mut c = conversation_with_pairs(10);
        let (lo1, hi1) = c.truncate(TruncationPolicy::Half).unwrap();
        assert_eq!(lo1, 1);
        let (lo2, hi2) = c.truncate(TruncationPolicy::Half).unwrap();
        assert_eq!(lo2, 1, "range start is stable");
        assert!(hi2 > hi1, "range end advances");
        // Invariant holds after both rounds.
        let eff = c.effective_messages();
        assert_eq!(eff[2].role, Role::User);
    }

    #[test]
    fn quarter_removes_more_than_half() {
        let mut a = conversation_with_pairs(20);
        let mut b = conversation_with_pairs(20);
        let (_, hi_half) = a.truncate(TruncationPolicy::Half).unwrap();
        let (_, hi_quarter) = b.truncate(TruncationPolicy::Quarter).unwrap();
        assert!(hi_quarter > hi_half);
    }

    #[test]
    fn truncating_an_exhausted_conversation_fails() {
        let mut c = conversation_with_pairs(1); // sys, u1, a1
        // Nothing removable in pairs: count rounds to zero.
        assert_eq!(
            c.truncate(TruncationPolicy::Half),
            Err(TruncationError::NothingRemovable)
        );
    }

    #[test]
    fn truncation_eventually_exhausts() {
        let mut c = conversation_with_pairs(8);
        let mut rounds = 0;
        while c.truncate(TruncationPolicy::Quarter).is_ok() {
            rounds += 1;
            assert!(rounds < 20, "truncation must terminate");
        }
        assert!(rounds >= 1);
    }

    #[test]
    fn effective_messages_skip_only_the_range() {
        let mut c = conversation_with_pairs(4);
        c.truncate(TruncationPolicy::Half).unwrap(); // range [1,1]
        let eff = c.effective_messages();
        assert_eq!(eff.len(), 8);
        assert_eq!(eff[1].content, "a1");
        assert_eq!(eff[2].content, "u2");
    }

    #[test]
    fn clear_resets_to_system_only() {
        let mut c = conversation_with_pairs(4);
        c.truncate(TruncationPolicy::Half).unwrap();
        c.clear();
        assert_eq!(c.len(), 1);
        assert_eq!(c.deleted_range(), None);
    }

    // ── policy_for_usage ─────────────────────────────────────────────────────

    fn usage(total: u32) -> Usage {
        Usage { prompt_tokens: total, completion_tokens: 0, total_tokens: total }
    }

    #[test]
    fn below_ceiling_needs_no_truncation() {
        let model = lookup_model("deepseek-chat"); // ceiling 37_000
        assert_eq!(policy_for_usage(&usage(36_999), &model), None);
    }

    #[test]
    fn at_ceiling_applies_half() {
        let model = lookup_model("deepseek-chat");
        assert_eq!(
            policy_for_usage(&usage(37_000), &model),
            Some(TruncationPolicy::Half)
        );
    }

    #[test]
    fn far_past_ceiling_applies_quarter() {
        let model = lookup_model("deepseek-chat");
        assert_eq!(
            policy_for_usage(&usage(74_002), &model),
            Some(TruncationPolicy::Quarter)
        );
    }

    #[test]
    fn ceilings_match_the_model_registry() {
        assert_eq!(lookup_model("deepseek-chat").max_allowed_size(), 37_000);
        assert_eq!(lookup_model("claude-3").max_allowed_size(), 160_000);
    }
}
