// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Message retention pruning.
//!
//! Capability-injected content blocks may carry a retention horizon: the
//! number of future turns the block survives before it is pruned from
//! history. The horizon is measured by message position: the newest
//! retention-tracked message sits at index 0, and a block with horizon N is
//! kept while its message's index stays below N. Blocks with no horizon
//! never expire.
//!
//! Pruning never edits a message in place: a message that loses some blocks
//! is re-issued under the same id with the filtered block and horizon lists,
//! and a message that loses every block is tombstoned. Running the prune
//! twice over the same history yields the same result as once.

use crate::types::Message;
use serde::{Deserialize, Serialize};

/// Result of one pruning pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PruneOutcome {
    /// Messages re-issued with filtered content, same ids.
    pub updated: Vec<Message>,
    /// Ids of messages whose entire content expired.
    pub removed_ids: Vec<String>,
}

impl PruneOutcome {
    /// Whether the pass changed nothing.
    pub fn is_noop(&self) -> bool {
        self.updated.is_empty() && self.removed_ids.is_empty()
    }

    /// Apply this outcome to a history, dropping tombstoned messages and
    /// swapping in the re-issued ones.
    pub fn apply(&self, messages: Vec<Message>) -> Vec<Message> {
        messages
            .into_iter()
            .filter(|m| !self.removed_ids.contains(&m.id))
            .map(|m| {
                self.updated
                    .iter()
                    .find(|u| u.id == m.id)
                    .cloned()
                    .unwrap_or(m)
            })
            .collect()
    }
}

/// Compute expired blocks across a history.
///
/// Only messages carrying a retention list participate; their index counts
/// from the newest such message backwards. A block is kept iff its horizon
/// entry is `None` or strictly greater than the message index. Blocks with
/// no horizon entry at all (malformed, shorter list than content) are
/// pruned.
pub fn prune(messages: &[Message]) -> PruneOutcome {
    let mut outcome = PruneOutcome::default();

    let tracked: Vec<&Message> = messages.iter().filter(|m| m.retention.is_some()).collect();

    for (idx, message) in tracked.iter().rev().enumerate() {
        let Some(retention) = &message.retention else {
            continue;
        };

        let keep: Vec<bool> = (0..message.content.len())
            .map(|i| match retention.get(i) {
                Some(None) => true,
                Some(Some(horizon)) => *horizon as usize > idx,
                None => false,
            })
            .collect();

        if keep.iter().all(|k| *k) {
            continue;
        }

        let kept_blocks: Vec<_> = message
            .content
            .iter()
            .zip(&keep)
            .filter(|(_, kept)| **kept)
            .map(|(block, _)| block.clone())
            .collect();

        if kept_blocks.is_empty() {
            outcome.removed_ids.push(message.id.clone());
            continue;
        }

        let kept_retention: Vec<Option<u32>> = retention
            .iter()
            .zip(&keep)
            .filter(|(_, kept)| **kept)
            .map(|(horizon, _)| *horizon)
            .collect();

        let mut replacement = (*message).clone();
        replacement.content = kept_blocks;
        replacement.retention = Some(kept_retention);
        outcome.updated.push(replacement);
    }

    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ContentBlock, Role};

    fn tracked(text: &str, retention: Vec<Option<u32>>) -> Message {
        let blocks = (0..retention.len())
            .map(|i| ContentBlock::text(format!("{text}-{i}")))
            .collect();
        Message::with_blocks(Role::User, blocks).with_retention(retention)
    }

    #[test]
    fn test_prune_untracked_history_is_noop() {
        let history = vec![Message::user("hello"), Message::assistant("hi")];
        assert!(prune(&history).is_noop());
    }

    #[test]
    fn test_prune_newest_tracked_message_survives_horizon_one() {
        let history = vec![tracked("ctx", vec![Some(1)])];
        assert!(prune(&history).is_noop());
    }

    #[test]
    fn test_prune_expires_block_past_horizon() {
        // Two tracked messages: the older one sits at index 1, so a horizon
        // of 1 is no longer strictly greater and the block expires.
        let old = tracked("old", vec![Some(1)]);
        let new = tracked("new", vec![Some(1)]);
        let old_id = old.id.clone();
        let history = vec![old, new];

        let outcome = prune(&history);
        assert_eq!(outcome.removed_ids, vec![old_id]);
        assert!(outcome.updated.is_empty());
    }

    #[test]
    fn test_prune_keeps_never_expiring_blocks() {
        let old = tracked("old", vec![None]);
        let new = tracked("new", vec![None]);
        let history = vec![old, new];
        assert!(prune(&history).is_noop());
    }

    #[test]
    fn test_prune_partial_reissues_same_id() {
        let old = tracked("old", vec![None, Some(1)]);
        let old_id = old.id.clone();
        let history = vec![old, tracked("new", vec![Some(5)])];

        let outcome = prune(&history);
        assert!(outcome.removed_ids.is_empty());
        assert_eq!(outcome.updated.len(), 1);

        let replacement = &outcome.updated[0];
        assert_eq!(replacement.id, old_id);
        assert_eq!(replacement.content.len(), 1);
        assert_eq!(replacement.content[0].as_text(), Some("old-0"));
        assert_eq!(replacement.retention, Some(vec![None]));
    }

    #[test]
    fn test_prune_index_counts_only_tracked_messages() {
        // An untracked message between two tracked ones does not advance the
        // retention index, so horizon 1 on the older tracked message expires
        // exactly as if the histories were adjacent.
        let old = tracked("old", vec![Some(1)]);
        let old_id = old.id.clone();
        let history = vec![old, Message::assistant("untracked"), tracked("new", vec![None])];

        let outcome = prune(&history);
        assert_eq!(outcome.removed_ids, vec![old_id]);
    }

    #[test]
    fn test_prune_is_idempotent() {
        let history = vec![
            tracked("a", vec![Some(1), None]),
            Message::user("plain"),
            tracked("b", vec![Some(1)]),
            tracked("c", vec![Some(3), Some(1)]),
        ];

        let first = prune(&history);
        let pruned = first.apply(history);
        let second = prune(&pruned);
        assert!(second.is_noop(), "second pass must change nothing");
    }

    #[test]
    fn test_apply_drops_tombstones_and_swaps_updates() {
        let a = tracked("a", vec![Some(1)]);
        let b = tracked("b", vec![None, Some(1)]);
        let c = tracked("c", vec![None]);
        let (a_id, b_id) = (a.id.clone(), b.id.clone());
        let history = vec![a, b, c];

        let outcome = prune(&history);
        let result = outcome.apply(history);

        assert!(result.iter().all(|m| m.id != a_id), "a fully expired");
        let b_after = result.iter().find(|m| m.id == b_id).unwrap();
        assert_eq!(b_after.content.len(), 1);
    }

    #[test]
    fn test_prune_short_retention_list_drops_unlisted_blocks() {
        let msg = Message::with_blocks(
            Role::User,
            vec![ContentBlock::text("listed"), ContentBlock::text("unlisted")],
        )
        .with_retention(vec![None]);
        let history = vec![msg];

        let outcome = prune(&history);
        assert_eq!(outcome.updated.len(), 1);
        assert_eq!(outcome.updated[0].content.len(), 1);
        assert_eq!(outcome.updated[0].content[0].as_text(), Some("listed"));
    }
}
