//! In-memory conversation list: one summary per peer address.
//!
//! Owns dedup, ordering and preview/unread derivation. Keys are always
//! canonical [`PeerAddress`] values; callers normalize before touching the
//! index, and malformed network addresses are dropped at the call site.

use std::collections::HashMap;

use crate::address::PeerAddress;
use crate::state::ConversationSummary;

/// Display bound for previews. Longer bodies keep the first
/// `PREVIEW_KEEP_CHARS` characters plus an ellipsis.
pub const PREVIEW_MAX_CHARS: usize = 30;
const PREVIEW_KEEP_CHARS: usize = 27;

pub const EMPTY_PREVIEW: &str = "No messages yet";
pub const NEW_CONVERSATION_PREVIEW: &str = "New conversation";

/// One raw conversation produced by the bulk load, already normalized.
#[derive(Clone, Debug)]
pub struct LoadedConversation {
    pub peer_address: PeerAddress,
    pub preview: Option<String>,
    pub last_activity_at: Option<i64>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    AlreadyPresent,
}

#[derive(Default)]
pub struct ConversationIndex {
    by_peer: HashMap<PeerAddress, ConversationSummary>,
    // Descending by last_activity_at; ties keep their previous relative order.
    order: Vec<PeerAddress>,
}

impl ConversationIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn contains(&self, peer: &PeerAddress) -> bool {
        self.by_peer.contains_key(peer)
    }

    pub fn get(&self, peer: &PeerAddress) -> Option<&ConversationSummary> {
        self.by_peer.get(peer)
    }

    /// Ordered view of the index, most recent activity first.
    pub fn snapshot(&self) -> Vec<ConversationSummary> {
        self.order
            .iter()
            .filter_map(|p| self.by_peer.get(p))
            .cloned()
            .collect()
    }

    /// Replace the index wholesale from a bulk load.
    ///
    /// Colliding entries for one peer keep the strictly newer timestamp;
    /// equal timestamps keep the entry already present (stability). Unread
    /// counts reset: a bulk load establishes a fresh baseline.
    pub fn bulk_load(&mut self, rows: Vec<LoadedConversation>) {
        self.by_peer.clear();
        self.order.clear();

        let now = crate::state::now_seconds();
        for row in rows {
            let preview = match row.preview {
                Some(ref text) if !text.is_empty() => truncate_preview(text),
                _ => EMPTY_PREVIEW.to_string(),
            };
            let last_activity_at = row.last_activity_at.unwrap_or(now);

            match self.by_peer.get(&row.peer_address) {
                Some(existing) if last_activity_at <= existing.last_activity_at => {}
                _ => {
                    if !self.by_peer.contains_key(&row.peer_address) {
                        self.order.push(row.peer_address.clone());
                    }
                    self.by_peer.insert(
                        row.peer_address.clone(),
                        ConversationSummary {
                            peer_address: row.peer_address,
                            preview,
                            last_activity_at,
                            unread_count: 0,
                        },
                    );
                }
            }
        }
        self.resort();
    }

    /// Idempotent insert for a peer first observed on the conversations
    /// stream. Returns whether a summary was actually created so the caller
    /// can notify exactly once per peer.
    pub fn upsert_from_new_conversation(&mut self, peer: PeerAddress) -> UpsertOutcome {
        if self.by_peer.contains_key(&peer) {
            return UpsertOutcome::AlreadyPresent;
        }
        self.by_peer.insert(
            peer.clone(),
            ConversationSummary {
                peer_address: peer.clone(),
                preview: NEW_CONVERSATION_PREVIEW.to_string(),
                last_activity_at: crate::state::now_seconds(),
                unread_count: 0,
            },
        );
        self.order.insert(0, peer);
        self.resort();
        UpsertOutcome::Inserted
    }

    /// Update preview and activity timestamp for a peer, then re-sort.
    /// Returns false (and leaves the index untouched) for unknown peers.
    pub fn apply_message_touch(&mut self, peer: &PeerAddress, text: &str, timestamp: i64) -> bool {
        let Some(summary) = self.by_peer.get_mut(peer) else {
            tracing::debug!(%peer, "message touch for unknown peer dropped");
            return false;
        };
        summary.preview = if text.is_empty() {
            EMPTY_PREVIEW.to_string()
        } else {
            truncate_preview(text)
        };
        summary.last_activity_at = timestamp;
        self.resort();
        true
    }

    pub fn increment_unread(&mut self, peer: &PeerAddress) -> bool {
        match self.by_peer.get_mut(peer) {
            Some(summary) => {
                summary.unread_count += 1;
                true
            }
            None => false,
        }
    }

    pub fn reset_unread(&mut self, peer: &PeerAddress) -> bool {
        match self.by_peer.get_mut(peer) {
            Some(summary) => {
                summary.unread_count = 0;
                true
            }
            None => false,
        }
    }

    pub fn total_unread(&self) -> u32 {
        self.by_peer.values().map(|s| s.unread_count).sum()
    }

    pub fn first_peer(&self) -> Option<&PeerAddress> {
        self.order.first()
    }

    pub fn clear(&mut self) {
        self.by_peer.clear();
        self.order.clear();
    }

    fn resort(&mut self) {
        let by_peer = &self.by_peer;
        // Stable sort: equal timestamps preserve previous relative order.
        self.order.sort_by_key(|p| {
            std::cmp::Reverse(by_peer.get(p).map(|s| s.last_activity_at).unwrap_or(0))
        });
    }
}

/// Bound a message body for list display: bodies longer than
/// `PREVIEW_MAX_CHARS` keep the first `PREVIEW_KEEP_CHARS` characters plus
/// an ellipsis; shorter bodies are stored unmodified.
pub fn truncate_preview(text: &str) -> String {
    if text.chars().count() > PREVIEW_MAX_CHARS {
        let head: String = text.chars().take(PREVIEW_KEEP_CHARS).collect();
        format!("{head}...")
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::normalize;

    fn peer(n: u8) -> PeerAddress {
        normalize(&format!("0x{:040x}", n as u64)).unwrap()
    }

    fn row(n: u8, preview: &str, ts: i64) -> LoadedConversation {
        LoadedConversation {
            peer_address: peer(n),
            preview: Some(preview.to_string()),
            last_activity_at: Some(ts),
        }
    }

    #[test]
    fn bulk_load_dedups_colliding_peers_keeping_newer() {
        let mut index = ConversationIndex::new();
        index.bulk_load(vec![row(1, "older", 100), row(1, "newer", 200)]);

        assert_eq!(index.len(), 1);
        assert_eq!(index.snapshot()[0].preview, "newer");
        assert_eq!(index.snapshot()[0].last_activity_at, 200);
    }

    #[test]
    fn bulk_load_equal_timestamps_keep_existing_entry() {
        let mut index = ConversationIndex::new();
        index.bulk_load(vec![row(1, "first", 100), row(1, "second", 100)]);

        assert_eq!(index.len(), 1);
        assert_eq!(index.snapshot()[0].preview, "first");
    }

    #[test]
    fn bulk_load_sorts_descending_by_activity() {
        let mut index = ConversationIndex::new();
        index.bulk_load(vec![row(1, "a", 100), row(2, "b", 300), row(3, "c", 200)]);

        let peers: Vec<_> = index.snapshot().iter().map(|s| s.peer_address.clone()).collect();
        assert_eq!(peers, vec![peer(2), peer(3), peer(1)]);
    }

    #[test]
    fn bulk_load_without_message_uses_sentinel_preview() {
        let mut index = ConversationIndex::new();
        index.bulk_load(vec![LoadedConversation {
            peer_address: peer(1),
            preview: None,
            last_activity_at: None,
        }]);
        assert_eq!(index.snapshot()[0].preview, EMPTY_PREVIEW);
    }

    #[test]
    fn bulk_load_replaces_index_wholesale() {
        let mut index = ConversationIndex::new();
        index.bulk_load(vec![row(1, "a", 100), row(2, "b", 200)]);
        index.bulk_load(vec![row(3, "c", 300)]);

        assert_eq!(index.len(), 1);
        assert!(index.contains(&peer(3)));
        assert!(!index.contains(&peer(1)));
    }

    #[test]
    fn upsert_is_idempotent() {
        let mut index = ConversationIndex::new();
        assert_eq!(
            index.upsert_from_new_conversation(peer(1)),
            UpsertOutcome::Inserted
        );
        assert_eq!(
            index.upsert_from_new_conversation(peer(1)),
            UpsertOutcome::AlreadyPresent
        );
        assert_eq!(index.len(), 1);
        assert_eq!(index.snapshot()[0].preview, NEW_CONVERSATION_PREVIEW);
    }

    #[test]
    fn message_touch_updates_preview_and_reorders() {
        let mut index = ConversationIndex::new();
        index.bulk_load(vec![row(1, "a", 100), row(2, "b", 200)]);

        assert!(index.apply_message_touch(&peer(1), "hello there", 300));
        let snapshot = index.snapshot();
        assert_eq!(snapshot[0].peer_address, peer(1));
        assert_eq!(snapshot[0].preview, "hello there");
        assert_eq!(snapshot[0].last_activity_at, 300);
    }

    #[test]
    fn message_touch_for_unknown_peer_is_dropped() {
        let mut index = ConversationIndex::new();
        index.bulk_load(vec![row(1, "a", 100)]);
        assert!(!index.apply_message_touch(&peer(9), "x", 500));
        assert_eq!(index.snapshot()[0].preview, "a");
    }

    #[test]
    fn touch_ties_preserve_previous_relative_order() {
        let mut index = ConversationIndex::new();
        index.bulk_load(vec![row(1, "a", 100), row(2, "b", 100), row(3, "c", 100)]);
        let before: Vec<_> = index.snapshot().iter().map(|s| s.peer_address.clone()).collect();
        // Touch with an equal timestamp: order must not change.
        assert!(index.apply_message_touch(&before[1], "still b", 100));
        let after: Vec<_> = index.snapshot().iter().map(|s| s.peer_address.clone()).collect();
        assert_eq!(before, after);
    }

    #[test]
    fn unread_counters_roundtrip_and_total_matches() {
        let mut index = ConversationIndex::new();
        index.bulk_load(vec![row(1, "a", 100), row(2, "b", 200)]);

        assert!(index.increment_unread(&peer(1)));
        assert!(index.increment_unread(&peer(1)));
        assert!(index.increment_unread(&peer(2)));
        assert_eq!(index.get(&peer(1)).unwrap().unread_count, 2);
        assert_eq!(index.total_unread(), 3);

        assert!(index.reset_unread(&peer(1)));
        assert_eq!(index.get(&peer(1)).unwrap().unread_count, 0);
        assert_eq!(index.total_unread(), 1);

        assert!(!index.increment_unread(&peer(9)));
        assert!(!index.reset_unread(&peer(9)));
    }

    #[test]
    fn preview_truncation_bounds() {
        let forty = "a".repeat(40);
        let expected = format!("{}...", "a".repeat(27));
        assert_eq!(truncate_preview(&forty), expected);

        let thirty = "b".repeat(30);
        assert_eq!(truncate_preview(&thirty), thirty);

        assert_eq!(truncate_preview("short"), "short");
    }
}
