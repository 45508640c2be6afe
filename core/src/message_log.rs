//! Ordered message sequence for the single currently attached conversation.
//!
//! Entries append in arrival order and are never re-sorted, so out-of-order
//! transport delivery shows up in display order as delivered. The log is
//! swapped wholesale on selection change, never merged across conversations.

use uuid::Uuid;

use crate::address::PeerAddress;
use crate::client::RawMessage;
use crate::state::{format_display_time, DeliveryState, Direction, MessageEntry};

/// How long after an optimistic send an authoritative outgoing echo with the
/// same body is treated as the same message and replaces it in place.
pub const ECHO_WINDOW_SECS: i64 = 60;

const LOCAL_ID_PREFIX: &str = "local-";

#[derive(Default)]
pub struct MessageLog {
    attached: Option<PeerAddress>,
    entries: Vec<MessageEntry>,
}

impl MessageLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attached_peer(&self) -> Option<&PeerAddress> {
        self.attached.as_ref()
    }

    pub fn entries(&self) -> &[MessageEntry] {
        &self.entries
    }

    /// Wholesale swap on selection change. Raw entries without content are
    /// discarded; direction is classified against the local identity.
    ///
    /// Local entries not yet acknowledged as sent survive the swap: a send
    /// dispatched while the history fetch was in flight must not vanish from
    /// display. Survivors already echoed in the fetched history (same
    /// trimmed body, outgoing, within [`ECHO_WINDOW_SECS`]) are dropped in
    /// favor of the authoritative entry.
    pub fn replace_for(
        &mut self,
        peer: PeerAddress,
        local_identity: &PeerAddress,
        history: Vec<RawMessage>,
    ) {
        self.attached = Some(peer);
        let in_flight: Vec<MessageEntry> = self
            .entries
            .drain(..)
            .filter(|e| e.id.starts_with(LOCAL_ID_PREFIX) && e.delivery != DeliveryState::Sent)
            .collect();

        self.entries = history
            .into_iter()
            .filter(|raw| !raw.text.is_empty())
            .map(|raw| entry_from_raw(raw, local_identity))
            .collect();

        for entry in in_flight {
            let echoed = self.entries.iter().any(|e| {
                e.direction == Direction::Outgoing
                    && e.text.trim() == entry.text.trim()
                    && (e.sent_at - entry.sent_at).abs() <= ECHO_WINDOW_SECS
            });
            if !echoed {
                self.entries.push(entry);
            }
        }
    }

    /// Attach to a conversation with no history yet (newly created).
    /// Optimistic entries already present are kept.
    pub fn attach_empty(&mut self, peer: PeerAddress) {
        self.attached = Some(peer);
    }

    pub fn clear(&mut self) {
        self.attached = None;
        self.entries.clear();
    }

    /// Immediately visible local echo, before the network acknowledges.
    pub fn append_optimistic(&mut self, text: &str, now: i64) -> MessageEntry {
        let entry = MessageEntry {
            id: format!("{LOCAL_ID_PREFIX}{}", Uuid::new_v4()),
            text: text.to_string(),
            direction: Direction::Outgoing,
            sent_at: now,
            display_time: format_display_time(now),
            delivery: DeliveryState::Pending,
        };
        self.entries.push(entry.clone());
        entry
    }

    /// Append a stream-delivered entry.
    ///
    /// An outgoing entry that matches a still-local optimistic echo (same
    /// trimmed body, sent within [`ECHO_WINDOW_SECS`]) replaces that entry in
    /// place instead of appending, so a locally-originated message appears
    /// exactly once in steady state. Returns true when a replacement
    /// happened.
    pub fn append_authoritative(
        &mut self,
        raw: RawMessage,
        local_identity: &PeerAddress,
    ) -> bool {
        if raw.text.is_empty() {
            return false;
        }
        let entry = entry_from_raw(raw, local_identity);

        if entry.direction == Direction::Outgoing {
            let echo_of = self.entries.iter().position(|e| {
                e.id.starts_with(LOCAL_ID_PREFIX)
                    && e.text.trim() == entry.text.trim()
                    && (entry.sent_at - e.sent_at).abs() <= ECHO_WINDOW_SECS
            });
            if let Some(i) = echo_of {
                self.entries[i] = MessageEntry {
                    delivery: DeliveryState::Sent,
                    ..entry
                };
                return true;
            }
        }

        self.entries.push(entry);
        false
    }

    pub fn mark_sent(&mut self, local_id: &str) {
        if let Some(e) = self.entries.iter_mut().find(|e| e.id == local_id) {
            if e.delivery == DeliveryState::Pending {
                e.delivery = DeliveryState::Sent;
            }
        }
    }

    pub fn mark_failed(&mut self, local_id: &str, reason: String) {
        if let Some(e) = self.entries.iter_mut().find(|e| e.id == local_id) {
            e.delivery = DeliveryState::Failed { reason };
        }
    }
}

fn entry_from_raw(raw: RawMessage, local_identity: &PeerAddress) -> MessageEntry {
    let direction = match crate::address::normalize(&raw.sender_address) {
        Ok(sender) if &sender == local_identity => Direction::Outgoing,
        _ => Direction::Incoming,
    };
    let sent_at = raw.sent_at.unwrap_or_else(crate::state::now_seconds);
    MessageEntry {
        id: raw
            .id
            .unwrap_or_else(|| format!("{LOCAL_ID_PREFIX}{}", Uuid::new_v4())),
        text: raw.text,
        direction,
        sent_at,
        display_time: format_display_time(sent_at),
        delivery: DeliveryState::Sent,
    }
}
