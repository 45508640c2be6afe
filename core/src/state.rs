use crate::address::PeerAddress;

/// Connection lifecycle of the session, from wallet handshake through
/// messaging-client readiness.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub enum ConnectionStatus {
    Disconnected,
    ConnectingWallet,
    WalletConnected,
    InitializingProtocol,
    Ready,
    Failed,
}

/// Which conversation (if any) the message log is attached to.
///
/// Exactly one mode holds at any time. `Composing` carries the typed
/// recipient text so `SendMessage` itself only needs the message body.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub enum ActiveSelection {
    None,
    Existing { peer_address: PeerAddress },
    Composing { recipient: String },
}

impl ActiveSelection {
    pub fn active_peer(&self) -> Option<&PeerAddress> {
        match self {
            ActiveSelection::Existing { peer_address } => Some(peer_address),
            _ => None,
        }
    }

    pub fn is_composing(&self) -> bool {
        matches!(self, ActiveSelection::Composing { .. })
    }
}

/// One row of the conversation list. Handles to the underlying protocol
/// sessions live in the actor's session map, not in this snapshot value.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub struct ConversationSummary {
    pub peer_address: PeerAddress,
    pub preview: String,
    pub last_activity_at: i64,
    pub unread_count: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub enum Direction {
    Outgoing,
    Incoming,
}

#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub enum DeliveryState {
    Pending,
    Sent,
    Failed { reason: String },
}

#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub struct MessageEntry {
    pub id: String,
    pub text: String,
    pub direction: Direction,
    pub sent_at: i64,
    pub display_time: String,
    pub delivery: DeliveryState,
}

/// Full snapshot owned by the session actor and mirrored into the shared
/// lock for synchronous `state()` reads.
#[derive(Clone, Debug, serde::Serialize)]
pub struct SessionState {
    pub rev: u64,
    pub connection: ConnectionStatus,
    pub local_address: Option<PeerAddress>,
    pub conversations: Vec<ConversationSummary>,
    pub selection: ActiveSelection,
    pub messages: Vec<MessageEntry>,
    pub total_unread: u32,
    pub notice: Option<String>,
}

impl SessionState {
    pub fn empty() -> Self {
        Self {
            rev: 0,
            connection: ConnectionStatus::Disconnected,
            local_address: None,
            conversations: vec![],
            selection: ActiveSelection::None,
            messages: vec![],
            total_unread: 0,
            notice: None,
        }
    }
}

pub fn now_seconds() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

/// Derived display timestamp, e.g. `14:03:59 05/27/2026`.
pub fn format_display_time(sent_at: i64) -> String {
    chrono::DateTime::from_timestamp(sent_at, 0)
        .map(|dt| dt.format("%H:%M:%S %m/%d/%Y").to_string())
        .unwrap_or_default()
}
