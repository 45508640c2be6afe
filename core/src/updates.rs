use std::sync::Arc;

use crate::address::PeerAddress;
use crate::client::{ClientError, ConversationHandle, MessagingClient, RawMessage, WalletError, WalletSigner};
use crate::state::{
    ActiveSelection, ConnectionStatus, ConversationSummary, MessageEntry, SessionState,
};
use crate::SessionAction;

#[derive(Clone, Debug)]
pub enum SessionUpdate {
    FullState(SessionState),
    ConnectionChanged {
        rev: u64,
        connection: ConnectionStatus,
        local_address: Option<PeerAddress>,
    },
    ConversationsChanged {
        rev: u64,
        conversations: Vec<ConversationSummary>,
        total_unread: u32,
    },
    SelectionChanged {
        rev: u64,
        selection: ActiveSelection,
    },
    MessagesChanged {
        rev: u64,
        messages: Vec<MessageEntry>,
    },
    NoticeChanged {
        rev: u64,
        notice: Option<String>,
    },
    /// One-shot answer to `CheckReachability`; carries no state.
    ReachabilityChecked {
        rev: u64,
        address: String,
        reachable: bool,
    },
}

impl SessionUpdate {
    pub fn rev(&self) -> u64 {
        match self {
            SessionUpdate::FullState(s) => s.rev,
            SessionUpdate::ConnectionChanged { rev, .. } => *rev,
            SessionUpdate::ConversationsChanged { rev, .. } => *rev,
            SessionUpdate::SelectionChanged { rev, .. } => *rev,
            SessionUpdate::MessagesChanged { rev, .. } => *rev,
            SessionUpdate::NoticeChanged { rev, .. } => *rev,
            SessionUpdate::ReachabilityChecked { rev, .. } => *rev,
        }
    }
}

pub enum CoreMsg {
    Action(SessionAction),
    Internal(Box<InternalEvent>),
}

pub enum InternalEvent {
    // Connect flow
    WalletConnected {
        address: String,
        signer: Arc<dyn WalletSigner>,
    },
    WalletFailed {
        error: WalletError,
    },
    ClientReady {
        client: Arc<dyn MessagingClient>,
    },
    ClientInitFailed {
        error: ClientError,
    },
    AccountsChanged {
        accounts: Vec<String>,
    },

    // Bulk load results. `token` guards against results from a superseded
    // session landing after a reconnect.
    ConversationsLoaded {
        token: u64,
        conversations: Vec<(Arc<dyn ConversationHandle>, Option<RawMessage>)>,
    },
    ConversationsLoadFailed {
        token: u64,
        error: ClientError,
    },
    MessagesLoaded {
        generation: u64,
        peer: PeerAddress,
        history: Vec<RawMessage>,
    },
    MessagesLoadFailed {
        generation: u64,
        peer: PeerAddress,
        error: ClientError,
    },

    // Live stream events
    NewConversation {
        handle: Arc<dyn ConversationHandle>,
    },
    StreamMessage {
        generation: u64,
        raw: RawMessage,
    },
    StreamExhausted {
        label: &'static str,
    },

    // Async results
    ConversationCreated {
        // Compose generation at dispatch time; a mismatch on arrival means
        // the user navigated away while `new_conversation` was in flight.
        generation: u64,
        recipient: PeerAddress,
        local_id: String,
        text: String,
        result: Result<Arc<dyn ConversationHandle>, ClientError>,
    },
    RecipientUnreachable {
        recipient: PeerAddress,
        local_id: String,
    },
    SendResult {
        peer: PeerAddress,
        local_id: String,
        text: String,
        ok: bool,
        error: Option<String>,
    },
    ReachabilityResult {
        address: String,
        result: Result<bool, ClientError>,
    },
}

impl InternalEvent {
    /// Log-safe event tag; several variants carry trait objects, so this is
    /// also the `Debug` rendering.
    pub fn tag(&self) -> &'static str {
        match self {
            InternalEvent::WalletConnected { .. } => "WalletConnected",
            InternalEvent::WalletFailed { .. } => "WalletFailed",
            InternalEvent::ClientReady { .. } => "ClientReady",
            InternalEvent::ClientInitFailed { .. } => "ClientInitFailed",
            InternalEvent::AccountsChanged { .. } => "AccountsChanged",
            InternalEvent::ConversationsLoaded { .. } => "ConversationsLoaded",
            InternalEvent::ConversationsLoadFailed { .. } => "ConversationsLoadFailed",
            InternalEvent::MessagesLoaded { .. } => "MessagesLoaded",
            InternalEvent::MessagesLoadFailed { .. } => "MessagesLoadFailed",
            InternalEvent::NewConversation { .. } => "NewConversation",
            InternalEvent::StreamMessage { .. } => "StreamMessage",
            InternalEvent::StreamExhausted { .. } => "StreamExhausted",
            InternalEvent::ConversationCreated { .. } => "ConversationCreated",
            InternalEvent::RecipientUnreachable { .. } => "RecipientUnreachable",
            InternalEvent::SendResult { .. } => "SendResult",
            InternalEvent::ReachabilityResult { .. } => "ReachabilityResult",
        }
    }
}

impl std::fmt::Debug for InternalEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}
