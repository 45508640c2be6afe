#[derive(Debug, Clone)]
pub enum SessionAction {
    // Connection
    Connect,
    Disconnect,

    // Conversation list
    SelectConversation {
        peer_address: String,
    },
    StartNewConversation,
    UpdateComposeRecipient {
        address: String,
    },

    // Messaging
    SendMessage {
        text: String,
    },
    CheckReachability {
        address: String,
    },

    // UI
    ClearNotice,
}

impl SessionAction {
    /// Log-safe action tag (never includes message bodies).
    pub fn tag(&self) -> &'static str {
        match self {
            // Connection
            SessionAction::Connect => "Connect",
            SessionAction::Disconnect => "Disconnect",

            // Conversation list
            SessionAction::SelectConversation { .. } => "SelectConversation",
            SessionAction::StartNewConversation => "StartNewConversation",
            SessionAction::UpdateComposeRecipient { .. } => "UpdateComposeRecipient",

            // Messaging
            SessionAction::SendMessage { .. } => "SendMessage",
            SessionAction::CheckReachability { .. } => "CheckReachability",

            // UI
            SessionAction::ClearNotice => "ClearNotice",
        }
    }
}
