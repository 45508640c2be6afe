//! External capabilities consumed by the session core.
//!
//! The wallet provider and messaging client are collaborators, not part of
//! this crate: they are injected as trait objects at handle construction and
//! substituted with in-memory fakes in tests. Nothing here touches session
//! state.

use std::sync::Arc;

use async_trait::async_trait;

/// Configuration forwarded verbatim to the messaging-client capability.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Network environment, e.g. `"production"`.
    pub env: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WalletError {
    #[error("no wallet detected")]
    Unavailable,
    #[error("wallet request rejected: {0}")]
    Rejected(String),
    #[error("wallet error: {0}")]
    Other(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientError {
    #[error("client create failed: {0}")]
    Init(String),
    #[error("fetch failed: {0}")]
    Load(String),
    #[error("send failed: {0}")]
    Send(String),
    #[error("subscribe failed: {0}")]
    Subscribe(String),
    #[error("reachability check failed: {0}")]
    Reachability(String),
    #[error("conversation create failed: {0}")]
    CreateConversation(String),
}

/// One message as delivered by the protocol network, before classification.
#[derive(Clone, Debug)]
pub struct RawMessage {
    /// Stream-assigned id; absent ids get a locally-generated one.
    pub id: Option<String>,
    pub sender_address: String,
    /// Peer address of the conversation this message belongs to, when the
    /// transport tags it. Falls back to the subscribed conversation's peer.
    pub conversation_peer: Option<String>,
    pub text: String,
    /// Unix seconds; absent timestamps fall back to arrival time.
    pub sent_at: Option<i64>,
}

/// Cancellation token for a live subscription. Cancels on drop; `cancel`
/// is explicit, consuming, and safe to call exactly once.
pub struct CancelHandle(Option<Box<dyn FnOnce() + Send>>);

impl CancelHandle {
    pub fn new(f: impl FnOnce() + Send + 'static) -> Self {
        Self(Some(Box::new(f)))
    }

    /// A handle that cancels nothing (for transports without teardown).
    pub fn noop() -> Self {
        Self(None)
    }

    pub fn cancel(mut self) {
        if let Some(f) = self.0.take() {
            f();
        }
    }
}

impl Drop for CancelHandle {
    fn drop(&mut self) {
        if let Some(f) = self.0.take() {
            f();
        }
    }
}

impl std::fmt::Debug for CancelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("CancelHandle")
            .field(&self.0.is_some())
            .finish()
    }
}

/// Opaque signing capability handed from the wallet to the messaging client.
/// The core only passes it through.
pub trait WalletSigner: Send + Sync {}

pub type AccountsCallback = Box<dyn Fn(Vec<String>) + Send + Sync>;
pub type ConversationCallback = Box<dyn Fn(Arc<dyn ConversationHandle>) + Send + Sync>;
pub type MessageCallback = Box<dyn Fn(RawMessage) + Send + Sync>;

#[async_trait]
pub trait WalletProvider: Send + Sync {
    async fn request_accounts(&self) -> Result<Vec<String>, WalletError>;

    async fn signer(&self) -> Result<Arc<dyn WalletSigner>, WalletError>;

    /// Account-change notification stream. The callback receives the full
    /// account list on every change (empty list = wallet disconnected).
    fn subscribe_accounts(&self, on_change: AccountsCallback) -> CancelHandle;
}

#[async_trait]
pub trait MessagingProvider: Send + Sync {
    async fn create(
        &self,
        signer: Arc<dyn WalletSigner>,
        config: &ClientConfig,
    ) -> Result<Arc<dyn MessagingClient>, ClientError>;
}

#[async_trait]
pub trait MessagingClient: Send + Sync {
    async fn list_conversations(&self) -> Result<Vec<Arc<dyn ConversationHandle>>, ClientError>;

    /// Whether the given address has initialized the protocol and can
    /// receive messages.
    async fn can_message(&self, address: &str) -> Result<bool, ClientError>;

    async fn new_conversation(
        &self,
        address: &str,
    ) -> Result<Arc<dyn ConversationHandle>, ClientError>;

    async fn stream_conversations(
        &self,
        on_new: ConversationCallback,
    ) -> Result<CancelHandle, ClientError>;
}

#[async_trait]
pub trait ConversationHandle: Send + Sync {
    fn peer_address(&self) -> String;

    /// Fetch history, newest-last. `limit` bounds the fetch from the most
    /// recent message backwards; `None` fetches the full history.
    async fn fetch_messages(&self, limit: Option<u32>) -> Result<Vec<RawMessage>, ClientError>;

    async fn send(&self, text: &str) -> Result<(), ClientError>;

    async fn stream_messages(&self, on_message: MessageCallback)
        -> Result<CancelHandle, ClientError>;
}
