//! In-memory fakes for the wallet and messaging capabilities, plus small
//! polling helpers shared by the integration tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use courier_core::client::{
    AccountsCallback, CancelHandle, ClientConfig, ClientError, ConversationCallback,
    ConversationHandle, MessageCallback, MessagingClient, MessagingProvider, RawMessage,
    WalletError, WalletProvider, WalletSigner,
};
use courier_core::{SessionReconciler, SessionUpdate};

// EIP-55 reference addresses, reused as test identities.
pub const ME: &str = "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed";
pub const ALICE: &str = "0xfB6916095ca1df60bB79Ce92cE3Ea74c37c5d359";
pub const BOB: &str = "0xdbF03B407c01E7cD3CBea99509d93f8DDDC8C6FB";

pub fn wait_until(what: &str, timeout: Duration, mut f: impl FnMut() -> bool) {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if f() {
            return;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    panic!("{what}: condition not met within {timeout:?}");
}

pub fn raw_message(id: &str, sender: &str, text: &str, sent_at: i64) -> RawMessage {
    RawMessage {
        id: Some(id.to_string()),
        sender_address: sender.to_string(),
        conversation_peer: None,
        text: text.to_string(),
        sent_at: Some(sent_at),
    }
}

pub struct TestReconciler {
    updates: Arc<Mutex<Vec<SessionUpdate>>>,
}

impl TestReconciler {
    pub fn new() -> (Self, Arc<Mutex<Vec<SessionUpdate>>>) {
        let updates = Arc::new(Mutex::new(vec![]));
        (
            Self {
                updates: updates.clone(),
            },
            updates,
        )
    }
}

impl SessionReconciler for TestReconciler {
    fn reconcile(&self, update: SessionUpdate) {
        self.updates.lock().unwrap().push(update);
    }
}

// ----- wallet -----

struct FakeSigner;

impl WalletSigner for FakeSigner {}

pub struct FakeWallet {
    accounts: Mutex<Vec<String>>,
    error: Mutex<Option<WalletError>>,
    accounts_cb: Arc<Mutex<Option<AccountsCallback>>>,
}

impl FakeWallet {
    pub fn new(address: &str) -> Arc<Self> {
        Arc::new(Self {
            accounts: Mutex::new(vec![address.to_string()]),
            error: Mutex::new(None),
            accounts_cb: Arc::new(Mutex::new(None)),
        })
    }

    pub fn failing(error: WalletError) -> Arc<Self> {
        Arc::new(Self {
            accounts: Mutex::new(vec![]),
            error: Mutex::new(Some(error)),
            accounts_cb: Arc::new(Mutex::new(None)),
        })
    }

    /// Simulate the wallet switching (or dropping) accounts: updates the
    /// account list and fires the subscribed callback.
    pub fn change_accounts(&self, accounts: Vec<String>) {
        *self.accounts.lock().unwrap() = accounts.clone();
        if let Some(cb) = self.accounts_cb.lock().unwrap().as_ref() {
            cb(accounts);
        }
    }
}

#[async_trait]
impl WalletProvider for FakeWallet {
    async fn request_accounts(&self) -> Result<Vec<String>, WalletError> {
        if let Some(e) = self.error.lock().unwrap().clone() {
            return Err(e);
        }
        Ok(self.accounts.lock().unwrap().clone())
    }

    async fn signer(&self) -> Result<Arc<dyn WalletSigner>, WalletError> {
        if let Some(e) = self.error.lock().unwrap().clone() {
            return Err(e);
        }
        Ok(Arc::new(FakeSigner))
    }

    fn subscribe_accounts(&self, on_change: AccountsCallback) -> CancelHandle {
        *self.accounts_cb.lock().unwrap() = Some(on_change);
        let slot = self.accounts_cb.clone();
        CancelHandle::new(move || {
            *slot.lock().unwrap() = None;
        })
    }
}

// ----- conversations -----

pub struct FakeConversation {
    peer: String,
    history: Mutex<Vec<RawMessage>>,
    sent: Mutex<Vec<String>>,
    send_error: Mutex<Option<ClientError>>,
    // Kept across cancel: a real transport can deliver a few more events
    // after unsubscribe, which is exactly what the core must tolerate.
    message_cb: Mutex<Option<MessageCallback>>,
    stream_cancels: Arc<AtomicUsize>,
}

impl FakeConversation {
    pub fn new(peer: &str) -> Arc<Self> {
        Arc::new(Self {
            peer: peer.to_string(),
            history: Mutex::new(vec![]),
            sent: Mutex::new(vec![]),
            send_error: Mutex::new(None),
            message_cb: Mutex::new(None),
            stream_cancels: Arc::new(AtomicUsize::new(0)),
        })
    }

    pub fn with_history(peer: &str, history: Vec<RawMessage>) -> Arc<Self> {
        let conv = Self::new(peer);
        *conv.history.lock().unwrap() = history;
        conv
    }

    pub fn set_send_error(&self, error: ClientError) {
        *self.send_error.lock().unwrap() = Some(error);
    }

    pub fn stream_cancel_count(&self) -> usize {
        self.stream_cancels.load(Ordering::SeqCst)
    }

    pub fn has_subscriber(&self) -> bool {
        self.message_cb.lock().unwrap().is_some()
    }

    pub fn sent_texts(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }

    /// Push one message through the live stream callback. Returns false when
    /// nobody ever subscribed.
    pub fn deliver(&self, raw: RawMessage) -> bool {
        match self.message_cb.lock().unwrap().as_ref() {
            Some(cb) => {
                cb(raw);
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl ConversationHandle for FakeConversation {
    fn peer_address(&self) -> String {
        self.peer.clone()
    }

    async fn fetch_messages(&self, limit: Option<u32>) -> Result<Vec<RawMessage>, ClientError> {
        let history = self.history.lock().unwrap().clone();
        Ok(match limit {
            Some(n) => {
                let n = n as usize;
                let skip = history.len().saturating_sub(n);
                history.into_iter().skip(skip).collect()
            }
            None => history,
        })
    }

    async fn send(&self, text: &str) -> Result<(), ClientError> {
        if let Some(e) = self.send_error.lock().unwrap().clone() {
            return Err(e);
        }
        self.sent.lock().unwrap().push(text.to_string());
        Ok(())
    }

    async fn stream_messages(
        &self,
        on_message: MessageCallback,
    ) -> Result<CancelHandle, ClientError> {
        *self.message_cb.lock().unwrap() = Some(on_message);
        let cancels = self.stream_cancels.clone();
        Ok(CancelHandle::new(move || {
            cancels.fetch_add(1, Ordering::SeqCst);
        }))
    }
}

// ----- client / provider -----

pub struct FakeClient {
    conversations: Mutex<Vec<Arc<FakeConversation>>>,
    reachability: Mutex<HashMap<String, bool>>,
    can_message_queries: Mutex<Vec<String>>,
    conversation_cb: Mutex<Option<ConversationCallback>>,
    // While set, new_conversation blocks; lets tests interleave other
    // actions with an in-flight creation.
    new_conversation_hold: AtomicBool,
}

impl FakeClient {
    pub fn new(conversations: Vec<Arc<FakeConversation>>) -> Arc<Self> {
        Arc::new(Self {
            conversations: Mutex::new(conversations),
            reachability: Mutex::new(HashMap::new()),
            can_message_queries: Mutex::new(vec![]),
            conversation_cb: Mutex::new(None),
            new_conversation_hold: AtomicBool::new(false),
        })
    }

    pub fn hold_new_conversation(&self) {
        self.new_conversation_hold.store(true, Ordering::SeqCst);
    }

    pub fn release_new_conversation(&self) {
        self.new_conversation_hold.store(false, Ordering::SeqCst);
    }

    pub fn set_reachable(&self, address: &str, reachable: bool) {
        self.reachability
            .lock()
            .unwrap()
            .insert(address.to_string(), reachable);
    }

    pub fn can_message_queries(&self) -> Vec<String> {
        self.can_message_queries.lock().unwrap().clone()
    }

    pub fn conversations_streaming(&self) -> bool {
        self.conversation_cb.lock().unwrap().is_some()
    }

    pub fn conversation_for(&self, peer: &str) -> Option<Arc<FakeConversation>> {
        self.conversations
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.peer.eq_ignore_ascii_case(peer))
            .cloned()
    }

    pub fn conversation_count(&self) -> usize {
        self.conversations.lock().unwrap().len()
    }

    /// Simulate a remote peer opening a conversation: registers it and fires
    /// the conversations-stream callback.
    pub fn announce_conversation(&self, conv: Arc<FakeConversation>) -> bool {
        self.conversations.lock().unwrap().push(conv.clone());
        match self.conversation_cb.lock().unwrap().as_ref() {
            Some(cb) => {
                cb(conv);
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl MessagingClient for FakeClient {
    async fn list_conversations(&self) -> Result<Vec<Arc<dyn ConversationHandle>>, ClientError> {
        Ok(self
            .conversations
            .lock()
            .unwrap()
            .iter()
            .map(|c| c.clone() as Arc<dyn ConversationHandle>)
            .collect())
    }

    async fn can_message(&self, address: &str) -> Result<bool, ClientError> {
        self.can_message_queries
            .lock()
            .unwrap()
            .push(address.to_string());
        Ok(*self
            .reachability
            .lock()
            .unwrap()
            .get(address)
            .unwrap_or(&true))
    }

    async fn new_conversation(
        &self,
        address: &str,
    ) -> Result<Arc<dyn ConversationHandle>, ClientError> {
        while self.new_conversation_hold.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let conv = FakeConversation::new(address);
        self.conversations.lock().unwrap().push(conv.clone());
        Ok(conv)
    }

    async fn stream_conversations(
        &self,
        on_new: ConversationCallback,
    ) -> Result<CancelHandle, ClientError> {
        *self.conversation_cb.lock().unwrap() = Some(on_new);
        Ok(CancelHandle::noop())
    }
}

pub struct FakeProvider {
    pub client: Arc<FakeClient>,
    error: Mutex<Option<ClientError>>,
}

impl FakeProvider {
    pub fn new(client: Arc<FakeClient>) -> Arc<Self> {
        Arc::new(Self {
            client,
            error: Mutex::new(None),
        })
    }

    pub fn failing(client: Arc<FakeClient>, error: ClientError) -> Arc<Self> {
        let provider = Self::new(client);
        *provider.error.lock().unwrap() = Some(error);
        provider
    }
}

#[async_trait]
impl MessagingProvider for FakeProvider {
    async fn create(
        &self,
        _signer: Arc<dyn WalletSigner>,
        _config: &ClientConfig,
    ) -> Result<Arc<dyn MessagingClient>, ClientError> {
        if let Some(e) = self.error.lock().unwrap().clone() {
            return Err(e);
        }
        Ok(self.client.clone() as Arc<dyn MessagingClient>)
    }
}
