use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use flume::Sender;

use crate::actions::SessionAction;
use crate::address::{self, PeerAddress};
use crate::client::{
    ClientConfig, ClientError, ConversationHandle, MessagingClient, MessagingProvider, RawMessage,
    WalletError, WalletProvider, WalletSigner,
};
use crate::config::{load_session_config, SessionConfig};
use crate::error::SessionError;
use crate::index::{ConversationIndex, LoadedConversation, UpsertOutcome};
use crate::message_log::MessageLog;
use crate::state::{now_seconds, ActiveSelection, ConnectionStatus, SessionState};
use crate::stream::{StreamSupervisor, SubscribeFn};
use crate::updates::{CoreMsg, InternalEvent, SessionUpdate};

/// Bound on the message body shown inside an incoming-message notice.
const NOTICE_PREVIEW_MAX_CHARS: usize = 20;

const CONVERSATIONS_STREAM: &str = "conversations";
const MESSAGES_STREAM: &str = "messages";

/// Live protocol resources for one connected identity. Dropped wholesale on
/// disconnect; nothing in here survives a teardown.
struct Session {
    client: Arc<dyn MessagingClient>,
    // peer -> protocol conversation, populated by the bulk load and by
    // stream/create events. Handles never appear in state snapshots.
    handles: HashMap<PeerAddress, Arc<dyn ConversationHandle>>,
    accounts_watch: Option<crate::client::CancelHandle>,
    conversations_supervisor: Option<StreamSupervisor>,
    messages_supervisor: Option<StreamSupervisor>,
}

pub struct SessionCore {
    pub state: SessionState,
    rev: u64,

    update_sender: Sender<SessionUpdate>,
    core_sender: Sender<CoreMsg>,
    shared_state: Arc<RwLock<SessionState>>,

    config: SessionConfig,
    runtime: tokio::runtime::Runtime,

    wallet: Arc<dyn WalletProvider>,
    provider: Arc<dyn MessagingProvider>,

    session: Option<Session>,
    index: ConversationIndex,
    log: MessageLog,

    // Guards against results of a superseded bulk load landing after a
    // reconnect.
    load_token: u64,
    // Message-stream generation. Bumped on every selection change and
    // teardown; events tagged with an older generation are discarded.
    msg_stream_gen: u64,
}

impl SessionCore {
    pub fn new(
        update_sender: Sender<SessionUpdate>,
        core_sender: Sender<CoreMsg>,
        data_dir: String,
        shared_state: Arc<RwLock<SessionState>>,
        wallet: Arc<dyn WalletProvider>,
        provider: Arc<dyn MessagingProvider>,
    ) -> Self {
        let config = load_session_config(&data_dir);

        // Time only: the core does no direct I/O, the injected capabilities
        // own their transports.
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_time()
            .build()
            .expect("tokio runtime");

        let this = Self {
            state: SessionState::empty(),
            rev: 0,
            update_sender,
            core_sender,
            shared_state,
            config,
            runtime,
            wallet,
            provider,
            session: None,
            index: ConversationIndex::new(),
            log: MessageLog::new(),
            load_token: 0,
            msg_stream_gen: 0,
        };

        // Ensure SessionHandle.state() has an immediately-available snapshot.
        this.commit_state();
        this
    }

    fn next_rev(&mut self) -> u64 {
        self.rev += 1;
        self.state.rev = self.rev;
        self.rev
    }

    fn emit(&mut self, update: SessionUpdate) {
        self.commit_state();
        let _ = self.update_sender.send(update);
    }

    fn commit_state(&self) {
        let snapshot = self.state.clone();
        match self.shared_state.write() {
            Ok(mut g) => *g = snapshot,
            Err(poison) => *poison.into_inner() = snapshot,
        }
    }

    fn emit_connection(&mut self) {
        let rev = self.next_rev();
        self.emit(SessionUpdate::ConnectionChanged {
            rev,
            connection: self.state.connection.clone(),
            local_address: self.state.local_address.clone(),
        });
    }

    fn emit_conversations(&mut self) {
        let rev = self.next_rev();
        self.emit(SessionUpdate::ConversationsChanged {
            rev,
            conversations: self.state.conversations.clone(),
            total_unread: self.state.total_unread,
        });
    }

    fn emit_selection(&mut self) {
        let rev = self.next_rev();
        self.emit(SessionUpdate::SelectionChanged {
            rev,
            selection: self.state.selection.clone(),
        });
    }

    fn emit_messages(&mut self) {
        let rev = self.next_rev();
        self.emit(SessionUpdate::MessagesChanged {
            rev,
            messages: self.state.messages.clone(),
        });
    }

    fn emit_notice(&mut self) {
        let rev = self.next_rev();
        self.emit(SessionUpdate::NoticeChanged {
            rev,
            notice: self.state.notice.clone(),
        });
    }

    fn notice(&mut self, msg: impl Into<String>) {
        // Kept in state until explicitly cleared, so state() snapshots always
        // contain the latest notice.
        self.state.notice = Some(msg.into());
        self.emit_notice();
    }

    fn sync_conversations(&mut self) {
        self.state.conversations = self.index.snapshot();
        self.state.total_unread = self.index.total_unread();
        self.emit_conversations();
    }

    fn sync_messages(&mut self) {
        self.state.messages = self.log.entries().to_vec();
        self.emit_messages();
    }

    pub fn handle_message(&mut self, msg: CoreMsg) {
        match msg {
            CoreMsg::Action(action) => {
                tracing::info!(action = action.tag(), "dispatch");
                self.handle_action(action);
            }
            CoreMsg::Internal(internal) => {
                tracing::debug!(event = internal.tag(), "internal");
                self.handle_internal(*internal);
            }
        }
    }

    fn handle_action(&mut self, action: SessionAction) {
        match action {
            SessionAction::Connect => self.begin_connect(),
            SessionAction::Disconnect => self.reset_to_disconnected(None),
            SessionAction::SelectConversation { peer_address } => {
                match address::normalize(&peer_address) {
                    Ok(peer) => self.attach_conversation(peer),
                    Err(e) => self.notice(e.to_string()),
                }
            }
            SessionAction::StartNewConversation => self.start_composing(),
            SessionAction::UpdateComposeRecipient { address } => {
                if self.state.selection.is_composing() {
                    self.state.selection = ActiveSelection::Composing { recipient: address };
                    self.emit_selection();
                }
            }
            SessionAction::SendMessage { text } => self.send_message(&text),
            SessionAction::CheckReachability { address } => self.check_reachability(address),
            SessionAction::ClearNotice => {
                if self.state.notice.is_some() {
                    self.state.notice = None;
                    self.emit_notice();
                }
            }
        }
    }

    // ----- connect / disconnect -----

    fn begin_connect(&mut self) {
        if self.session.is_some()
            || matches!(
                self.state.connection,
                ConnectionStatus::ConnectingWallet
                    | ConnectionStatus::WalletConnected
                    | ConnectionStatus::InitializingProtocol
            )
        {
            tracing::debug!("connect ignored; already connecting or connected");
            return;
        }

        self.state.connection = ConnectionStatus::ConnectingWallet;
        self.emit_connection();

        let wallet = self.wallet.clone();
        let tx = self.core_sender.clone();
        self.runtime.spawn(async move {
            let event = match wallet.request_accounts().await {
                Ok(accounts) => match accounts.into_iter().next() {
                    Some(address) => match wallet.signer().await {
                        Ok(signer) => InternalEvent::WalletConnected { address, signer },
                        Err(error) => InternalEvent::WalletFailed { error },
                    },
                    None => InternalEvent::WalletFailed {
                        error: WalletError::Unavailable,
                    },
                },
                Err(error) => InternalEvent::WalletFailed { error },
            };
            let _ = tx.send(CoreMsg::Internal(Box::new(event)));
        });
    }

    fn teardown_session(&mut self) {
        // Invalidate any in-flight loads and stream events.
        self.load_token = self.load_token.wrapping_add(1);
        self.msg_stream_gen = self.msg_stream_gen.wrapping_add(1);

        if let Some(sess) = self.session.take() {
            if let Some(sup) = sess.messages_supervisor {
                sup.stop();
            }
            if let Some(sup) = sess.conversations_supervisor {
                sup.stop();
            }
            if let Some(watch) = sess.accounts_watch {
                watch.cancel();
            }
        }
        self.index.clear();
        self.log.clear();
    }

    fn reset_to_disconnected(&mut self, notice: Option<String>) {
        self.teardown_session();
        self.state = SessionState::empty();
        self.state.notice = notice;
        self.next_rev();
        self.emit(SessionUpdate::FullState(self.state.clone()));
    }

    // ----- selection -----

    fn attach_conversation(&mut self, peer: PeerAddress) {
        let handle = {
            let Some(sess) = self.session.as_mut() else {
                self.notice(SessionError::NotInitialized.to_string());
                return;
            };
            let Some(handle) = sess.handles.get(&peer).cloned() else {
                tracing::warn!(%peer, "select for unknown conversation rejected");
                self.notice(format!("No conversation with {}", peer.short()));
                return;
            };
            if let Some(sup) = sess.messages_supervisor.take() {
                sup.stop();
            }
            handle
        };

        // Hard boundary: events from the previous conversation's stream must
        // never land in the newly attached log.
        self.msg_stream_gen = self.msg_stream_gen.wrapping_add(1);
        let generation = self.msg_stream_gen;

        self.index.reset_unread(&peer);
        self.log.clear();
        self.log.attach_empty(peer.clone());
        self.state.selection = ActiveSelection::Existing {
            peer_address: peer.clone(),
        };
        self.sync_conversations();
        self.emit_selection();
        self.sync_messages();

        let tx = self.core_sender.clone();
        let fetch_handle = handle.clone();
        let fetch_peer = peer.clone();
        let limit = self.config.history_limit;
        self.runtime.spawn(async move {
            let event = match fetch_handle.fetch_messages(limit).await {
                Ok(history) => InternalEvent::MessagesLoaded {
                    generation,
                    peer: fetch_peer,
                    history,
                },
                Err(error) => InternalEvent::MessagesLoadFailed {
                    generation,
                    peer: fetch_peer,
                    error,
                },
            };
            let _ = tx.send(CoreMsg::Internal(Box::new(event)));
        });

        self.start_message_stream(handle, generation);
    }

    fn start_composing(&mut self) {
        if let Some(sess) = self.session.as_mut() {
            if let Some(sup) = sess.messages_supervisor.take() {
                sup.stop();
            }
        }
        self.msg_stream_gen = self.msg_stream_gen.wrapping_add(1);
        self.log.clear();
        self.state.selection = ActiveSelection::Composing {
            recipient: String::new(),
        };
        self.emit_selection();
        self.sync_messages();
    }

    // ----- send -----

    fn send_message(&mut self, text: &str) {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return;
        }
        if self.session.is_none() {
            self.notice(SessionError::NotInitialized.to_string());
            return;
        }

        match self.state.selection.clone() {
            ActiveSelection::Existing { peer_address } => {
                self.send_to_existing(peer_address, trimmed)
            }
            ActiveSelection::Composing { recipient } => {
                self.send_to_new_recipient(&recipient, trimmed)
            }
            ActiveSelection::None => {
                tracing::warn!("send with no conversation selected ignored");
            }
        }
    }

    fn send_to_existing(&mut self, peer: PeerAddress, text: &str) {
        let Some(handle) = self
            .session
            .as_ref()
            .and_then(|s| s.handles.get(&peer).cloned())
        else {
            self.notice(SessionError::SendFailed("conversation not available".into()).to_string());
            return;
        };

        let entry = self.log.append_optimistic(text, now_seconds());
        self.sync_messages();

        let tx = self.core_sender.clone();
        let text = text.to_string();
        let local_id = entry.id;
        self.runtime.spawn(async move {
            let event = match handle.send(&text).await {
                Ok(()) => InternalEvent::SendResult {
                    peer,
                    local_id,
                    text,
                    ok: true,
                    error: None,
                },
                Err(e) => InternalEvent::SendResult {
                    peer,
                    local_id,
                    text,
                    ok: false,
                    error: Some(e.to_string()),
                },
            };
            let _ = tx.send(CoreMsg::Internal(Box::new(event)));
        });
    }

    fn send_to_new_recipient(&mut self, recipient: &str, text: &str) {
        // Validation happens before any network call or optimistic entry.
        let recipient = match address::normalize(recipient) {
            Ok(peer) => peer,
            Err(e) => {
                self.notice(e.to_string());
                return;
            }
        };
        let Some(client) = self.session.as_ref().map(|s| s.client.clone()) else {
            self.notice(SessionError::NotInitialized.to_string());
            return;
        };

        self.log.attach_empty(recipient.clone());
        let entry = self.log.append_optimistic(text, now_seconds());
        self.sync_messages();

        let generation = self.msg_stream_gen;
        let tx = self.core_sender.clone();
        let text = text.to_string();
        let local_id = entry.id;
        self.runtime.spawn(async move {
            let event = match client.can_message(recipient.as_str()).await {
                Ok(true) => {
                    let result = client.new_conversation(recipient.as_str()).await;
                    InternalEvent::ConversationCreated {
                        generation,
                        recipient,
                        local_id,
                        text,
                        result,
                    }
                }
                Ok(false) => InternalEvent::RecipientUnreachable {
                    recipient,
                    local_id,
                },
                Err(e) => InternalEvent::SendResult {
                    peer: recipient,
                    local_id,
                    text,
                    ok: false,
                    error: Some(e.to_string()),
                },
            };
            let _ = tx.send(CoreMsg::Internal(Box::new(event)));
        });
    }

    fn check_reachability(&mut self, address: String) {
        let Some(client) = self.session.as_ref().map(|s| s.client.clone()) else {
            self.notice(SessionError::NotInitialized.to_string());
            return;
        };
        // Malformed addresses are answered locally.
        let normalized = match address::normalize(&address) {
            Ok(peer) => peer,
            Err(_) => {
                let rev = self.next_rev();
                self.emit(SessionUpdate::ReachabilityChecked {
                    rev,
                    address,
                    reachable: false,
                });
                return;
            }
        };

        let tx = self.core_sender.clone();
        self.runtime.spawn(async move {
            let result = client.can_message(normalized.as_str()).await;
            let _ = tx.send(CoreMsg::Internal(Box::new(
                InternalEvent::ReachabilityResult { address, result },
            )));
        });
    }

    // ----- internal events -----

    fn handle_internal(&mut self, internal: InternalEvent) {
        match internal {
            InternalEvent::WalletConnected { address, signer } => {
                self.on_wallet_connected(address, signer)
            }
            InternalEvent::WalletFailed { error } => {
                self.state.connection = ConnectionStatus::Failed;
                self.emit_connection();
                let err = match error {
                    WalletError::Unavailable => SessionError::WalletUnavailable,
                    WalletError::Rejected(reason) => SessionError::WalletRejected(reason),
                    WalletError::Other(reason) => SessionError::WalletRejected(reason),
                };
                self.notice(err.to_string());
            }
            InternalEvent::ClientReady { client } => self.on_client_ready(client),
            InternalEvent::ClientInitFailed { error } => {
                self.state.connection = ConnectionStatus::Failed;
                self.emit_connection();
                self.notice(SessionError::ProtocolInitFailed(error.to_string()).to_string());
            }
            InternalEvent::AccountsChanged { accounts } => self.on_accounts_changed(accounts),
            InternalEvent::ConversationsLoaded {
                token,
                conversations,
            } => self.on_conversations_loaded(token, conversations),
            InternalEvent::ConversationsLoadFailed { token, error } => {
                if token != self.load_token {
                    return;
                }
                self.notice(SessionError::LoadFailed(error.to_string()).to_string());
                self.start_conversations_stream();
            }
            InternalEvent::MessagesLoaded {
                generation,
                peer,
                history,
            } => {
                if generation != self.msg_stream_gen {
                    tracing::debug!(%peer, "stale history load dropped");
                    return;
                }
                let Some(local) = self.state.local_address.clone() else {
                    return;
                };
                self.log.replace_for(peer, &local, history);
                self.sync_messages();
            }
            InternalEvent::MessagesLoadFailed {
                generation,
                peer,
                error,
            } => {
                if generation != self.msg_stream_gen {
                    return;
                }
                tracing::warn!(%peer, %error, "history load failed");
                self.notice(SessionError::LoadFailed(error.to_string()).to_string());
            }
            InternalEvent::NewConversation { handle } => self.on_new_conversation(handle),
            InternalEvent::StreamMessage { generation, raw } => {
                if generation != self.msg_stream_gen {
                    tracing::debug!(
                        generation,
                        current = self.msg_stream_gen,
                        "stale stream message dropped"
                    );
                    return;
                }
                self.on_stream_message(raw);
            }
            InternalEvent::StreamExhausted { label } => {
                self.notice(SessionError::StreamExhausted(label).to_string());
            }
            InternalEvent::ConversationCreated {
                generation,
                recipient,
                local_id,
                text,
                result,
            } => self.on_conversation_created(generation, recipient, local_id, text, result),
            InternalEvent::RecipientUnreachable {
                recipient,
                local_id,
            } => {
                let err = SessionError::RecipientUnreachable(recipient.to_string());
                self.log.mark_failed(&local_id, err.to_string());
                self.sync_messages();
                self.notice(err.to_string());
            }
            InternalEvent::SendResult {
                peer,
                local_id,
                text,
                ok,
                error,
            } => {
                if ok {
                    self.log.mark_sent(&local_id);
                    self.sync_messages();
                    if self.index.apply_message_touch(&peer, &text, now_seconds()) {
                        self.sync_conversations();
                    }
                } else {
                    let reason = error.unwrap_or_else(|| "send failed".into());
                    self.log.mark_failed(&local_id, reason.clone());
                    self.sync_messages();
                    self.notice(SessionError::SendFailed(reason).to_string());
                }
            }
            InternalEvent::ReachabilityResult { address, result } => match result {
                Ok(reachable) => {
                    let rev = self.next_rev();
                    self.emit(SessionUpdate::ReachabilityChecked {
                        rev,
                        address,
                        reachable,
                    });
                }
                Err(e) => {
                    self.notice(format!("reachability check failed: {e}"));
                }
            },
        }
    }

    fn on_wallet_connected(&mut self, address: String, signer: Arc<dyn WalletSigner>) {
        let local = match address::normalize(&address) {
            Ok(peer) => peer,
            Err(e) => {
                self.state.connection = ConnectionStatus::Failed;
                self.emit_connection();
                self.notice(e.to_string());
                return;
            }
        };
        tracing::info!(address = %local, "wallet connected");

        self.state.local_address = Some(local);
        self.state.connection = ConnectionStatus::WalletConnected;
        self.emit_connection();

        self.state.connection = ConnectionStatus::InitializingProtocol;
        self.emit_connection();

        let provider = self.provider.clone();
        let config = ClientConfig {
            env: self.config.env.clone(),
        };
        let tx = self.core_sender.clone();
        self.runtime.spawn(async move {
            let event = match provider.create(signer, &config).await {
                Ok(client) => InternalEvent::ClientReady { client },
                Err(error) => InternalEvent::ClientInitFailed { error },
            };
            let _ = tx.send(CoreMsg::Internal(Box::new(event)));
        });
    }

    fn on_client_ready(&mut self, client: Arc<dyn MessagingClient>) {
        let accounts_tx = self.core_sender.clone();
        let accounts_watch = self.wallet.subscribe_accounts(Box::new(move |accounts| {
            let _ = accounts_tx.send(CoreMsg::Internal(Box::new(InternalEvent::AccountsChanged {
                accounts,
            })));
        }));

        self.session = Some(Session {
            client: client.clone(),
            handles: HashMap::new(),
            accounts_watch: Some(accounts_watch),
            conversations_supervisor: None,
            messages_supervisor: None,
        });

        self.state.connection = ConnectionStatus::Ready;
        self.emit_connection();

        self.load_token = self.load_token.wrapping_add(1);
        let token = self.load_token;
        let tx = self.core_sender.clone();
        self.runtime.spawn(async move {
            let event = match client.list_conversations().await {
                Ok(handles) => {
                    let mut conversations = Vec::with_capacity(handles.len());
                    for handle in handles {
                        // Per-conversation isolation: a failed preview fetch
                        // degrades that row, never the whole load.
                        let newest = match handle.fetch_messages(Some(1)).await {
                            Ok(mut msgs) => msgs.pop(),
                            Err(e) => {
                                tracing::warn!(
                                    peer = %handle.peer_address(),
                                    %e,
                                    "preview fetch failed"
                                );
                                None
                            }
                        };
                        conversations.push((handle, newest));
                    }
                    InternalEvent::ConversationsLoaded {
                        token,
                        conversations,
                    }
                }
                Err(error) => InternalEvent::ConversationsLoadFailed { token, error },
            };
            let _ = tx.send(CoreMsg::Internal(Box::new(event)));
        });
    }

    fn on_accounts_changed(&mut self, accounts: Vec<String>) {
        // The watch only exists while a session does; anything else is a
        // late event from an already-cancelled subscription.
        if self.session.is_none() {
            return;
        }
        match accounts.into_iter().next() {
            None => {
                tracing::info!("wallet reported no accounts; disconnecting");
                self.reset_to_disconnected(Some("Wallet disconnected".into()));
            }
            Some(account) => {
                let changed = match address::normalize(&account) {
                    Ok(peer) => self.state.local_address.as_ref() != Some(&peer),
                    Err(_) => true,
                };
                if changed {
                    tracing::info!("wallet account changed; restarting session");
                    self.reset_to_disconnected(Some("Account changed; reconnecting".into()));
                    self.begin_connect();
                }
            }
        }
    }

    fn on_conversations_loaded(
        &mut self,
        token: u64,
        conversations: Vec<(Arc<dyn ConversationHandle>, Option<RawMessage>)>,
    ) {
        if token != self.load_token {
            tracing::debug!("stale conversation load dropped");
            return;
        }
        let Some(sess) = self.session.as_mut() else {
            return;
        };

        let mut rows = Vec::with_capacity(conversations.len());
        for (handle, newest) in conversations {
            let peer = match address::normalize(&handle.peer_address()) {
                Ok(peer) => peer,
                Err(e) => {
                    tracing::warn!(address = %handle.peer_address(), %e, "conversation with malformed peer skipped");
                    continue;
                }
            };
            rows.push(LoadedConversation {
                peer_address: peer.clone(),
                preview: newest.as_ref().map(|m| m.text.clone()),
                last_activity_at: newest.as_ref().and_then(|m| m.sent_at),
            });
            sess.handles.insert(peer, handle);
        }

        self.index.bulk_load(rows);
        self.sync_conversations();

        if self.config.auto_select_first
            && matches!(self.state.selection, ActiveSelection::None)
        {
            if let Some(first) = self.index.first_peer().cloned() {
                self.attach_conversation(first);
            }
        }

        self.start_conversations_stream();
    }

    fn on_new_conversation(&mut self, handle: Arc<dyn ConversationHandle>) {
        let peer = match address::normalize(&handle.peer_address()) {
            Ok(peer) => peer,
            Err(e) => {
                tracing::warn!(address = %handle.peer_address(), %e, "streamed conversation with malformed peer dropped");
                return;
            }
        };
        let Some(sess) = self.session.as_mut() else {
            return;
        };
        sess.handles.entry(peer.clone()).or_insert(handle);

        // Idempotent: re-observing a known peer must not duplicate the row
        // or repeat the notice.
        if self.index.upsert_from_new_conversation(peer.clone()) == UpsertOutcome::Inserted {
            self.sync_conversations();
            self.notice(format!("New conversation from {}", peer.short()));
        }
    }

    fn on_stream_message(&mut self, raw: RawMessage) {
        let Some(local) = self.state.local_address.clone() else {
            return;
        };
        if raw.text.is_empty() {
            return;
        }

        let message_peer = match raw.conversation_peer.as_deref() {
            Some(s) => match address::normalize(s) {
                Ok(peer) => Some(peer),
                Err(e) => {
                    tracing::warn!(address = s, %e, "stream message with malformed peer dropped");
                    return;
                }
            },
            None => self.log.attached_peer().cloned(),
        };
        let Some(message_peer) = message_peer else {
            return;
        };

        let incoming = match address::normalize(&raw.sender_address) {
            Ok(sender) => sender != local,
            Err(_) => true,
        };
        let text = raw.text.clone();
        let timestamp = raw.sent_at.unwrap_or_else(now_seconds);

        if self.log.attached_peer() == Some(&message_peer) {
            self.log.append_authoritative(raw, &local);
            self.sync_messages();
        } else if incoming {
            // Inactive conversation: bump unread, never touch the log.
            self.index.increment_unread(&message_peer);
        }

        if self.index.apply_message_touch(&message_peer, &text, timestamp) {
            self.sync_conversations();
        }

        if incoming {
            self.notice(format!(
                "{}: {}",
                message_peer.short(),
                notice_preview(&text)
            ));
        }
    }

    fn on_conversation_created(
        &mut self,
        generation: u64,
        recipient: PeerAddress,
        local_id: String,
        text: String,
        result: Result<Arc<dyn ConversationHandle>, ClientError>,
    ) {
        let handle = match result {
            Ok(handle) => handle,
            Err(e) => {
                self.log.mark_failed(&local_id, e.to_string());
                self.sync_messages();
                self.notice(SessionError::SendFailed(e.to_string()).to_string());
                return;
            }
        };
        let Some(sess) = self.session.as_mut() else {
            return;
        };
        sess.handles.insert(recipient.clone(), handle.clone());

        // Self-initiated: no notice, unread stays zero.
        self.index.upsert_from_new_conversation(recipient.clone());
        self.sync_conversations();

        if generation != self.msg_stream_gen {
            // The user navigated away while creation was in flight. The
            // conversation is kept (handle and list row) but the current
            // selection, log and stream are left untouched, and the pending
            // send is abandoned with it.
            tracing::debug!(%recipient, "conversation created for a superseded compose");
            return;
        }

        self.state.selection = ActiveSelection::Existing {
            peer_address: recipient.clone(),
        };
        self.emit_selection();

        self.msg_stream_gen = self.msg_stream_gen.wrapping_add(1);
        let generation = self.msg_stream_gen;
        self.start_message_stream(handle.clone(), generation);

        let tx = self.core_sender.clone();
        self.runtime.spawn(async move {
            let event = match handle.send(&text).await {
                Ok(()) => InternalEvent::SendResult {
                    peer: recipient,
                    local_id,
                    text,
                    ok: true,
                    error: None,
                },
                Err(e) => InternalEvent::SendResult {
                    peer: recipient,
                    local_id,
                    text,
                    ok: false,
                    error: Some(e.to_string()),
                },
            };
            let _ = tx.send(CoreMsg::Internal(Box::new(event)));
        });
    }

    // ----- streams -----

    fn start_conversations_stream(&mut self) {
        let Some(sess) = self.session.as_mut() else {
            return;
        };
        if sess.conversations_supervisor.is_some() {
            return;
        }

        let client = sess.client.clone();
        let tx = self.core_sender.clone();
        let subscribe: SubscribeFn = Box::new(move || {
            let client = client.clone();
            let tx = tx.clone();
            Box::pin(async move {
                let tx = tx.clone();
                client
                    .stream_conversations(Box::new(move |handle| {
                        let _ = tx.send(CoreMsg::Internal(Box::new(
                            InternalEvent::NewConversation { handle },
                        )));
                    }))
                    .await
            })
        });

        let supervisor = StreamSupervisor::new(CONVERSATIONS_STREAM, subscribe);
        let exhaust_tx = self.core_sender.clone();
        supervisor.set_on_exhausted(move || {
            let _ = exhaust_tx.send(CoreMsg::Internal(Box::new(InternalEvent::StreamExhausted {
                label: CONVERSATIONS_STREAM,
            })));
        });
        supervisor.start(self.runtime.handle());
        sess.conversations_supervisor = Some(supervisor);
    }

    fn start_message_stream(&mut self, handle: Arc<dyn ConversationHandle>, generation: u64) {
        let tx = self.core_sender.clone();
        let subscribe: SubscribeFn = Box::new(move || {
            let handle = handle.clone();
            let tx = tx.clone();
            Box::pin(async move {
                let tx = tx.clone();
                handle
                    .stream_messages(Box::new(move |raw| {
                        let _ = tx.send(CoreMsg::Internal(Box::new(InternalEvent::StreamMessage {
                            generation,
                            raw,
                        })));
                    }))
                    .await
            })
        });

        let supervisor = StreamSupervisor::new(MESSAGES_STREAM, subscribe);
        let exhaust_tx = self.core_sender.clone();
        supervisor.set_on_exhausted(move || {
            let _ = exhaust_tx.send(CoreMsg::Internal(Box::new(InternalEvent::StreamExhausted {
                label: MESSAGES_STREAM,
            })));
        });
        supervisor.start(self.runtime.handle());
        if let Some(sess) = self.session.as_mut() {
            if let Some(previous) = sess.messages_supervisor.replace(supervisor) {
                previous.stop();
            }
        }
    }
}

/// Bound a message body for an incoming-message notice.
fn notice_preview(text: &str) -> String {
    if text.chars().count() > NOTICE_PREVIEW_MAX_CHARS {
        let head: String = text.chars().take(NOTICE_PREVIEW_MAX_CHARS).collect();
        format!("{head}...")
    } else {
        text.to_string()
    }
}
