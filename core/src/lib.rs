//! Client-side session core for a wallet-addressed messaging protocol.
//!
//! All state lives in a single-threaded actor fed over a channel; the
//! presentation layer talks to it through [`SessionHandle`]: dispatch
//! actions, read `state()` snapshots, and subscribe to [`SessionUpdate`]s.
//! Wallet and messaging-network capabilities are injected as trait objects
//! (see [`client`]), so the core itself never performs I/O beyond what those
//! capabilities do.

mod actions;
mod address;
mod config;
mod core;
mod error;
mod index;
mod logging;
mod message_log;
mod state;
mod stream;
mod updates;

pub mod client;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::thread;

use flume::{Receiver, Sender};

use crate::client::{MessagingProvider, WalletProvider};

pub use actions::SessionAction;
pub use address::PeerAddress;
pub use config::SessionConfig;
pub use error::SessionError;
pub use state::*;
pub use stream::{BackoffPolicy, SupervisorState};
pub use updates::{CoreMsg, InternalEvent, SessionUpdate};

/// `true` when the input is `0x` followed by 40 hex digits (any case),
/// ignoring surrounding whitespace.
pub fn is_valid_address(input: &str) -> bool {
    address::is_valid(input)
}

/// Canonical EIP-55 checksummed form of an address.
pub fn normalize_address(input: &str) -> Result<PeerAddress, SessionError> {
    address::normalize(input)
}

pub trait SessionReconciler: Send + Sync + 'static {
    fn reconcile(&self, update: SessionUpdate);
}

pub struct SessionHandle {
    core_tx: Sender<CoreMsg>,
    update_rx: Receiver<SessionUpdate>,
    listening: AtomicBool,
    shared_state: Arc<RwLock<SessionState>>,
}

impl SessionHandle {
    pub fn new(
        data_dir: String,
        wallet: Arc<dyn WalletProvider>,
        provider: Arc<dyn MessagingProvider>,
    ) -> Arc<Self> {
        logging::init_logging();
        tracing::info!(data_dir = %data_dir, "SessionHandle::new() starting");

        let (update_tx, update_rx) = flume::unbounded();
        let (core_tx, core_rx) = flume::unbounded::<CoreMsg>();
        let shared_state = Arc::new(RwLock::new(SessionState::empty()));

        // Actor loop thread (single threaded "session actor").
        let core_tx_for_core = core_tx.clone();
        let shared_for_core = shared_state.clone();
        thread::spawn(move || {
            let mut core = crate::core::SessionCore::new(
                update_tx,
                core_tx_for_core,
                data_dir,
                shared_for_core,
                wallet,
                provider,
            );
            while let Ok(msg) = core_rx.recv() {
                core.handle_message(msg);
            }
        });

        Arc::new(Self {
            core_tx,
            update_rx,
            listening: AtomicBool::new(false),
            shared_state,
        })
    }

    pub fn state(&self) -> SessionState {
        match self.shared_state.read() {
            Ok(g) => g.clone(),
            Err(poison) => poison.into_inner().clone(),
        }
    }

    pub fn connection_status(&self) -> ConnectionStatus {
        self.state().connection
    }

    pub fn conversations(&self) -> Vec<ConversationSummary> {
        self.state().conversations
    }

    pub fn messages(&self) -> Vec<MessageEntry> {
        self.state().messages
    }

    pub fn total_unread(&self) -> u32 {
        self.state().total_unread
    }

    pub fn dispatch(&self, action: SessionAction) {
        // Contract: never block the caller.
        let _ = self.core_tx.send(CoreMsg::Action(action));
    }

    pub fn listen_for_updates(&self, reconciler: Box<dyn SessionReconciler>) {
        if self
            .listening
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            // Avoid multiple listeners that would split the update stream.
            return;
        }

        let rx = self.update_rx.clone();
        thread::spawn(move || {
            while let Ok(update) = rx.recv() {
                reconciler.reconcile(update);
            }
        });
    }
}
