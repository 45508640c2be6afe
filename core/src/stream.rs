//! Retry/backoff wrapper around a long-lived subscription.
//!
//! Generic over the subscribe call: both the conversations stream and the
//! per-conversation message stream run under one of these. Event handling is
//! wired into the subscribe closure by the owner; the supervisor only owns
//! the subscription lifecycle.
//!
//! State machine: `Idle -> Connecting -> Streaming` on success,
//! `Connecting -> Backoff -> Connecting` on failure (bounded), then a
//! terminal `Failed` once retries are exhausted. `Failed` is never left; the
//! owner creates a fresh supervisor instead of resurrecting one.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::client::{CancelHandle, ClientError};

pub type SubscribeFuture = Pin<Box<dyn Future<Output = Result<CancelHandle, ClientError>> + Send>>;
pub type SubscribeFn = Box<dyn Fn() -> SubscribeFuture + Send + Sync>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SupervisorState {
    Idle,
    Connecting,
    Streaming,
    Backoff { retry: u32 },
    Failed,
}

/// Exponential backoff, bounded in both delay and retry count.
#[derive(Clone, Copy, Debug)]
pub struct BackoffPolicy {
    pub base_ms: u64,
    pub cap_ms: u64,
    pub max_retries: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_ms: 1_000,
            cap_ms: 30_000,
            max_retries: 5,
        }
    }
}

impl BackoffPolicy {
    /// Delay before retry number `retry` (zero-based): `min(base * 2^retry, cap)`.
    pub fn delay(&self, retry: u32) -> Duration {
        let exp = self
            .base_ms
            .checked_shl(retry)
            .unwrap_or(self.cap_ms)
            .min(self.cap_ms);
        Duration::from_millis(exp)
    }
}

struct Shared {
    state: Mutex<SupervisorState>,
    cancel: Mutex<Option<CancelHandle>>,
    alive: AtomicBool,
}

impl Shared {
    fn set_state(&self, next: SupervisorState) {
        *self.state.lock().unwrap_or_else(|p| p.into_inner()) = next;
    }
}

pub struct StreamSupervisor {
    label: &'static str,
    policy: BackoffPolicy,
    shared: Arc<Shared>,
    subscribe: Mutex<Option<SubscribeFn>>,
    on_exhausted: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl StreamSupervisor {
    pub fn new(label: &'static str, subscribe: SubscribeFn) -> Self {
        Self {
            label,
            policy: BackoffPolicy::default(),
            shared: Arc::new(Shared {
                state: Mutex::new(SupervisorState::Idle),
                cancel: Mutex::new(None),
                alive: AtomicBool::new(true),
            }),
            subscribe: Mutex::new(Some(subscribe)),
            on_exhausted: Mutex::new(None),
        }
    }

    /// Invoked once when the supervisor enters `Failed`. The failure is
    /// terminal for this subscription only; the callback lets the owner
    /// surface it without the supervisor knowing about session state.
    pub fn set_on_exhausted(&self, f: impl FnOnce() + Send + 'static) {
        *self.on_exhausted.lock().unwrap_or_else(|p| p.into_inner()) = Some(Box::new(f));
    }

    pub fn state(&self) -> SupervisorState {
        *self.shared.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Begin subscribing on the given runtime. Subsequent calls are no-ops;
    /// a supervisor drives exactly one subscription for its lifetime.
    pub fn start(&self, runtime: &tokio::runtime::Handle) {
        let Some(subscribe) = self
            .subscribe
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .take()
        else {
            return;
        };
        let on_exhausted = self
            .on_exhausted
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .take();
        let shared = self.shared.clone();
        let policy = self.policy;
        let label = self.label;
        runtime.spawn(drive(shared, subscribe, policy, label, on_exhausted));
    }

    /// Cancel the active subscription if present. Safe to call repeatedly or
    /// before `start`.
    pub fn stop(&self) {
        self.shared.alive.store(false, Ordering::SeqCst);
        let cancel = self
            .shared
            .cancel
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .take();
        if let Some(handle) = cancel {
            handle.cancel();
        }
        let mut state = self.shared.state.lock().unwrap_or_else(|p| p.into_inner());
        if *state != SupervisorState::Failed {
            *state = SupervisorState::Idle;
        }
    }
}

async fn drive(
    shared: Arc<Shared>,
    subscribe: SubscribeFn,
    policy: BackoffPolicy,
    label: &'static str,
    on_exhausted: Option<Box<dyn FnOnce() + Send>>,
) {
    for attempt in 0..=policy.max_retries {
        if !shared.alive.load(Ordering::SeqCst) {
            return;
        }
        shared.set_state(SupervisorState::Connecting);

        match subscribe().await {
            Ok(handle) => {
                if !shared.alive.load(Ordering::SeqCst) {
                    // Stopped while the subscribe call was in flight.
                    handle.cancel();
                    shared.set_state(SupervisorState::Idle);
                    return;
                }
                *shared.cancel.lock().unwrap_or_else(|p| p.into_inner()) = Some(handle);
                shared.set_state(SupervisorState::Streaming);
                tracing::debug!(stream = label, attempt, "subscribed");
                return;
            }
            Err(e) => {
                if attempt == policy.max_retries {
                    shared.set_state(SupervisorState::Failed);
                    tracing::error!(
                        stream = label,
                        %e,
                        retries = policy.max_retries,
                        "stream subscription exhausted retries"
                    );
                    if let Some(f) = on_exhausted {
                        f();
                    }
                    return;
                }
                let delay = policy.delay(attempt);
                tracing::warn!(
                    stream = label,
                    %e,
                    retry = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    "stream subscribe failed; backing off"
                );
                shared.set_state(SupervisorState::Backoff { retry: attempt });
                tokio::time::sleep(delay).await;
            }
        }
    }
}
