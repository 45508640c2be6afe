/// Session-level failure taxonomy surfaced to the presentation layer.
///
/// Validation failures (`InvalidAddress`) are rejected before any network
/// call. One-shot network failures leave prior state intact. Stream
/// exhaustion is terminal only for the subscription that exhausted its
/// retries; the session itself stays usable after any single failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("no wallet capability available")]
    WalletUnavailable,

    #[error("wallet connection rejected: {0}")]
    WalletRejected(String),

    #[error("messaging client initialization failed: {0}")]
    ProtocolInitFailed(String),

    #[error("invalid recipient address: {0}")]
    InvalidAddress(String),

    #[error("recipient cannot receive messages: {0}")]
    RecipientUnreachable(String),

    #[error("messaging client not initialized")]
    NotInitialized,

    #[error("{0} stream gave up after exhausting retries")]
    StreamExhausted(&'static str),

    #[error("send failed: {0}")]
    SendFailed(String),

    #[error("load failed: {0}")]
    LoadFailed(String),
}
