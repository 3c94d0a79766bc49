// src/error.rs
// Error taxonomy shared by the DApp and Wallet clients.

use thiserror::Error;

/// The full set of error kinds the protocol core can raise, per the
/// error handling design. Most variants are never surfaced directly to
/// a human — they drive silent drops, auto-error responses, or bounded
/// retries; see each client module for how a given variant is handled.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PhoenixError {
    #[error("invalid pairing URI: {0}")]
    InvalidPairingUri(String),

    #[error("session is not connected")]
    NotConnected,

    #[error("session is already active")]
    AlreadyConnected,

    #[error("duplicate request id: {0}")]
    DuplicateRequestId(String),

    #[error("request timed out")]
    RequestTimeout,

    #[error("session closed")]
    SessionClosed,

    #[error("failed to decrypt envelope")]
    DecryptError,

    #[error("message timestamp outside the replay window")]
    TimestampOutOfWindow,

    #[error("chain type mismatch")]
    ChainTypeMismatch,

    #[error("unsupported request type: {0}")]
    UnsupportedRequestType(String),

    #[error("signer failed: {0}")]
    SignerFailure(String),

    #[error("transport error: {0}")]
    TransportError(String),

    #[error("persistence error: {0}")]
    PersistenceError(String),

    #[error("encoding error: {0}")]
    Encoding(String),
}

pub type Result<T> = std::result::Result<T, PhoenixError>;

impl From<base64::DecodeError> for PhoenixError {
    fn from(e: base64::DecodeError) -> Self {
        PhoenixError::Encoding(e.to_string())
    }
}

impl From<serde_json::Error> for PhoenixError {
    fn from(e: serde_json::Error) -> Self {
        PhoenixError::Encoding(e.to_string())
    }
}
