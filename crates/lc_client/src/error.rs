use thiserror::Error;

use lc_crypto::CryptoError;
use lc_proto::{EnvelopeError, ProtoError};
use lc_store::StoreError;

#[derive(Debug, Error)]
pub enum ClientError {
    /// Transport failure or non-success response.
    #[error("Network error: {0}")]
    Network(String),

    #[error("No identity loaded")]
    NoSession,

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Protocol error: {0}")]
    Proto(#[from] ProtoError),

    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("Envelope rejected: {0}")]
    Envelope(#[from] EnvelopeError),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("{0}")]
    Collaborator(String),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ChannelError {
    #[error("Channel not started")]
    NotStarted,

    #[error("Could not mint channel credentials: {0}")]
    Credentials(String),

    #[error("Connect failed: {0}")]
    Connect(String),

    #[error("Send failed: {0}")]
    Send(String),

    #[error("Receive failed: {0}")]
    Receive(String),

    #[error("Channel closed")]
    Closed,
}
