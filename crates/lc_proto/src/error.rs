use thiserror::Error;

use lc_crypto::CryptoError;

#[derive(Debug, Error)]
pub enum ProtoError {
    #[error("Canonical encoding error: {0}")]
    Codec(#[from] bincode::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("Malformed channel token: {0}")]
    Token(String),
}
