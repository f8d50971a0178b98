use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Vault is locked: unlock with the passphrase first")]
    VaultLocked,

    #[error("Passphrase does not open this database")]
    WrongPassphrase,

    #[error("Crypto error: {0}")]
    Crypto(#[from] lc_crypto::CryptoError),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Record already exists: {0}")]
    Conflict(String),

    #[error("Corrupt row: {0}")]
    Corrupt(String),

    #[error("Migration error: {0}")]
    Migration(String),
}
