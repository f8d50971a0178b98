//! Vault: in-memory key material unlocked by passphrase.
//!
//! Holds the 32-byte database encryption key while the client is unlocked.
//! Locking drops the key, which zeroizes it.

use std::sync::Arc;

use tokio::sync::RwLock;

use lc_crypto::kdf::{vault_key_from_passphrase, VaultKey, SALT_LEN};

use crate::error::StoreError;

/// Thread-safe vault handle. Clones share the same slot.
#[derive(Clone, Default)]
pub struct Vault {
    inner: Arc<RwLock<Option<VaultKey>>>,
}

impl Vault {
    pub fn new() -> Self {
        Self::default()
    }

    /// Derive the key from `passphrase` and the database salt.
    pub async fn unlock(&self, passphrase: &[u8], salt: &[u8; SALT_LEN]) -> Result<(), StoreError> {
        // Argon2id blocks; run it off the async workers.
        let passphrase = zeroize::Zeroizing::new(passphrase.to_vec());
        let salt = *salt;
        let key = tokio::task::spawn_blocking(move || vault_key_from_passphrase(&passphrase, &salt))
            .await
            .map_err(|e| lc_crypto::CryptoError::KeyDerivation(e.to_string()))??;
        *self.inner.write().await = Some(key);
        Ok(())
    }

    /// Unlock with an existing key (keyring, tests).
    pub async fn unlock_with_key(&self, key: [u8; 32]) {
        *self.inner.write().await = Some(VaultKey(key));
    }

    pub async fn lock(&self) {
        *self.inner.write().await = None;
    }

    pub async fn is_locked(&self) -> bool {
        self.inner.read().await.is_none()
    }

    /// Run `f` with the raw key. `VaultLocked` if no key is present.
    pub async fn with_key<F, R>(&self, f: F) -> Result<R, StoreError>
    where
        F: FnOnce(&[u8; 32]) -> Result<R, StoreError>,
    {
        match self.inner.read().await.as_ref() {
            Some(key) => f(&key.0),
            None => Err(StoreError::VaultLocked),
        }
    }
}
