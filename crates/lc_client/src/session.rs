//! Active identity cache.
//!
//! One slot, one lock. Critical sections only copy or swap fields; nothing
//! awaits or does I/O while the lock is held. The cache is never persisted.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;

use lc_crypto::SigningIdentity;
use lc_proto::SignedRequest;

use crate::error::ClientError;

#[derive(Default)]
struct SessionState {
    identity: Option<Arc<SigningIdentity>>,
    account_id: Option<String>,
    username: Option<String>,
}

/// Cloneable handle; clones share the slot.
#[derive(Clone, Default)]
pub struct SessionCache {
    inner: Arc<Mutex<SessionState>>,
}

/// Public view of the loaded session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub account_id: String,
    pub username: Option<String>,
    pub public_key: Vec<u8>,
}

/// Signing capability borrowed from the session for one operation.
#[derive(Clone)]
pub struct Signer {
    identity: Arc<SigningIdentity>,
    account_id: String,
}

impl Signer {
    pub fn new(identity: Arc<SigningIdentity>) -> Self {
        let account_id = identity.account_id();
        Self { identity, account_id }
    }

    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    pub fn identity(&self) -> &SigningIdentity {
        &self.identity
    }

    pub fn sign_request<T: Serialize>(&self, payload: &T) -> Result<SignedRequest<T>, ClientError> {
        Ok(SignedRequest::sign(payload, &self.identity)?)
    }
}

impl SessionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the slot with `identity`. The account id is derived from the
    /// public key, never taken from the caller.
    pub fn load(&self, identity: SigningIdentity, username: Option<String>) {
        let account_id = identity.account_id();
        let identity = Arc::new(identity);
        let mut state = self.inner.lock();
        state.identity = Some(identity);
        state.account_id = Some(account_id);
        state.username = username;
    }

    pub fn set_username(&self, username: impl Into<String>) {
        self.inner.lock().username = Some(username.into());
    }

    pub fn is_loaded(&self) -> bool {
        let state = self.inner.lock();
        state.identity.is_some() && state.account_id.is_some()
    }

    pub fn account_id(&self) -> Option<String> {
        self.inner.lock().account_id.clone()
    }

    pub fn username(&self) -> Option<String> {
        self.inner.lock().username.clone()
    }

    /// `NoSession` unless an identity is loaded.
    pub fn signer(&self) -> Result<Signer, ClientError> {
        let state = self.inner.lock();
        match (&state.identity, &state.account_id) {
            (Some(identity), Some(account_id)) => Ok(Signer {
                identity: Arc::clone(identity),
                account_id: account_id.clone(),
            }),
            _ => Err(ClientError::NoSession),
        }
    }

    pub fn snapshot(&self) -> Option<SessionSnapshot> {
        let state = self.inner.lock();
        let identity = state.identity.as_ref()?;
        Some(SessionSnapshot {
            account_id: state.account_id.clone()?,
            username: state.username.clone(),
            public_key: identity.public.as_bytes().to_vec(),
        })
    }

    pub fn clear(&self) {
        *self.inner.lock() = SessionState::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_cache_has_no_signer() {
        let cache = SessionCache::new();
        assert!(!cache.is_loaded());
        assert!(matches!(cache.signer(), Err(ClientError::NoSession)));
        assert!(cache.snapshot().is_none());
    }

    #[test]
    fn loading_same_identity_twice_is_identical() {
        let id = SigningIdentity::generate().unwrap();
        let (pk, sk) = (id.public.as_bytes().to_vec(), id.secret_bytes().to_vec());

        let cache = SessionCache::new();
        cache.load(SigningIdentity::from_bytes(&pk, &sk).unwrap(), Some("ada".into()));
        let first = cache.snapshot().unwrap();
        let first_secret = cache.signer().unwrap().identity().secret_bytes().to_vec();

        cache.load(SigningIdentity::from_bytes(&pk, &sk).unwrap(), Some("ada".into()));
        assert_eq!(cache.snapshot().unwrap(), first);
        assert_eq!(cache.signer().unwrap().identity().secret_bytes(), first_secret.as_slice());
        assert_eq!(first.account_id, id.account_id());
    }

    #[test]
    fn clear_resets_everything_and_clones_share_the_slot() {
        let cache = SessionCache::new();
        let other = cache.clone();
        cache.load(SigningIdentity::generate().unwrap(), None);
        assert!(other.is_loaded());
        other.set_username("grace");
        assert_eq!(cache.username().as_deref(), Some("grace"));

        cache.clear();
        assert!(!other.is_loaded());
        assert!(other.username().is_none());
        assert!(other.account_id().is_none());
    }
}
