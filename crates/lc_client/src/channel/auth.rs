//! Channel credentials and inbound replay protection.

use std::collections::HashMap;

use parking_lot::Mutex;
use rand::{Rng, RngCore};

use lc_crypto::hash::digest;
use lc_proto::channel::{ChannelAuthPayload, ChannelToken, TOKEN_RANDOM_MAX, TOKEN_RANDOM_MIN};
use lc_proto::{is_fresh, now_unix};

use crate::error::ClientError;
use crate::session::SessionCache;

/// Mint a token for one connection attempt. Never cached: every call draws
/// new random bytes and a new timestamp.
pub fn mint_token(session: &SessionCache) -> Result<ChannelToken, ClientError> {
    let signer = session.signer()?;
    let mut rng = rand::rngs::OsRng;
    let mut random_bytes = vec![0u8; rng.gen_range(TOKEN_RANDOM_MIN..=TOKEN_RANDOM_MAX)];
    rng.fill_bytes(&mut random_bytes);

    let payload = ChannelAuthPayload {
        account_id: signer.account_id().to_string(),
        timestamp: now_unix(),
        random_bytes,
    };
    let signed = signer.sign_request(&payload)?;
    Ok(ChannelToken { payload: signed.body, signature: signed.signature })
}

pub const REPLAY_CAPACITY: usize = 4096;

/// Short-lived filter over signatures of handled inbound messages. Entries
/// live as long as the message timestamp is inside the freshness window.
/// That timestamp is unsigned, so this only catches quick duplicates; the
/// durable check lives with the contact store.
pub struct ReplayGuard {
    seen: Mutex<HashMap<[u8; 32], i64>>,
    capacity: usize,
}

impl Default for ReplayGuard {
    fn default() -> Self {
        Self::with_capacity(REPLAY_CAPACITY)
    }
}

impl ReplayGuard {
    pub fn with_capacity(capacity: usize) -> Self {
        Self { seen: Mutex::new(HashMap::new()), capacity: capacity.max(1) }
    }

    /// `true` if the signature was remembered and is still inside the window.
    pub fn contains(&self, signature: &[u8], now: i64) -> bool {
        let mut seen = self.seen.lock();
        seen.retain(|_, ts| is_fresh(*ts, now));
        seen.contains_key(&digest(signature))
    }

    /// Remember a signature, evicting the oldest entry when full.
    pub fn remember(&self, signature: &[u8], timestamp: i64, now: i64) {
        let key = digest(signature);
        let mut seen = self.seen.lock();
        seen.retain(|_, ts| is_fresh(*ts, now));
        if !seen.contains_key(&key) && seen.len() >= self.capacity {
            if let Some(oldest) = seen.iter().min_by_key(|(_, ts)| **ts).map(|(k, _)| *k) {
                seen.remove(&oldest);
            }
        }
        seen.insert(key, timestamp);
    }

    pub fn len(&self) -> usize {
        self.seen.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lc_crypto::SigningIdentity;
    use lc_proto::verify_envelope;

    #[test]
    fn token_verifies_and_is_never_reused() {
        let session = SessionCache::new();
        let id = SigningIdentity::generate().unwrap();
        let pk = id.public.as_bytes().to_vec();
        session.load(id, None);

        let a = mint_token(&session).unwrap();
        let b = mint_token(&session).unwrap();
        assert_ne!(a, b);

        let payload: ChannelAuthPayload = verify_envelope(&a.payload, &a.signature, &pk, now_unix()).unwrap();
        assert_eq!(Some(payload.account_id), session.account_id());
        assert!((TOKEN_RANDOM_MIN..=TOKEN_RANDOM_MAX).contains(&payload.random_bytes.len()));

        let parsed: ChannelToken = a.to_string().parse().unwrap();
        assert_eq!(parsed, a);
    }

    #[test]
    fn minting_requires_a_session() {
        assert!(matches!(mint_token(&SessionCache::new()), Err(ClientError::NoSession)));
    }

    #[test]
    fn remembered_signature_is_seen_inside_window() {
        let guard = ReplayGuard::default();
        assert!(!guard.contains(b"sig-1", 100));
        guard.remember(b"sig-1", 100, 100);
        assert!(guard.contains(b"sig-1", 110));
        assert!(!guard.contains(b"sig-2", 110));
    }

    #[test]
    fn entries_expire_with_the_window() {
        let guard = ReplayGuard::default();
        guard.remember(b"sig-1", 100, 100);
        assert!(!guard.contains(b"sig-1", 200));
        guard.remember(b"sig-2", 200, 200);
        assert_eq!(guard.len(), 1);
    }

    #[test]
    fn capacity_evicts_oldest() {
        let guard = ReplayGuard::with_capacity(2);
        guard.remember(b"a", 100, 105);
        guard.remember(b"b", 103, 105);
        guard.remember(b"c", 104, 105);
        assert_eq!(guard.len(), 2);
        assert!(!guard.contains(b"a", 105));
        assert!(guard.contains(b"b", 105));
        assert!(guard.contains(b"c", 105));
    }
}
