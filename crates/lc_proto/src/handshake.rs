//! Contact handshake payload.
//!
//! Sent inside `ContactHandshakeRequest` when adding or confirming a contact,
//! and relayed to the recipient as a `ContactHubMessage`. The payload is
//! self-certifying: `sender_id` must equal the account id derived from
//! `signature_public_key`, and `payload_signature` must verify under that
//! same key. A verifier never trusts `sender_id` on its own.

use serde::{Deserialize, Serialize};

use lc_crypto::{account_id_for, kem, SigningIdentity};

use crate::codec::{from_canonical_bytes, to_canonical_bytes};
use crate::envelope::EnvelopeError;
use crate::error::ProtoError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandshakePayload {
    pub sender_id: String,
    /// ML-DSA-87 public key of the sender.
    pub signature_public_key: Vec<u8>,
    /// ML-KEM-1024 key generated for this relationship only.
    pub kem_public_key: Vec<u8>,
}

/// Encoded handshake and the sender's signature over it.
#[derive(Debug, Clone)]
pub struct SignedHandshake {
    pub payload: Vec<u8>,
    pub signature: Vec<u8>,
}

impl HandshakePayload {
    pub fn new(identity: &SigningIdentity, kem_public_key: Vec<u8>) -> Self {
        Self {
            sender_id: identity.account_id(),
            signature_public_key: identity.public.as_bytes().to_vec(),
            kem_public_key,
        }
    }

    pub fn sign(&self, identity: &SigningIdentity) -> Result<SignedHandshake, ProtoError> {
        let payload = to_canonical_bytes(self)?;
        let signature = identity.sign(&payload)?;
        Ok(SignedHandshake { payload, signature })
    }

    /// Decode and check a received handshake: id/hash binding first, then
    /// the signature, then the shape of the KEM key.
    pub fn open(payload: &[u8], signature: &[u8]) -> Result<Self, EnvelopeError> {
        let hs: Self =
            from_canonical_bytes(payload).map_err(|e| EnvelopeError::Malformed(e.to_string()))?;

        if account_id_for(&hs.signature_public_key) != hs.sender_id {
            return Err(EnvelopeError::IdentityMismatch);
        }
        SigningIdentity::verify(&hs.signature_public_key, payload, signature)
            .map_err(|_| EnvelopeError::BadSignature)?;
        kem::validate_public_key(&hs.kem_public_key)
            .map_err(|e| EnvelopeError::Malformed(e.to_string()))?;
        Ok(hs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lc_crypto::RelationshipKeyPair;

    fn signed() -> (SigningIdentity, HandshakePayload, SignedHandshake) {
        let id = SigningIdentity::generate().unwrap();
        let kem = RelationshipKeyPair::generate().unwrap();
        let hs = HandshakePayload::new(&id, kem.public.clone());
        let signed = hs.sign(&id).unwrap();
        (id, hs, signed)
    }

    #[test]
    fn valid_handshake_opens() {
        let (id, hs, signed) = signed();
        let opened = HandshakePayload::open(&signed.payload, &signed.signature).unwrap();
        assert_eq!(opened, hs);
        assert_eq!(opened.sender_id, id.account_id());
    }

    #[test]
    fn claimed_id_must_match_key_hash() {
        let (id, mut hs, _) = signed();
        hs.sender_id = SigningIdentity::generate().unwrap().account_id();
        // correctly signed by the key holder, but claiming someone else's id
        let forged = hs.sign(&id).unwrap();
        assert_eq!(
            HandshakePayload::open(&forged.payload, &forged.signature).unwrap_err(),
            EnvelopeError::IdentityMismatch
        );
    }

    #[test]
    fn signature_from_other_key_rejected() {
        let (_, _, signed) = signed();
        let mallory = SigningIdentity::generate().unwrap();
        let sig = mallory.sign(&signed.payload).unwrap();
        assert_eq!(
            HandshakePayload::open(&signed.payload, &sig).unwrap_err(),
            EnvelopeError::BadSignature
        );
    }

    #[test]
    fn bad_kem_key_rejected() {
        let id = SigningIdentity::generate().unwrap();
        let signed = HandshakePayload::new(&id, vec![0u8; 12]).sign(&id).unwrap();
        assert!(matches!(
            HandshakePayload::open(&signed.payload, &signed.signature),
            Err(EnvelopeError::Malformed(_))
        ));
    }
}
