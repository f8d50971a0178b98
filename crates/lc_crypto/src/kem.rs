//! Per-relationship key encapsulation (ML-KEM-1024).
//!
//! A fresh `RelationshipKeyPair` is generated for every contact
//! relationship and never reused across contacts. The public half travels
//! inside the handshake payload; the secret half stays in the local
//! contact record.

use fips203::ml_kem_1024;
use fips203::traits::{Decaps, Encaps, KeyGen, SerDes};
use zeroize::{ZeroizeOnDrop, Zeroizing};

use crate::error::CryptoError;

pub const PUBLIC_KEY_LEN: usize = ml_kem_1024::EK_LEN;
pub const SECRET_KEY_LEN: usize = ml_kem_1024::DK_LEN;
pub const CIPHERTEXT_LEN: usize = ml_kem_1024::CT_LEN;

#[derive(Clone, ZeroizeOnDrop)]
pub struct RelationshipKeyPair {
    #[zeroize(skip)]
    pub public: Vec<u8>,
    secret_bytes: Vec<u8>,
}

impl std::fmt::Debug for RelationshipKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelationshipKeyPair")
            .field("public_len", &self.public.len())
            .finish_non_exhaustive()
    }
}

impl RelationshipKeyPair {
    pub fn generate() -> Result<Self, CryptoError> {
        let (ek, dk) = ml_kem_1024::KG::try_keygen()
            .map_err(|e| CryptoError::KeyGeneration(e.to_string()))?;
        Ok(Self {
            public: ek.into_bytes().to_vec(),
            secret_bytes: dk.into_bytes().to_vec(),
        })
    }

    pub fn from_bytes(public: &[u8], secret: &[u8]) -> Result<Self, CryptoError> {
        validate_public_key(public)?;
        parse_secret(secret)?;
        Ok(Self {
            public: public.to_vec(),
            secret_bytes: secret.to_vec(),
        })
    }

    pub fn secret_bytes(&self) -> &[u8] {
        &self.secret_bytes
    }

    /// Recover the 32-byte shared secret from a peer's ciphertext.
    pub fn decapsulate(&self, ciphertext: &[u8]) -> Result<Zeroizing<[u8; 32]>, CryptoError> {
        let dk = parse_secret(&self.secret_bytes)?;
        let arr: [u8; CIPHERTEXT_LEN] = ciphertext
            .try_into()
            .map_err(|_| CryptoError::Encapsulation("ciphertext length".into()))?;
        let ct = ml_kem_1024::CipherText::try_from_bytes(arr)
            .map_err(|e| CryptoError::Encapsulation(e.to_string()))?;
        let ssk = dk
            .try_decaps(&ct)
            .map_err(|e| CryptoError::Encapsulation(e.to_string()))?;
        Ok(Zeroizing::new(ssk.into_bytes()))
    }
}

/// Encapsulate to a peer's public key. Returns `(ciphertext, shared_secret)`.
pub fn encapsulate(peer_public: &[u8]) -> Result<(Vec<u8>, Zeroizing<[u8; 32]>), CryptoError> {
    let ek = parse_public(peer_public)?;
    let (ssk, ct) = ek
        .try_encaps()
        .map_err(|e| CryptoError::Encapsulation(e.to_string()))?;
    Ok((ct.into_bytes().to_vec(), Zeroizing::new(ssk.into_bytes())))
}

/// Reject anything that is not a well-formed ML-KEM-1024 encapsulation key.
pub fn validate_public_key(bytes: &[u8]) -> Result<(), CryptoError> {
    parse_public(bytes).map(|_| ())
}

fn parse_public(bytes: &[u8]) -> Result<ml_kem_1024::EncapsKey, CryptoError> {
    let arr: [u8; PUBLIC_KEY_LEN] = bytes.try_into().map_err(|_| {
        CryptoError::InvalidKey(format!(
            "KEM public key must be {PUBLIC_KEY_LEN} bytes, got {}",
            bytes.len()
        ))
    })?;
    ml_kem_1024::EncapsKey::try_from_bytes(arr).map_err(|e| CryptoError::InvalidKey(e.to_string()))
}

fn parse_secret(bytes: &[u8]) -> Result<ml_kem_1024::DecapsKey, CryptoError> {
    let arr: [u8; SECRET_KEY_LEN] = bytes.try_into().map_err(|_| {
        CryptoError::InvalidKey(format!(
            "KEM secret key must be {SECRET_KEY_LEN} bytes, got {}",
            bytes.len()
        ))
    })?;
    ml_kem_1024::DecapsKey::try_from_bytes(arr).map_err(|e| CryptoError::InvalidKey(e.to_string()))
}
