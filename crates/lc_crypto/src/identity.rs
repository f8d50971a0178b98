//! Identity key management
//!
//! Each account has exactly one long-term `SigningIdentity` (ML-DSA-87).
//! The account id is not assigned by any server: it is derived from the
//! public key as `base64(SHAKE256(public_key, 64))` and every verifier
//! recomputes it instead of trusting the claimed value.
//!
//! Key material is kept as raw FIPS 204 encodings so the store and wire
//! layers never see library types. The secret encoding is zeroized on drop.

use base64::{engine::general_purpose::STANDARD, Engine};
use fips204::ml_dsa_87;
use fips204::traits::{SerDes, Signer as _, Verifier as _};
use zeroize::ZeroizeOnDrop;

use crate::error::CryptoError;
use crate::hash::shake256;

/// Output length of the SHAKE-256 identity hash.
pub const ACCOUNT_ID_HASH_LEN: usize = 64;

/// ML-DSA-87 encoded public key length.
pub const PUBLIC_KEY_LEN: usize = ml_dsa_87::PK_LEN;
/// ML-DSA-87 encoded private key length.
pub const SECRET_KEY_LEN: usize = ml_dsa_87::SK_LEN;
/// ML-DSA-87 signature length.
pub const SIGNATURE_LEN: usize = ml_dsa_87::SIG_LEN;

/// Empty context string; signatures are bound to the payload bytes only.
const SIGNING_CONTEXT: &[u8] = b"";

/// Derive the account id for a signature public key.
pub fn account_id_for(public_key: &[u8]) -> String {
    STANDARD.encode(shake256(public_key, ACCOUNT_ID_HASH_LEN))
}

// ── Public key newtype ────────────────────────────────────────────────────────

/// Encoded ML-DSA-87 public key, standard base64 on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SignaturePublicKey(pub Vec<u8>);

impl SignaturePublicKey {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_b64(&self) -> String {
        STANDARD.encode(&self.0)
    }

    pub fn from_b64(s: &str) -> Result<Self, CryptoError> {
        let bytes = STANDARD.decode(s)?;
        Self::from_bytes(bytes)
    }

    /// Accepts only encodings that parse as an ML-DSA-87 public key.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, CryptoError> {
        parse_public(&bytes)?;
        Ok(Self(bytes))
    }

    pub fn account_id(&self) -> String {
        account_id_for(&self.0)
    }

    /// Human-readable fingerprint: BLAKE3 of the key truncated to 20 bytes,
    /// hex-encoded in groups of 4 for side-by-side comparison.
    pub fn fingerprint(&self) -> String {
        let hash = blake3::hash(&self.0);
        let hex = hex::encode(&hash.as_bytes()[..20]);
        hex.chars()
            .collect::<Vec<_>>()
            .chunks(4)
            .map(|c| c.iter().collect::<String>())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

// ── Signing identity ──────────────────────────────────────────────────────────

/// Long-term account signing key. Drop clears the secret encoding.
#[derive(Clone, ZeroizeOnDrop)]
pub struct SigningIdentity {
    #[zeroize(skip)]
    pub public: SignaturePublicKey,
    secret_bytes: Vec<u8>,
}

impl std::fmt::Debug for SigningIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningIdentity")
            .field("account_id", &self.account_id())
            .finish_non_exhaustive()
    }
}

impl SigningIdentity {
    pub fn generate() -> Result<Self, CryptoError> {
        let (pk, sk) =
            ml_dsa_87::try_keygen().map_err(|e| CryptoError::KeyGeneration(e.to_string()))?;
        Ok(Self {
            public: SignaturePublicKey(pk.into_bytes().to_vec()),
            secret_bytes: sk.into_bytes().to_vec(),
        })
    }

    /// Rebuild an identity from stored encodings. Both halves must parse.
    pub fn from_bytes(public: &[u8], secret: &[u8]) -> Result<Self, CryptoError> {
        parse_public(public)?;
        parse_secret(secret)?;
        Ok(Self {
            public: SignaturePublicKey(public.to_vec()),
            secret_bytes: secret.to_vec(),
        })
    }

    pub fn secret_bytes(&self) -> &[u8] {
        &self.secret_bytes
    }

    pub fn public_b64(&self) -> String {
        self.public.to_b64()
    }

    pub fn account_id(&self) -> String {
        self.public.account_id()
    }

    /// Sign arbitrary bytes; returns the raw ML-DSA-87 signature.
    pub fn sign(&self, msg: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let sk = parse_secret(&self.secret_bytes)?;
        let sig = sk
            .try_sign(msg, SIGNING_CONTEXT)
            .map_err(|e| CryptoError::Signing(e.to_string()))?;
        Ok(sig.to_vec())
    }

    /// Verify a signature made by any ML-DSA-87 public key.
    pub fn verify(public_bytes: &[u8], msg: &[u8], sig_bytes: &[u8]) -> Result<(), CryptoError> {
        let pk = parse_public(public_bytes)?;
        let sig: [u8; SIGNATURE_LEN] = sig_bytes
            .try_into()
            .map_err(|_| CryptoError::SignatureVerification)?;
        if pk.verify(msg, &sig, SIGNING_CONTEXT) {
            Ok(())
        } else {
            Err(CryptoError::SignatureVerification)
        }
    }
}

fn parse_public(bytes: &[u8]) -> Result<ml_dsa_87::PublicKey, CryptoError> {
    let arr: [u8; PUBLIC_KEY_LEN] = bytes.try_into().map_err(|_| {
        CryptoError::InvalidKey(format!(
            "Signature public key must be {PUBLIC_KEY_LEN} bytes, got {}",
            bytes.len()
        ))
    })?;
    ml_dsa_87::PublicKey::try_from_bytes(arr).map_err(|e| CryptoError::InvalidKey(e.to_string()))
}

fn parse_secret(bytes: &[u8]) -> Result<ml_dsa_87::PrivateKey, CryptoError> {
    let arr: [u8; SECRET_KEY_LEN] = bytes.try_into().map_err(|_| {
        CryptoError::InvalidKey(format!(
            "Signature private key must be {SECRET_KEY_LEN} bytes, got {}",
            bytes.len()
        ))
    })?;
    ml_dsa_87::PrivateKey::try_from_bytes(arr).map_err(|e| CryptoError::InvalidKey(e.to_string()))
}
