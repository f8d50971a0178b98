//! Hash utilities
//!
//! - SHAKE-256 with caller-chosen output length (identity derivation)
//! - SHAKE-128 over UTF-8 text (admission puzzle)
//! - BLAKE3 digests for local bookkeeping (replay cache keys, fingerprints)

use sha3::{
    digest::{ExtendableOutput, Update, XofReader},
    Shake128, Shake256,
};

/// Output length of the admission puzzle hash.
pub const SHAKE128_OUTPUT_LEN: usize = 32;

/// SHAKE-256 of `data`, squeezed to `output_len` bytes.
pub fn shake256(data: &[u8], output_len: usize) -> Vec<u8> {
    let mut hasher = Shake256::default();
    hasher.update(data);
    let mut reader = hasher.finalize_xof();
    let mut out = vec![0u8; output_len];
    reader.read(&mut out);
    out
}

/// SHAKE-128 of the UTF-8 bytes of `text`, squeezed to 32 bytes.
pub fn shake128_str(text: &str) -> [u8; SHAKE128_OUTPUT_LEN] {
    let mut hasher = Shake128::default();
    hasher.update(text.as_bytes());
    let mut reader = hasher.finalize_xof();
    let mut out = [0u8; SHAKE128_OUTPUT_LEN];
    reader.read(&mut out);
    out
}

/// BLAKE3 digest, used where only local uniqueness matters.
pub fn digest(data: &[u8]) -> [u8; 32] {
    blake3::hash(data).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shake256_respects_output_length() {
        assert_eq!(shake256(b"abc", 64).len(), 64);
        assert_eq!(shake256(b"abc", 32).len(), 32);
        // XOF: shorter output is a prefix of the longer one
        assert_eq!(&shake256(b"abc", 64)[..32], shake256(b"abc", 32).as_slice());
    }

    #[test]
    fn shake128_is_deterministic() {
        assert_eq!(shake128_str("key+nonce"), shake128_str("key+nonce"));
        assert_ne!(shake128_str("key+nonce"), shake128_str("key+nonce2"));
    }

    #[test]
    fn shake256_known_answer() {
        // FIPS 202 SHAKE256("") first 8 bytes
        assert_eq!(hex::encode(&shake256(b"", 8)), "46b9dd2b0ba88d13");
    }
}
