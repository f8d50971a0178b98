//! Canonical binary encoding.
//!
//! Signatures cover encoded bytes, so both sides must agree on one encoding:
//! fixed-width little-endian integers, length-prefixed sequences, enum
//! variants by index. Trailing bytes are rejected so a payload has exactly
//! one accepted encoding.

use bincode::Options;
use serde::{de::DeserializeOwned, Serialize};

use crate::error::ProtoError;

/// Upper bound on any single encoded payload (avatars included).
pub const MAX_PAYLOAD_LEN: u64 = 8 * 1024 * 1024;

fn options() -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .with_little_endian()
        .with_limit(MAX_PAYLOAD_LEN)
}

pub fn to_canonical_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>, ProtoError> {
    Ok(options().serialize(value)?)
}

pub fn from_canonical_bytes<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, ProtoError> {
    Ok(options().deserialize(bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Sample {
        id: String,
        key: Vec<u8>,
        ts: i64,
    }

    #[test]
    fn encoding_is_stable() {
        let s = Sample { id: "a".into(), key: vec![1, 2], ts: 5 };
        let a = to_canonical_bytes(&s).unwrap();
        let b = to_canonical_bytes(&s).unwrap();
        assert_eq!(a, b);
        // u64 len + 1 byte, u64 len + 2 bytes, i64
        assert_eq!(a.len(), 8 + 1 + 8 + 2 + 8);
        assert_eq!(from_canonical_bytes::<Sample>(&a).unwrap(), s);
    }

    #[test]
    fn trailing_bytes_rejected() {
        let mut bytes = to_canonical_bytes(&Sample { id: "a".into(), key: vec![], ts: 1 }).unwrap();
        bytes.push(0);
        assert!(from_canonical_bytes::<Sample>(&bytes).is_err());
    }

    #[test]
    fn truncated_input_rejected() {
        let bytes = to_canonical_bytes(&Sample { id: "abc".into(), key: vec![9; 4], ts: 1 }).unwrap();
        assert!(from_canonical_bytes::<Sample>(&bytes[..bytes.len() - 3]).is_err());
    }
}
