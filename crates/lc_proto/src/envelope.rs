//! Signed request envelope.
//!
//! A `SignedRequest<T>` is the canonical encoding of a payload plus a
//! detached ML-DSA-87 signature over exactly those bytes. The payload carries
//! its own unix-seconds timestamp; a verifier accepts it only when the
//! signature holds under the claimed key AND the timestamp lies within
//! `FRESHNESS_WINDOW_SECS` of its own clock, in either direction.
//!
//! The envelope gives integrity and freshness only. Confidentiality is left
//! to TLS, and replay inside the window is handled by the receiver (see
//! `lc_client::channel::auth::ReplayGuard`).

use std::marker::PhantomData;

use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

use lc_crypto::SigningIdentity;

use crate::codec::{from_canonical_bytes, to_canonical_bytes};
use crate::error::ProtoError;

pub const FRESHNESS_WINDOW_SECS: u64 = 30;

/// Payloads that embed their creation time.
pub trait Timestamped {
    fn timestamp(&self) -> i64;
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EnvelopeError {
    #[error("Signature does not verify under the claimed key")]
    BadSignature,

    #[error("Timestamp {timestamp} outside the freshness window (now {now})")]
    Expired { timestamp: i64, now: i64 },

    #[error("Claimed sender id does not match the public key hash")]
    IdentityMismatch,

    #[error("Malformed payload: {0}")]
    Malformed(String),
}

pub fn now_unix() -> i64 {
    chrono::Utc::now().timestamp()
}

pub fn is_fresh(timestamp: i64, now: i64) -> bool {
    now.abs_diff(timestamp) <= FRESHNESS_WINDOW_SECS
}

/// Canonical payload bytes and the signature over them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedRequest<T> {
    pub body: Vec<u8>,
    pub signature: Vec<u8>,
    _payload: PhantomData<fn() -> T>,
}

impl<T> SignedRequest<T> {
    /// Wrap bytes received off the wire.
    pub fn from_parts(body: Vec<u8>, signature: Vec<u8>) -> Self {
        Self { body, signature, _payload: PhantomData }
    }

    /// Value for the `X-Signature` header.
    pub fn signature_b64(&self) -> String {
        STANDARD.encode(&self.signature)
    }
}

impl<T: Serialize> SignedRequest<T> {
    pub fn sign(payload: &T, signer: &SigningIdentity) -> Result<Self, ProtoError> {
        let body = to_canonical_bytes(payload)?;
        let signature = signer.sign(&body)?;
        Ok(Self::from_parts(body, signature))
    }
}

impl<T: DeserializeOwned + Timestamped> SignedRequest<T> {
    pub fn open(&self, signer_public_key: &[u8], now: i64) -> Result<T, EnvelopeError> {
        verify_envelope(&self.body, &self.signature, signer_public_key, now)
    }
}

/// Verify the signature, decode, then check freshness.
pub fn verify_envelope<T: DeserializeOwned + Timestamped>(
    body: &[u8],
    signature: &[u8],
    signer_public_key: &[u8],
    now: i64,
) -> Result<T, EnvelopeError> {
    SigningIdentity::verify(signer_public_key, body, signature)
        .map_err(|_| EnvelopeError::BadSignature)?;

    let payload: T =
        from_canonical_bytes(body).map_err(|e| EnvelopeError::Malformed(e.to_string()))?;

    let timestamp = payload.timestamp();
    if !is_fresh(timestamp, now) {
        return Err(EnvelopeError::Expired { timestamp, now });
    }
    Ok(payload)
}
