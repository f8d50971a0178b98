//! Push-channel wire types.
//!
//! The channel is a WebSocket carrying JSON text frames. Method invocations
//! carry an opaque binary payload (base64 in JSON); for the `Contact` method
//! that payload is a canonically encoded `ContactHubMessage`.
//!
//! Connections authenticate with a token of the form
//! `base64(ChannelAuthPayload) | base64(signature)`, minted fresh for every
//! connection attempt.

use std::fmt;
use std::str::FromStr;

use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};

use crate::envelope::Timestamped;
use crate::error::ProtoError;

/// Inbound contact-protocol method name.
pub const CONTACT_METHOD: &str = "Contact";

/// Random padding length bounds for `ChannelAuthPayload::random_bytes`.
pub const TOKEN_RANDOM_MIN: usize = 20;
pub const TOKEN_RANDOM_MAX: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChannelFrame {
    Invocation {
        method: String,
        #[serde(with = "b64")]
        payload: Vec<u8>,
    },
    Ping,
    Pong,
    Close {
        #[serde(default)]
        reason: Option<String>,
    },
}

impl ChannelFrame {
    pub fn invocation(method: impl Into<String>, payload: Vec<u8>) -> Self {
        Self::Invocation { method: method.into(), payload }
    }

    pub fn to_json(&self) -> Result<String, ProtoError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(text: &str) -> Result<Self, ProtoError> {
        Ok(serde_json::from_str(text)?)
    }
}

mod b64 {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        STANDARD.decode(s).map_err(serde::de::Error::custom)
    }
}

// ── Contact hub messages ─────────────────────────────────────────────────────

/// Closed set of contact message kinds. Unknown discriminants fail to decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContactMessageKind {
    NewRequest,
    ConfirmedRequest,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactHubMessage {
    pub kind: ContactMessageKind,
    /// Canonical `HandshakePayload` bytes, as signed by the sender.
    pub payload: Vec<u8>,
    pub payload_signature: Vec<u8>,
    pub timestamp: i64,
}

impl Timestamped for ContactHubMessage {
    fn timestamp(&self) -> i64 {
        self.timestamp
    }
}

// ── Channel authentication ───────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelAuthPayload {
    pub account_id: String,
    pub timestamp: i64,
    pub random_bytes: Vec<u8>,
}

impl Timestamped for ChannelAuthPayload {
    fn timestamp(&self) -> i64 {
        self.timestamp
    }
}

/// Bearer credential for one connection attempt.
#[derive(Clone, PartialEq, Eq)]
pub struct ChannelToken {
    pub payload: Vec<u8>,
    pub signature: Vec<u8>,
}

impl fmt::Debug for ChannelToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelToken")
            .field("payload_len", &self.payload.len())
            .finish_non_exhaustive()
    }
}

impl fmt::Display for ChannelToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", STANDARD.encode(&self.payload), STANDARD.encode(&self.signature))
    }
}

impl FromStr for ChannelToken {
    type Err = ProtoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (payload, signature) = s
            .split_once('|')
            .ok_or_else(|| ProtoError::Token("missing separator".into()))?;
        if signature.contains('|') {
            return Err(ProtoError::Token("too many separators".into()));
        }
        Ok(Self {
            payload: STANDARD.decode(payload)?,
            signature: STANDARD.decode(signature)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{from_canonical_bytes, to_canonical_bytes};

    #[test]
    fn invocation_frame_json_shape() {
        let frame = ChannelFrame::invocation(CONTACT_METHOD, vec![0xde, 0xad]);
        let json = frame.to_json().unwrap();
        assert_eq!(json, r#"{"type":"invocation","method":"Contact","payload":"3q0="}"#);
        assert_eq!(ChannelFrame::from_json(&json).unwrap(), frame);
    }

    #[test]
    fn close_without_reason_parses() {
        let frame = ChannelFrame::from_json(r#"{"type":"close"}"#).unwrap();
        assert_eq!(frame, ChannelFrame::Close { reason: None });
        assert!(ChannelFrame::from_json(r#"{"type":"telemetry"}"#).is_err());
    }

    #[test]
    fn unknown_contact_kind_fails_to_decode() {
        let msg = ContactHubMessage {
            kind: ContactMessageKind::ConfirmedRequest,
            payload: vec![1],
            payload_signature: vec![2],
            timestamp: 7,
        };
        let mut bytes = to_canonical_bytes(&msg).unwrap();
        assert_eq!(from_canonical_bytes::<ContactHubMessage>(&bytes).unwrap(), msg);
        // variant index is the leading u32
        bytes[0] = 9;
        assert!(from_canonical_bytes::<ContactHubMessage>(&bytes).is_err());
    }

    #[test]
    fn token_text_form() {
        let token = ChannelToken { payload: vec![1, 2, 3], signature: vec![4, 5] };
        let text = token.to_string();
        assert_eq!(text, "AQID|BAU=");
        assert_eq!(text.parse::<ChannelToken>().unwrap(), token);
        assert!("AQID".parse::<ChannelToken>().is_err());
        assert!("AQID|BAU=|x".parse::<ChannelToken>().is_err());
    }
}
