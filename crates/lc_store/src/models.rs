//! Stored entities.
//!
//! Secret fields are `Zeroizing` so in-memory copies are wiped on drop, and
//! `Debug` never prints them.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::record::Record;

#[derive(Clone, PartialEq, Eq)]
pub struct AccountRecord {
    pub account_id: String,
    pub username: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub bio: Option<String>,
    pub avatar_url: String,
    /// ML-DSA-87 public key encoding.
    pub signature_public_key: Vec<u8>,
    /// ML-DSA-87 private key encoding. Vault-encrypted at rest.
    pub signature_private_key: Zeroizing<Vec<u8>>,
    pub version: i64,
}

impl fmt::Debug for AccountRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountRecord")
            .field("account_id", &self.account_id)
            .field("username", &self.username)
            .field("version", &self.version)
            .finish_non_exhaustive()
    }
}

impl Record for AccountRecord {
    fn key(&self) -> &str {
        &self.account_id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContactStatus {
    /// We sent a request and wait for the peer.
    Pending,
    /// The peer sent us a request.
    Request,
    Confirmed,
    Blocked,
}

impl ContactStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Request => "request",
            Self::Confirmed => "confirmed",
            Self::Blocked => "blocked",
        }
    }
}

impl fmt::Display for ContactStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContactStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "request" => Ok(Self::Request),
            "confirmed" => Ok(Self::Confirmed),
            "blocked" => Ok(Self::Blocked),
            other => Err(format!("unknown contact status {other:?}")),
        }
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct ContactRecord {
    pub contact_id: String,
    pub username: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub bio: Option<String>,
    pub avatar_url: String,
    pub status: ContactStatus,
    /// ML-KEM-1024 pair generated for this relationship only.
    pub own_kem_public_key: Option<Vec<u8>>,
    pub own_kem_secret_key: Option<Zeroizing<Vec<u8>>>,
    pub peer_signature_public_key: Option<Vec<u8>>,
    pub peer_kem_public_key: Option<Vec<u8>>,
    pub version: i64,
}

impl fmt::Debug for ContactRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContactRecord")
            .field("contact_id", &self.contact_id)
            .field("username", &self.username)
            .field("status", &self.status)
            .field("complete_keys", &self.has_complete_key_material())
            .field("version", &self.version)
            .finish_non_exhaustive()
    }
}

impl Record for ContactRecord {
    fn key(&self) -> &str {
        &self.contact_id
    }
}

impl ContactRecord {
    /// `"first last"` with missing parts dropped.
    pub fn full_name(&self) -> String {
        format!(
            "{} {}",
            self.first_name.as_deref().unwrap_or_default(),
            self.last_name.as_deref().unwrap_or_default()
        )
        .trim()
        .to_string()
    }

    /// Own key pair plus both peer keys, i.e. the handshake completed.
    pub fn has_complete_key_material(&self) -> bool {
        self.own_kem_public_key.is_some()
            && self.own_kem_secret_key.is_some()
            && self.peer_signature_public_key.is_some()
            && self.peer_kem_public_key.is_some()
    }

    /// Case-insensitive substring match over username and full name.
    /// A blank query matches everything.
    pub fn matches(&self, query: &str) -> bool {
        let query = query.trim();
        if query.is_empty() {
            return true;
        }
        let needle = query.to_lowercase();
        self.username.to_lowercase().contains(&needle)
            || self.full_name().to_lowercase().contains(&needle)
    }
}

/// A handshake signature already acted on. Outlives the contact it created,
/// so a captured handshake stays dead after delete and re-add.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeenHandshake {
    /// Hex BLAKE3 of the handshake signature.
    pub digest: String,
    pub contact_id: String,
    /// Unix seconds when first accepted.
    pub seen_at: i64,
}

impl Record for SeenHandshake {
    fn key(&self) -> &str {
        &self.digest
    }
}
