//! Request payloads, directory records and route names.
//!
//! Signed payloads are encoded canonically (see `codec`) and posted with an
//! `X-Signature` header. Field order is part of the wire format.

use serde::{Deserialize, Serialize};

use crate::envelope::Timestamped;

pub mod routes {
    pub const REGISTER: &str = "account/register";
    pub const UPDATE_USERNAME: &str = "account/update-username";
    pub const UPDATE_FULL_NAME: &str = "account/update-fullname";
    pub const UPDATE_BIO: &str = "account/update-bio";
    pub const UPDATE_AVATAR: &str = "account/update-avatar";
    pub const USERNAME_AVAILABLE: &str = "account/username-available";
    pub const FIND_CONTACT: &str = "contact/find";
    pub const ADD_CONTACT: &str = "contact/add";
    pub const CONFIRM_CONTACT: &str = "contact/confirm";
}

/// Header carrying the base64 signature of a signed body.
pub const SIGNATURE_HEADER: &str = "X-Signature";
pub const SIGNED_CONTENT_TYPE: &str = "application/octet-stream";

macro_rules! timestamped {
    ($($ty:ty),+ $(,)?) => {
        $(impl Timestamped for $ty {
            fn timestamp(&self) -> i64 {
                self.timestamp
            }
        })+
    };
}

// ── Account ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterAccount {
    pub account_id: String,
    pub username: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub signature_public_key: Vec<u8>,
    /// Admission puzzle hash.
    pub proof_of_work: String,
    pub proof_of_work_nonce: String,
    pub captcha_token: String,
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateUsername {
    pub account_id: String,
    pub username: String,
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateFullName {
    pub account_id: String,
    pub first_name: String,
    pub last_name: String,
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateBio {
    pub account_id: String,
    pub bio: String,
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateAvatar {
    pub account_id: String,
    pub avatar_data: Vec<u8>,
    /// Image format, e.g. `png`.
    pub format: String,
    pub timestamp: i64,
}

/// Unsigned JSON query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsernameAvailabilityRequest {
    pub username: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsernameAvailability {
    pub available: bool,
}

/// Profile fields as returned by the server after an avatar update.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvatarUpdated {
    pub avatar_url: String,
    pub version: i64,
}

// ── Contacts ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FindContact {
    /// Username or account id.
    pub contact_identifier: String,
    pub account_id: String,
    pub timestamp: i64,
}

/// Used for both `contact/add` and `contact/confirm`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactHandshakeRequest {
    pub recipient_id: String,
    /// Canonical `HandshakePayload` bytes.
    pub payload: Vec<u8>,
    pub payload_signature: Vec<u8>,
    pub timestamp: i64,
}

/// Directory entry returned by `contact/find` (JSON).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryRecord {
    pub contact_id: String,
    pub username: String,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
    pub avatar_url: String,
    pub version: i64,
    pub timestamp: i64,
}

impl DirectoryRecord {
    pub fn full_name(&self) -> String {
        full_name(self.first_name.as_deref(), self.last_name.as_deref())
    }
}

/// `"first last"` with missing parts dropped.
pub fn full_name(first: Option<&str>, last: Option<&str>) -> String {
    format!("{} {}", first.unwrap_or_default(), last.unwrap_or_default())
        .trim()
        .to_string()
}

timestamped!(
    RegisterAccount,
    UpdateUsername,
    UpdateFullName,
    UpdateBio,
    UpdateAvatar,
    FindContact,
    ContactHandshakeRequest,
    DirectoryRecord,
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directory_record_parses_camel_case_with_missing_optionals() {
        let json = r#"{
            "contactId": "abc==",
            "username": "alice",
            "firstName": "Alice",
            "avatarUrl": "https://cdn.example/a.png",
            "version": 3,
            "timestamp": 1700000000
        }"#;
        let rec: DirectoryRecord = serde_json::from_str(json).unwrap();
        assert_eq!(rec.contact_id, "abc==");
        assert_eq!(rec.last_name, None);
        assert_eq!(rec.full_name(), "Alice");
        assert_eq!(rec.timestamp(), 1_700_000_000);
    }

    #[test]
    fn full_name_trims() {
        assert_eq!(full_name(None, None), "");
        assert_eq!(full_name(None, Some("Lovelace")), "Lovelace");
        assert_eq!(full_name(Some("Ada"), Some("Lovelace")), "Ada Lovelace");
    }
}
