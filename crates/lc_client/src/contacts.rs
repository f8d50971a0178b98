//! Contact relationship state machine.
//!
//! ```text
//! Unknown ──add──────────▶ Pending ──confirmation──▶ Confirmed
//! Unknown ──inbound req──▶ Request ──confirm───────▶ Confirmed
//!                          Request ──reject────────▶ (removed)
//!                          Request ──reject+block──▶ Blocked
//! Confirmed ──delete──▶ (removed)      Confirmed ⇄ Blocked
//! ```
//!
//! Every relationship gets its own fresh ML-KEM key pair; key pairs are never
//! reused across contacts.
//!
//! The durable store is the source of truth. Each mutation writes the store
//! first and then the in-memory view, so a failed write leaves the view as
//! it was. The view is a single ordered map keyed by contact id with status
//! as a field; per-status lists are derived from it on demand. Locks on the
//! view are never held across an await.
//!
//! Handshakes carry no time or nonce of their own, so every accepted one is
//! remembered by signature digest in a separate store. Those entries are
//! never removed with the contact, and a captured handshake cannot revive a
//! relationship after delete and re-add.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::watch;

use lc_crypto::{hash, RelationshipKeyPair};
use lc_proto::api::{routes, ContactHandshakeRequest, DirectoryRecord, FindContact};
use lc_proto::{is_fresh, now_unix, HandshakePayload};
use lc_store::{ContactRecord, ContactStatus, RecordStore, SeenHandshake, StoreError};
use zeroize::Zeroizing;

use crate::api::ApiClient;
use crate::collaborators::Notifier;
use crate::error::ClientError;
use crate::session::SessionCache;

/// What a list row needs; no key material.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContactEntry {
    pub contact_id: String,
    pub username: String,
    pub full_name: String,
    pub avatar_url: String,
    pub version: i64,
    pub status: ContactStatus,
}

impl From<&ContactRecord> for ContactEntry {
    fn from(c: &ContactRecord) -> Self {
        Self {
            contact_id: c.contact_id.clone(),
            username: c.username.clone(),
            full_name: c.full_name(),
            avatar_url: c.avatar_url.clone(),
            version: c.version,
            status: c.status,
        }
    }
}

/// Result of processing an inbound handshake. Everything except `Accepted`
/// is a silent drop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboundDisposition {
    Accepted,
    /// A local record already exists (or, for confirmations, none is pending).
    Ignored,
    /// Identity/hash mismatch, bad signature or malformed payload.
    Invalid,
    /// The handshake was accepted once before.
    Replayed,
    /// The sender could not be resolved in the directory.
    Unresolved,
    /// The local store refused the write.
    Failed,
}

pub struct ContactExchange {
    session: SessionCache,
    api: ApiClient,
    store: Arc<dyn RecordStore<ContactRecord>>,
    seen: Arc<dyn RecordStore<SeenHandshake>>,
    notifier: Arc<dyn Notifier>,
    view: RwLock<BTreeMap<String, ContactRecord>>,
    request_count: watch::Sender<usize>,
}

impl ContactExchange {
    pub fn new(
        session: SessionCache,
        api: ApiClient,
        store: Arc<dyn RecordStore<ContactRecord>>,
        seen: Arc<dyn RecordStore<SeenHandshake>>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let (request_count, _) = watch::channel(0);
        Self {
            session,
            api,
            store,
            seen,
            notifier,
            view: RwLock::new(BTreeMap::new()),
            request_count,
        }
    }

    // ── View ─────────────────────────────────────────────────────────────────

    /// Rebuild the view from the store.
    pub async fn load(&self) -> bool {
        let records = match self.store.get_all().await {
            Ok(records) => records,
            Err(e) => {
                tracing::warn!(error = %e, "[contacts] load failed");
                return false;
            }
        };
        let map: BTreeMap<_, _> = records
            .into_iter()
            .map(|c| (c.contact_id.clone(), c))
            .collect();
        tracing::debug!(count = map.len(), "[contacts] view rebuilt");
        *self.view.write() = map;
        self.publish_request_count();
        true
    }

    /// Contacts in `status` whose username or full name contains `query`
    /// (case-insensitive). A blank query returns all of them.
    pub fn view(&self, status: ContactStatus, query: &str) -> Vec<ContactEntry> {
        self.view
            .read()
            .values()
            .filter(|c| c.status == status && c.matches(query))
            .map(ContactEntry::from)
            .collect()
    }

    pub fn entry(&self, contact_id: &str) -> Option<ContactEntry> {
        self.view.read().get(contact_id).map(ContactEntry::from)
    }

    pub fn pending_request_count(&self) -> usize {
        *self.request_count.borrow()
    }

    pub fn watch_request_count(&self) -> watch::Receiver<usize> {
        self.request_count.subscribe()
    }

    fn publish_request_count(&self) {
        let count = self
            .view
            .read()
            .values()
            .filter(|c| c.status == ContactStatus::Request)
            .count();
        self.request_count.send_if_modified(|current| {
            let changed = *current != count;
            *current = count;
            changed
        });
    }

    fn view_put(&self, record: ContactRecord) {
        self.view.write().insert(record.contact_id.clone(), record);
        self.publish_request_count();
    }

    fn view_remove(&self, contact_id: &str) {
        self.view.write().remove(contact_id);
        self.publish_request_count();
    }

    // ── Discovery ────────────────────────────────────────────────────────────

    /// Look up a user by username or account id. `None` for blank input,
    /// self-lookups, already-known contacts, transport failures and stale
    /// directory responses.
    pub async fn find_contact(&self, identifier: &str) -> Option<DirectoryRecord> {
        let identifier = identifier.trim();
        if identifier.is_empty() {
            return None;
        }
        let signer = self.session.signer().ok()?;
        if identifier == signer.account_id() || self.session.username().as_deref() == Some(identifier) {
            return None;
        }
        match self.store.get(identifier).await {
            Ok(None) => {}
            Ok(Some(_)) => return None,
            Err(e) => {
                tracing::warn!(error = %e, "[contacts] local lookup failed");
                return None;
            }
        }

        let payload = FindContact {
            contact_identifier: identifier.to_string(),
            account_id: signer.account_id().to_string(),
            timestamp: now_unix(),
        };
        let record: DirectoryRecord = match self
            .api
            .post_signed(routes::FIND_CONTACT, &payload, &signer)
            .await
            .and_then(|res| res.json())
        {
            Ok(record) => record,
            Err(e) => {
                tracing::debug!(error = %e, "[contacts] find failed");
                return None;
            }
        };
        if !is_fresh(record.timestamp, now_unix()) {
            tracing::warn!(contact_id = %record.contact_id, "[contacts] stale directory record dropped");
            return None;
        }
        Some(record)
    }

    // ── Outbound ─────────────────────────────────────────────────────────────

    /// Unknown → Pending. Sends a signed handshake with a fresh KEM key.
    pub async fn add_contact(&self, directory: &DirectoryRecord) -> bool {
        match self.try_add_contact(directory).await {
            Ok(added) => added,
            Err(e) => {
                tracing::warn!(contact_id = %directory.contact_id, error = %e, "[contacts] add failed");
                false
            }
        }
    }

    async fn try_add_contact(&self, directory: &DirectoryRecord) -> Result<bool, ClientError> {
        if self.store.get(&directory.contact_id).await?.is_some() {
            return Ok(false);
        }
        let kem = RelationshipKeyPair::generate()?;
        self.send_handshake(routes::ADD_CONTACT, &directory.contact_id, &kem).await?;

        let record = ContactRecord {
            contact_id: directory.contact_id.clone(),
            username: directory.username.clone(),
            first_name: directory.first_name.clone(),
            last_name: directory.last_name.clone(),
            bio: directory.bio.clone(),
            avatar_url: directory.avatar_url.clone(),
            status: ContactStatus::Pending,
            own_kem_public_key: Some(kem.public.clone()),
            own_kem_secret_key: Some(Zeroizing::new(kem.secret_bytes().to_vec())),
            peer_signature_public_key: None,
            peer_kem_public_key: None,
            version: directory.version,
        };
        if let Err(e) = self.store.save(&record).await {
            tracing::warn!(
                contact_id = %record.contact_id,
                error = %e,
                "[contacts] request sent but not stored locally; the peer's confirmation will be ignored"
            );
            return Err(e.into());
        }
        tracing::info!(contact_id = %record.contact_id, "[contacts] request sent");
        self.view_put(record);
        Ok(true)
    }

    /// Request → Confirmed. Answers with a symmetric signed handshake so the
    /// requester's Pending record can complete.
    pub async fn confirm_contact(&self, contact_id: &str) -> bool {
        match self.try_confirm_contact(contact_id).await {
            Ok(done) => done,
            Err(e) => {
                tracing::warn!(%contact_id, error = %e, "[contacts] confirm failed");
                false
            }
        }
    }

    async fn try_confirm_contact(&self, contact_id: &str) -> Result<bool, ClientError> {
        let Some(mut record) = self.stored_with_status(contact_id, ContactStatus::Request).await? else {
            return Ok(false);
        };
        let kem = RelationshipKeyPair::generate()?;
        self.send_handshake(routes::CONFIRM_CONTACT, contact_id, &kem).await?;

        record.status = ContactStatus::Confirmed;
        record.own_kem_public_key = Some(kem.public.clone());
        record.own_kem_secret_key = Some(Zeroizing::new(kem.secret_bytes().to_vec()));
        self.store.update(&record).await?;
        tracing::info!(%contact_id, "[contacts] request confirmed");
        self.view_put(record);
        Ok(true)
    }

    async fn send_handshake(
        &self,
        route: &str,
        recipient_id: &str,
        kem: &RelationshipKeyPair,
    ) -> Result<(), ClientError> {
        let signer = self.session.signer()?;
        let signed = HandshakePayload::new(signer.identity(), kem.public.clone()).sign(signer.identity())?;
        let request = ContactHandshakeRequest {
            recipient_id: recipient_id.to_string(),
            payload: signed.payload,
            payload_signature: signed.signature,
            timestamp: now_unix(),
        };
        self.api.post_signed(route, &request, &signer).await?;
        Ok(())
    }

    // ── Inbound ──────────────────────────────────────────────────────────────

    /// Unknown → Request on a validated handshake from a new sender.
    pub async fn handle_new_request(&self, payload: &[u8], signature: &[u8]) -> InboundDisposition {
        let handshake = match HandshakePayload::open(payload, signature) {
            Ok(hs) => hs,
            Err(e) => {
                tracing::debug!(error = %e, "[contacts] inbound request dropped");
                return InboundDisposition::Invalid;
            }
        };
        let digest = handshake_digest(signature);
        if let Some(disposition) = self.check_unseen(&digest).await {
            return disposition;
        }
        match self.store.get(&handshake.sender_id).await {
            Ok(None) => {}
            Ok(Some(_)) => return InboundDisposition::Ignored,
            Err(e) => {
                tracing::warn!(error = %e, "[contacts] local lookup failed");
                return InboundDisposition::Failed;
            }
        }
        let Some(profile) = self.find_contact(&handshake.sender_id).await else {
            tracing::debug!(sender = %handshake.sender_id, "[contacts] sender not resolvable");
            return InboundDisposition::Unresolved;
        };
        if profile.contact_id != handshake.sender_id {
            return InboundDisposition::Invalid;
        }

        let record = ContactRecord {
            contact_id: profile.contact_id.clone(),
            username: profile.username.clone(),
            first_name: profile.first_name.clone(),
            last_name: profile.last_name.clone(),
            bio: profile.bio.clone(),
            avatar_url: profile.avatar_url.clone(),
            status: ContactStatus::Request,
            own_kem_public_key: None,
            own_kem_secret_key: None,
            peer_signature_public_key: Some(handshake.signature_public_key),
            peer_kem_public_key: Some(handshake.kem_public_key),
            version: profile.version,
        };
        if let Err(disposition) = self.claim(&digest, &record.contact_id).await {
            return disposition;
        }
        if let Err(e) = self.store.save(&record).await {
            tracing::warn!(error = %e, "[contacts] could not store request");
            self.release(&digest).await;
            return InboundDisposition::Failed;
        }
        self.notifier.notify("New contact request", &profile.username);
        tracing::info!(contact_id = %record.contact_id, "[contacts] request received");
        self.view_put(record);
        InboundDisposition::Accepted
    }

    /// Pending → Confirmed when the contact we asked answers with a valid
    /// handshake of its own.
    pub async fn handle_confirmation(&self, payload: &[u8], signature: &[u8]) -> InboundDisposition {
        let handshake = match HandshakePayload::open(payload, signature) {
            Ok(hs) => hs,
            Err(e) => {
                tracing::debug!(error = %e, "[contacts] inbound confirmation dropped");
                return InboundDisposition::Invalid;
            }
        };
        let digest = handshake_digest(signature);
        if let Some(disposition) = self.check_unseen(&digest).await {
            return disposition;
        }
        let mut record = match self
            .stored_with_status(&handshake.sender_id, ContactStatus::Pending)
            .await
        {
            Ok(Some(record)) => record,
            Ok(None) => return InboundDisposition::Ignored,
            Err(e) => {
                tracing::warn!(error = %e, "[contacts] local lookup failed");
                return InboundDisposition::Failed;
            }
        };

        record.status = ContactStatus::Confirmed;
        record.peer_signature_public_key = Some(handshake.signature_public_key);
        record.peer_kem_public_key = Some(handshake.kem_public_key);
        if let Err(disposition) = self.claim(&digest, &record.contact_id).await {
            return disposition;
        }
        if let Err(e) = self.store.update(&record).await {
            tracing::warn!(error = %e, "[contacts] could not store confirmation");
            self.release(&digest).await;
            return InboundDisposition::Failed;
        }
        self.notifier.notify("Contact request accepted", &record.username);
        tracing::info!(contact_id = %record.contact_id, "[contacts] confirmed by peer");
        self.view_put(record);
        InboundDisposition::Accepted
    }

    /// `Some` when the handshake must be dropped before any other work.
    async fn check_unseen(&self, digest: &str) -> Option<InboundDisposition> {
        match self.seen.get(digest).await {
            Ok(None) => None,
            Ok(Some(seen)) => {
                tracing::warn!(
                    contact_id = %seen.contact_id,
                    first_seen = seen.seen_at,
                    "[contacts] handshake replay dropped"
                );
                Some(InboundDisposition::Replayed)
            }
            Err(e) => {
                tracing::warn!(error = %e, "[contacts] seen-handshake lookup failed");
                Some(InboundDisposition::Failed)
            }
        }
    }

    /// Record the handshake as used. A concurrent duplicate loses on `Conflict`.
    async fn claim(&self, digest: &str, contact_id: &str) -> Result<(), InboundDisposition> {
        let seen = SeenHandshake {
            digest: digest.to_string(),
            contact_id: contact_id.to_string(),
            seen_at: now_unix(),
        };
        match self.seen.save(&seen).await {
            Ok(()) => Ok(()),
            Err(StoreError::Conflict(_)) => {
                tracing::warn!(%contact_id, "[contacts] handshake replay dropped");
                Err(InboundDisposition::Replayed)
            }
            Err(e) => {
                tracing::warn!(error = %e, "[contacts] could not record handshake");
                Err(InboundDisposition::Failed)
            }
        }
    }

    /// Undo `claim` when the contact write failed, so a retry is not a replay.
    async fn release(&self, digest: &str) {
        if let Err(e) = self.seen.delete(digest).await {
            tracing::warn!(error = %e, "[contacts] could not release handshake claim");
        }
    }

    // ── Local transitions ────────────────────────────────────────────────────

    /// Request → removed. No network exchange.
    pub async fn reject_contact(&self, contact_id: &str) -> bool {
        self.remove_if(contact_id, ContactStatus::Request).await
    }

    /// Request → Blocked. No network exchange.
    pub async fn reject_and_block(&self, contact_id: &str) -> bool {
        self.restatus(contact_id, ContactStatus::Request, ContactStatus::Blocked).await
    }

    /// Confirmed → removed.
    pub async fn delete_contact(&self, contact_id: &str) -> bool {
        self.remove_if(contact_id, ContactStatus::Confirmed).await
    }

    /// Confirmed → Blocked.
    pub async fn block_contact(&self, contact_id: &str) -> bool {
        self.restatus(contact_id, ContactStatus::Confirmed, ContactStatus::Blocked).await
    }

    /// Blocked → Confirmed when the handshake completed; otherwise the record
    /// is deleted because there is nothing to return to.
    pub async fn unblock_contact(&self, contact_id: &str) -> bool {
        let record = match self.stored_with_status(contact_id, ContactStatus::Blocked).await {
            Ok(Some(record)) => record,
            Ok(None) => return false,
            Err(e) => {
                tracing::warn!(%contact_id, error = %e, "[contacts] unblock failed");
                return false;
            }
        };
        if record.has_complete_key_material() {
            self.restatus(contact_id, ContactStatus::Blocked, ContactStatus::Confirmed).await
        } else {
            tracing::info!(%contact_id, "[contacts] unblocked contact had no completed handshake, deleting");
            self.remove_if(contact_id, ContactStatus::Blocked).await
        }
    }

    async fn restatus(&self, contact_id: &str, from: ContactStatus, to: ContactStatus) -> bool {
        let mut record = match self.stored_with_status(contact_id, from).await {
            Ok(Some(record)) => record,
            Ok(None) => return false,
            Err(e) => {
                tracing::warn!(%contact_id, error = %e, "[contacts] transition failed");
                return false;
            }
        };
        record.status = to;
        if let Err(e) = self.store.update(&record).await {
            tracing::warn!(%contact_id, error = %e, "[contacts] transition not persisted");
            return false;
        }
        tracing::info!(%contact_id, %from, %to, "[contacts] status changed");
        self.view_put(record);
        true
    }

    async fn remove_if(&self, contact_id: &str, from: ContactStatus) -> bool {
        match self.stored_with_status(contact_id, from).await {
            Ok(Some(_)) => {}
            Ok(None) => return false,
            Err(e) => {
                tracing::warn!(%contact_id, error = %e, "[contacts] removal failed");
                return false;
            }
        }
        if let Err(e) = self.store.delete(contact_id).await {
            tracing::warn!(%contact_id, error = %e, "[contacts] removal not persisted");
            return false;
        }
        tracing::info!(%contact_id, %from, "[contacts] removed");
        self.view_remove(contact_id);
        true
    }

    async fn stored_with_status(
        &self,
        contact_id: &str,
        status: ContactStatus,
    ) -> Result<Option<ContactRecord>, ClientError> {
        Ok(self
            .store
            .get(contact_id)
            .await?
            .filter(|record| record.status == status))
    }
}

fn handshake_digest(signature: &[u8]) -> String {
    hex::encode(hash::digest(signature))
}
