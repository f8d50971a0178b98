//! Routes `Contact` invocations from the push channel into `ContactExchange`.

use std::sync::Arc;

use lc_proto::channel::{ContactHubMessage, ContactMessageKind, CONTACT_METHOD};
use lc_proto::codec::from_canonical_bytes;
use lc_proto::{is_fresh, now_unix};

use crate::channel::{PushChannel, ReplayGuard};
use crate::contacts::{ContactExchange, InboundDisposition};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Handled(InboundDisposition),
    Malformed,
    Stale,
    Replayed,
}

pub struct ContactDispatcher {
    contacts: Arc<ContactExchange>,
    replay: ReplayGuard,
}

impl ContactDispatcher {
    pub fn new(contacts: Arc<ContactExchange>) -> Self {
        Self { contacts, replay: ReplayGuard::default() }
    }

    pub async fn dispatch(&self, data: &[u8]) -> DispatchOutcome {
        self.dispatch_at(data, now_unix()).await
    }

    /// Decode, check freshness and replay, then hand the message to the
    /// matching `ContactExchange` handler. Rejected messages are dropped
    /// without touching stored state. Only accepted or ignored messages are
    /// remembered as seen.
    pub async fn dispatch_at(&self, data: &[u8], now: i64) -> DispatchOutcome {
        let message: ContactHubMessage = match from_canonical_bytes(data) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(error = %e, "[dispatch] undecodable contact message dropped");
                return DispatchOutcome::Malformed;
            }
        };

        if !is_fresh(message.timestamp, now) {
            tracing::warn!(timestamp = message.timestamp, now, "[dispatch] stale contact message dropped");
            return DispatchOutcome::Stale;
        }
        if self.replay.contains(&message.payload_signature, now) {
            tracing::warn!("[dispatch] replayed contact message dropped");
            return DispatchOutcome::Replayed;
        }

        let disposition = match message.kind {
            ContactMessageKind::NewRequest => {
                self.contacts
                    .handle_new_request(&message.payload, &message.payload_signature)
                    .await
            }
            ContactMessageKind::ConfirmedRequest => {
                self.contacts
                    .handle_confirmation(&message.payload, &message.payload_signature)
                    .await
            }
        };
        // Transient failures stay retryable.
        if matches!(disposition, InboundDisposition::Accepted | InboundDisposition::Ignored) {
            self.replay.remember(&message.payload_signature, message.timestamp, now);
        }
        tracing::debug!(kind = ?message.kind, ?disposition, "[dispatch] contact message handled");
        DispatchOutcome::Handled(disposition)
    }

    /// Install this dispatcher as the channel's `Contact` handler.
    pub fn attach(self: &Arc<Self>, channel: &PushChannel) {
        let dispatcher = Arc::clone(self);
        channel.on(CONTACT_METHOD, move |data| {
            let dispatcher = Arc::clone(&dispatcher);
            async move {
                dispatcher.dispatch(&data).await;
            }
        });
    }
}
