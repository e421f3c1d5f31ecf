//! Message protocol engine: encrypted text exchange, delivery/read
//! receipts, key reconciliation, and contact/conversation management.
//!
//! Missing or stale keys are not fatal: every such condition issues a key
//! request over the relay and reports [`SessionError::MissingKey`], so the
//! protocol heals itself once the peer's key response arrives.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use krypt_shared::protocol::{EncryptedPayload, ReceiptKind};
use krypt_shared::types::{ContentType, PeerUuid};
use krypt_store::{Contact, NewMessage};

use crate::error::{Result, SessionError};
use crate::events::{emit, SessionEvent};
use crate::session::SessionCtx;

pub struct MessageEngine {
    ctx: Arc<SessionCtx>,
}

impl MessageEngine {
    pub(crate) fn new(ctx: Arc<SessionCtx>) -> Self {
        Self { ctx }
    }

    // ------------------------------------------------------------------
    // Outbound
    // ------------------------------------------------------------------

    /// Encrypt and send a text message.  Returns the local message id.
    ///
    /// A transport failure still persists the message (undelivered) so the
    /// conversation shows it and the user can resend; delivery is never
    /// guaranteed.  An encrypt-time key failure is treated as a stale key:
    /// a fresh key request goes out and nothing is persisted.
    pub async fn send_text(&self, to: &PeerUuid, text: &str) -> Result<i64> {
        let contact = self.ctx.sendable_contact(to).await?;

        let payload = match self.ctx.crypto.encrypt_message(text, &contact.public_key) {
            Ok(p) => p,
            Err(e) => {
                warn!(to = %to.short(), error = %e, "encrypt failed, re-requesting key");
                self.ctx.transport.request_public_key(to).await;
                return Err(SessionError::MissingKey);
            }
        };

        let sent = self.ctx.transport.send_message(to, payload).await;

        let id = self.ctx.db()?.insert_message(&NewMessage {
            conversation_id: to.as_str().to_string(),
            from_uuid: self.ctx.identity.device_id.as_str().to_string(),
            content: text.to_string(),
            content_type: ContentType::Text,
            file_path: None,
            is_sent: true,
            is_delivered: false,
            is_read: false,
            timestamp: Utc::now(),
        })?;

        if sent {
            info!(msg_id = id, to = %to.short(), "message sent");
        } else {
            warn!(msg_id = id, to = %to.short(), "message send failed, stored undelivered");
        }
        Ok(id)
    }

    // ------------------------------------------------------------------
    // Inbound
    // ------------------------------------------------------------------

    /// Handle an inbound encrypted payload: decrypt, persist, receipt.
    ///
    /// A decrypt failure means our key and the sender's copy of it have
    /// diverged; the payload is dropped and a key request goes out instead.
    pub async fn receive(&self, from: &PeerUuid, payload: &EncryptedPayload) -> Result<()> {
        let text = match self
            .ctx
            .crypto
            .decrypt_message(payload, self.ctx.identity.private_key())
        {
            Ok(t) => t,
            Err(e) => {
                warn!(from = %from.short(), error = %e, "inbound decrypt failed, requesting key");
                self.ctx.transport.request_public_key(from).await;
                return Ok(());
            }
        };

        let id = self.ctx.db()?.insert_message(&NewMessage {
            conversation_id: from.as_str().to_string(),
            from_uuid: from.as_str().to_string(),
            content: text.clone(),
            content_type: ContentType::Text,
            file_path: None,
            is_sent: false,
            is_delivered: true,
            is_read: false,
            timestamp: Utc::now(),
        })?;

        self.ctx
            .transport
            .send_receipt(from, ReceiptKind::Delivered, Some(id))
            .await;

        if self.ctx.is_conversation_open(from) {
            self.ctx.db()?.mark_inbound_read(from.as_str())?;
            self.ctx
                .transport
                .send_receipt(from, ReceiptKind::ReadAll, None)
                .await;
        } else {
            emit(
                &self.ctx.events,
                SessionEvent::MessageReceived {
                    from: from.clone(),
                    message_id: id,
                    preview: text,
                },
            );
        }
        Ok(())
    }

    /// Apply a delivery or read receipt from a peer.  Idempotent.
    pub async fn receive_receipt(
        &self,
        from: &PeerUuid,
        kind: ReceiptKind,
        message_ref_id: Option<i64>,
    ) -> Result<()> {
        match kind {
            ReceiptKind::Delivered => match message_ref_id {
                Some(id) => {
                    self.ctx.db()?.mark_delivered(id)?;
                }
                None => warn!(from = %from.short(), "delivered receipt without message ref"),
            },
            ReceiptKind::ReadAll => {
                self.ctx.db()?.mark_outbound_read(from.as_str())?;
            }
        }
        Ok(())
    }

    /// Upsert a peer's public key.  Nickname and other local fields are
    /// preserved; previously failed messages are not resent automatically.
    pub fn reconcile_key(&self, target: &PeerUuid, public_key: &str) -> Result<()> {
        self.ctx
            .db()?
            .set_contact_public_key(target.as_str(), public_key)?;
        info!(target = %target.short(), "contact public key reconciled");
        emit(
            &self.ctx.events,
            SessionEvent::KeyReconciled {
                uuid: target.clone(),
            },
        );
        Ok(())
    }

    // ------------------------------------------------------------------
    // Contacts
    // ------------------------------------------------------------------

    /// Add a contact and immediately start the key exchange.
    pub async fn add_contact(&self, uuid: &PeerUuid, nickname: &str) -> Result<()> {
        self.ctx.transport.request_public_key(uuid).await;
        self.ctx.db()?.insert_contact(&Contact {
            uuid: uuid.as_str().to_string(),
            public_key: String::new(),
            nickname: nickname.to_string(),
            created_at: Utc::now(),
        })?;
        Ok(())
    }

    pub fn rename_contact(&self, uuid: &PeerUuid, nickname: &str) -> Result<bool> {
        Ok(self.ctx.db()?.update_nickname(uuid.as_str(), nickname)?)
    }

    /// Remove a contact along with its conversation.
    pub fn delete_contact(&self, uuid: &PeerUuid) -> Result<()> {
        let db = self.ctx.db()?;
        db.delete_contact(uuid.as_str())?;
        db.delete_conversation(uuid.as_str())?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Conversations
    // ------------------------------------------------------------------

    /// Open a conversation: inbound messages are marked read now and on
    /// arrival while it stays open, and a `read_all` receipt tells the peer.
    pub async fn open_conversation(&self, uuid: &PeerUuid) -> Result<()> {
        self.ctx.set_open_conversation(Some(uuid.clone()));
        self.ctx.db()?.mark_inbound_read(uuid.as_str())?;
        self.ctx
            .transport
            .send_receipt(uuid, ReceiptKind::ReadAll, None)
            .await;
        Ok(())
    }

    /// Close the open conversation.  In-flight sends are unaffected.
    pub fn close_conversation(&self) {
        self.ctx.set_open_conversation(None);
    }

    pub fn delete_message(&self, id: i64) -> Result<bool> {
        Ok(self.ctx.db()?.delete_message(id)?)
    }

    pub fn delete_conversation(&self, uuid: &PeerUuid) -> Result<usize> {
        Ok(self.ctx.db()?.delete_conversation(uuid.as_str())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{harness, peer_keypair, Sent};
    use krypt_shared::crypto::{CryptoProvider, SealedBoxCrypto};

    #[tokio::test]
    async fn send_to_unknown_contact_fails() {
        let h = harness();
        let engine = MessageEngine::new(h.ctx.clone());

        let err = engine
            .send_text(&PeerUuid::from("nobody"), "hi")
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::UnknownContact(_)));
        assert!(h.relay.sent().is_empty());
    }

    #[tokio::test]
    async fn send_without_key_requests_key_once_and_persists_nothing() {
        let h = harness();
        let engine = MessageEngine::new(h.ctx.clone());
        let peer = h.add_contact_without_key("peer-1", "alice");

        let err = engine.send_text(&peer, "hi").await.unwrap_err();
        assert!(matches!(err, SessionError::MissingKey));

        assert_eq!(h.relay.key_requests(), 1);
        assert_eq!(h.relay.messages().len(), 0);
        assert!(h
            .ctx
            .db()
            .unwrap()
            .get_messages_for_conversation(peer.as_str())
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn send_then_delivered_receipt() {
        let h = harness();
        let engine = MessageEngine::new(h.ctx.clone());
        let (peer, _peer_private) = h.add_contact_with_key("peer-1", "alice");

        let id = engine.send_text(&peer, "hi").await.unwrap();

        assert_eq!(h.relay.messages().len(), 1);
        let stored = h.ctx.db().unwrap().get_message(id).unwrap();
        assert!(stored.is_sent);
        assert!(!stored.is_delivered);

        engine
            .receive_receipt(&peer, ReceiptKind::Delivered, Some(id))
            .await
            .unwrap();
        assert!(h.ctx.db().unwrap().get_message(id).unwrap().is_delivered);

        // Idempotent
        engine
            .receive_receipt(&peer, ReceiptKind::Delivered, Some(id))
            .await
            .unwrap();
        assert!(h.ctx.db().unwrap().get_message(id).unwrap().is_delivered);
    }

    #[tokio::test]
    async fn transport_failure_still_persists_undelivered() {
        let h = harness();
        let engine = MessageEngine::new(h.ctx.clone());
        let (peer, _) = h.add_contact_with_key("peer-1", "alice");

        h.relay.fail_sends(true);
        let id = engine.send_text(&peer, "hi").await.unwrap();

        let stored = h.ctx.db().unwrap().get_message(id).unwrap();
        assert!(stored.is_sent);
        assert!(!stored.is_delivered);
    }

    #[tokio::test]
    async fn stale_key_on_encrypt_triggers_key_request() {
        let h = harness();
        let engine = MessageEngine::new(h.ctx.clone());
        // Key present but malformed: encrypt fails, self-healing kicks in.
        let peer = PeerUuid::from("peer-1");
        h.insert_contact(&peer, "alice", "not-a-valid-key");

        let err = engine.send_text(&peer, "hi").await.unwrap_err();
        assert!(matches!(err, SessionError::MissingKey));
        assert_eq!(h.relay.key_requests(), 1);
        assert_eq!(h.relay.messages().len(), 0);
    }

    #[tokio::test]
    async fn receive_persists_and_sends_delivered_receipt() {
        let h = harness();
        let engine = MessageEngine::new(h.ctx.clone());
        let peer = PeerUuid::from("peer-1");

        let payload = SealedBoxCrypto
            .encrypt_message("coucou", &h.ctx.identity.public_key)
            .unwrap();
        engine.receive(&peer, &payload).await.unwrap();

        let messages = h
            .ctx
            .db()
            .unwrap()
            .get_messages_for_conversation(peer.as_str())
            .unwrap();
        assert_eq!(messages.len(), 1);
        assert!(!messages[0].is_sent);
        assert!(messages[0].is_delivered);
        assert!(!messages[0].is_read);

        let receipts = h.relay.receipts();
        assert_eq!(receipts.len(), 1);
        assert_eq!(receipts[0], (ReceiptKind::Delivered, Some(messages[0].id)));
    }

    #[tokio::test]
    async fn receive_in_open_conversation_marks_read_and_acks() {
        let h = harness();
        let engine = MessageEngine::new(h.ctx.clone());
        let peer = PeerUuid::from("peer-1");
        h.ctx.set_open_conversation(Some(peer.clone()));

        let payload = SealedBoxCrypto
            .encrypt_message("seen", &h.ctx.identity.public_key)
            .unwrap();
        engine.receive(&peer, &payload).await.unwrap();

        let messages = h
            .ctx
            .db()
            .unwrap()
            .get_messages_for_conversation(peer.as_str())
            .unwrap();
        assert!(messages[0].is_read);

        let receipts = h.relay.receipts();
        assert_eq!(receipts.len(), 2);
        assert_eq!(receipts[1], (ReceiptKind::ReadAll, None));
    }

    #[tokio::test]
    async fn receive_undecryptable_payload_requests_key() {
        let h = harness();
        let engine = MessageEngine::new(h.ctx.clone());
        let peer = PeerUuid::from("peer-1");

        // Encrypted for someone else entirely
        let (other_public, _) = peer_keypair();
        let payload = SealedBoxCrypto.encrypt_message("??", &other_public).unwrap();

        engine.receive(&peer, &payload).await.unwrap();

        assert!(h
            .ctx
            .db()
            .unwrap()
            .get_messages_for_conversation(peer.as_str())
            .unwrap()
            .is_empty());
        assert_eq!(h.relay.key_requests(), 1);
        assert!(h.relay.receipts().is_empty());
    }

    #[tokio::test]
    async fn read_all_marks_every_outbound_message() {
        let h = harness();
        let engine = MessageEngine::new(h.ctx.clone());
        let (peer, _) = h.add_contact_with_key("peer-1", "alice");

        let a = engine.send_text(&peer, "one").await.unwrap();
        let b = engine.send_text(&peer, "two").await.unwrap();

        engine
            .receive_receipt(&peer, ReceiptKind::ReadAll, None)
            .await
            .unwrap();

        let db = h.ctx.db().unwrap();
        assert!(db.get_message(a).unwrap().is_read);
        assert!(db.get_message(b).unwrap().is_read);
    }

    #[tokio::test]
    async fn reconcile_key_preserves_nickname_and_emits() {
        let mut h = harness();
        let engine = MessageEngine::new(h.ctx.clone());
        let peer = h.add_contact_without_key("peer-1", "alice");

        let (peer_public, _) = peer_keypair();
        engine.reconcile_key(&peer, &peer_public).unwrap();

        let contact = h
            .ctx
            .db()
            .unwrap()
            .get_contact(peer.as_str())
            .unwrap()
            .unwrap();
        assert_eq!(contact.nickname, "alice");
        assert_eq!(contact.public_key, peer_public);
        assert!(matches!(
            h.events.try_recv(),
            Ok(SessionEvent::KeyReconciled { .. })
        ));
    }

    #[tokio::test]
    async fn add_contact_requests_key() {
        let h = harness();
        let engine = MessageEngine::new(h.ctx.clone());
        let peer = PeerUuid::from("peer-1");

        engine.add_contact(&peer, "bob").await.unwrap();

        assert_eq!(h.relay.key_requests(), 1);
        let contact = h
            .ctx
            .db()
            .unwrap()
            .get_contact(peer.as_str())
            .unwrap()
            .unwrap();
        assert!(contact.public_key.is_empty());
    }

    #[tokio::test]
    async fn open_conversation_marks_read_and_sends_read_all() {
        let h = harness();
        let engine = MessageEngine::new(h.ctx.clone());
        let peer = PeerUuid::from("peer-1");

        let payload = SealedBoxCrypto
            .encrypt_message("unseen", &h.ctx.identity.public_key)
            .unwrap();
        engine.receive(&peer, &payload).await.unwrap();
        assert_eq!(h.ctx.db().unwrap().unread_count(peer.as_str()).unwrap(), 1);

        engine.open_conversation(&peer).await.unwrap();

        assert_eq!(h.ctx.db().unwrap().unread_count(peer.as_str()).unwrap(), 0);
        assert!(h
            .relay
            .sent()
            .iter()
            .any(|s| matches!(s, Sent::Receipt { kind: ReceiptKind::ReadAll, .. })));
    }

    #[tokio::test]
    async fn delete_contact_removes_conversation() {
        let h = harness();
        let engine = MessageEngine::new(h.ctx.clone());
        let (peer, _) = h.add_contact_with_key("peer-1", "alice");

        engine.send_text(&peer, "bye").await.unwrap();
        engine.delete_contact(&peer).unwrap();

        let db = h.ctx.db().unwrap();
        assert!(db.get_contact(peer.as_str()).unwrap().is_none());
        assert!(db
            .get_messages_for_conversation(peer.as_str())
            .unwrap()
            .is_empty());
    }
}
