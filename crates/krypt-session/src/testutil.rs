//! Shared test doubles: an in-memory relay and media engine implementing
//! the boundary traits, plus a harness that wires a real store and the
//! default crypto provider into a [`SessionCtx`].

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::mpsc;

use krypt_shared::crypto::{CryptoProvider, SealedBoxCrypto};
use krypt_shared::protocol::{EncryptedPayload, FileChunk, ReceiptKind};
use krypt_shared::types::PeerUuid;
use krypt_store::{Contact, Database};

use crate::events::SessionEvent;
use crate::identity;
use crate::media::{MediaEngine, MediaError, MediaEvent, MediaSession};
use crate::session::SessionCtx;
use crate::transport::RelayTransport;

// ---------------------------------------------------------------------------
// Fake relay
// ---------------------------------------------------------------------------

/// Everything the fake relay was asked to send, in call order.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Sent {
    Announce {
        uuid: PeerUuid,
        public_key: String,
    },
    Message {
        to: PeerUuid,
        payload: EncryptedPayload,
    },
    Chunk {
        to: PeerUuid,
        chunk: FileChunk,
    },
    Receipt {
        to: PeerUuid,
        kind: ReceiptKind,
        message_ref_id: Option<i64>,
    },
    KeyRequest {
        uuid: PeerUuid,
    },
    Offer {
        to: PeerUuid,
        sdp: String,
    },
    Answer {
        to: PeerUuid,
        sdp: String,
    },
    Ice {
        to: PeerUuid,
        candidate: String,
    },
    Status {
        from: PeerUuid,
        content: String,
    },
}

pub(crate) struct FakeRelay {
    sent: Mutex<Vec<Sent>>,
    fail: AtomicBool,
}

impl FakeRelay {
    pub(crate) fn new() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail: AtomicBool::new(false),
        }
    }

    /// Make every subsequent send report failure (still recorded).
    pub(crate) fn fail_sends(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    pub(crate) fn key_requests(&self) -> usize {
        self.sent()
            .iter()
            .filter(|s| matches!(s, Sent::KeyRequest { .. }))
            .count()
    }

    pub(crate) fn messages(&self) -> Vec<EncryptedPayload> {
        self.sent()
            .into_iter()
            .filter_map(|s| match s {
                Sent::Message { payload, .. } => Some(payload),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn chunks(&self) -> Vec<FileChunk> {
        self.sent()
            .into_iter()
            .filter_map(|s| match s {
                Sent::Chunk { chunk, .. } => Some(chunk),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn receipts(&self) -> Vec<(ReceiptKind, Option<i64>)> {
        self.sent()
            .into_iter()
            .filter_map(|s| match s {
                Sent::Receipt {
                    kind,
                    message_ref_id,
                    ..
                } => Some((kind, message_ref_id)),
                _ => None,
            })
            .collect()
    }

    fn record(&self, entry: Sent) -> bool {
        self.sent.lock().unwrap().push(entry);
        !self.fail.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RelayTransport for FakeRelay {
    async fn announce(&self, uuid: &PeerUuid, public_key: &str) -> bool {
        self.record(Sent::Announce {
            uuid: uuid.clone(),
            public_key: public_key.to_string(),
        })
    }

    async fn send_message(&self, to: &PeerUuid, payload: EncryptedPayload) -> bool {
        self.record(Sent::Message {
            to: to.clone(),
            payload,
        })
    }

    async fn send_file_chunk(&self, to: &PeerUuid, chunk: FileChunk) -> bool {
        self.record(Sent::Chunk {
            to: to.clone(),
            chunk,
        })
    }

    async fn send_receipt(
        &self,
        to: &PeerUuid,
        kind: ReceiptKind,
        message_ref_id: Option<i64>,
    ) -> bool {
        self.record(Sent::Receipt {
            to: to.clone(),
            kind,
            message_ref_id,
        })
    }

    async fn request_public_key(&self, uuid: &PeerUuid) -> bool {
        self.record(Sent::KeyRequest { uuid: uuid.clone() })
    }

    async fn send_offer(&self, to: &PeerUuid, sdp: &str) -> bool {
        self.record(Sent::Offer {
            to: to.clone(),
            sdp: sdp.to_string(),
        })
    }

    async fn send_answer(&self, to: &PeerUuid, sdp: &str) -> bool {
        self.record(Sent::Answer {
            to: to.clone(),
            sdp: sdp.to_string(),
        })
    }

    async fn send_ice_candidate(
        &self,
        to: &PeerUuid,
        candidate: &str,
        _sdp_mid: Option<&str>,
        _sdp_m_line_index: i32,
    ) -> bool {
        self.record(Sent::Ice {
            to: to.clone(),
            candidate: candidate.to_string(),
        })
    }

    async fn send_status(&self, from: &PeerUuid, content: &str) -> bool {
        self.record(Sent::Status {
            from: from.clone(),
            content: content.to_string(),
        })
    }
}

// ---------------------------------------------------------------------------
// Fake media engine
// ---------------------------------------------------------------------------

pub(crate) struct FakeMediaSession {
    fail_offer: bool,
    closes: AtomicUsize,
    answered_offers: Mutex<Vec<String>>,
    remote_answers: Mutex<Vec<String>>,
    candidates: Mutex<Vec<String>>,
}

impl FakeMediaSession {
    fn new(fail_offer: bool) -> Self {
        Self {
            fail_offer,
            closes: AtomicUsize::new(0),
            answered_offers: Mutex::new(Vec::new()),
            remote_answers: Mutex::new(Vec::new()),
            candidates: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub(crate) fn answered_offers(&self) -> Vec<String> {
        self.answered_offers.lock().unwrap().clone()
    }

    pub(crate) fn remote_answers(&self) -> Vec<String> {
        self.remote_answers.lock().unwrap().clone()
    }

    pub(crate) fn candidates(&self) -> Vec<String> {
        self.candidates.lock().unwrap().clone()
    }
}

#[async_trait]
impl MediaSession for FakeMediaSession {
    async fn create_offer(&self) -> Result<String, MediaError> {
        if self.fail_offer {
            return Err(MediaError("offer creation failed".into()));
        }
        Ok("local-offer-sdp".to_string())
    }

    async fn create_answer(&self, remote_offer_sdp: &str) -> Result<String, MediaError> {
        self.answered_offers
            .lock()
            .unwrap()
            .push(remote_offer_sdp.to_string());
        Ok("local-answer-sdp".to_string())
    }

    async fn set_remote_answer(&self, sdp: &str) -> Result<(), MediaError> {
        self.remote_answers.lock().unwrap().push(sdp.to_string());
        Ok(())
    }

    async fn add_ice_candidate(
        &self,
        candidate: &str,
        _sdp_mid: Option<&str>,
        _sdp_m_line_index: i32,
    ) -> Result<(), MediaError> {
        self.candidates.lock().unwrap().push(candidate.to_string());
        Ok(())
    }

    async fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

pub(crate) struct FakeMediaEngine {
    fail_open: bool,
    fail_offer: bool,
    last: Mutex<Option<Arc<FakeMediaSession>>>,
    event_tx: Mutex<Option<mpsc::UnboundedSender<MediaEvent>>>,
}

impl FakeMediaEngine {
    pub(crate) fn new() -> Self {
        Self {
            fail_open: false,
            fail_offer: false,
            last: Mutex::new(None),
            event_tx: Mutex::new(None),
        }
    }

    pub(crate) fn failing_open() -> Self {
        Self {
            fail_open: true,
            ..Self::new()
        }
    }

    pub(crate) fn failing_offer() -> Self {
        Self {
            fail_offer: true,
            ..Self::new()
        }
    }

    pub(crate) fn last_session(&self) -> Option<Arc<FakeMediaSession>> {
        self.last.lock().unwrap().clone()
    }

    /// Inject an event as if the live media stack produced it.
    pub(crate) fn push_event(&self, event: MediaEvent) {
        if let Some(tx) = self.event_tx.lock().unwrap().as_ref() {
            let _ = tx.send(event);
        }
    }
}

impl MediaEngine for FakeMediaEngine {
    fn open(
        &self,
        _remote: &PeerUuid,
    ) -> Result<(Arc<dyn MediaSession>, mpsc::UnboundedReceiver<MediaEvent>), MediaError> {
        if self.fail_open {
            return Err(MediaError("media init failed".into()));
        }
        let session = Arc::new(FakeMediaSession::new(self.fail_offer));
        *self.last.lock().unwrap() = Some(session.clone());
        let (tx, rx) = mpsc::unbounded_channel();
        *self.event_tx.lock().unwrap() = Some(tx);
        Ok((session, rx))
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub(crate) struct TestHarness {
    pub(crate) ctx: Arc<SessionCtx>,
    pub(crate) relay: Arc<FakeRelay>,
    pub(crate) events: mpsc::UnboundedReceiver<SessionEvent>,
    dir: tempfile::TempDir,
}

impl TestHarness {
    pub(crate) fn files_dir(&self) -> PathBuf {
        self.dir.path().join("files")
    }

    pub(crate) fn insert_contact(&self, uuid: &PeerUuid, nickname: &str, public_key: &str) {
        self.ctx
            .db()
            .unwrap()
            .insert_contact(&Contact {
                uuid: uuid.as_str().to_string(),
                public_key: public_key.to_string(),
                nickname: nickname.to_string(),
                created_at: Utc::now(),
            })
            .unwrap();
    }

    /// Contact whose key exchange has not happened yet.
    pub(crate) fn add_contact_without_key(&self, uuid: &str, nickname: &str) -> PeerUuid {
        let peer = PeerUuid::from(uuid);
        self.insert_contact(&peer, nickname, "");
        peer
    }

    /// Contact with a real key pair; returns the peer's private key so
    /// tests can play the remote side.
    pub(crate) fn add_contact_with_key(&self, uuid: &str, nickname: &str) -> (PeerUuid, String) {
        let (public_key, private_key) = peer_keypair();
        let peer = PeerUuid::from(uuid);
        self.insert_contact(&peer, nickname, &public_key);
        (peer, private_key)
    }
}

pub(crate) fn peer_keypair() -> (String, String) {
    SealedBoxCrypto.generate_keypair()
}

pub(crate) fn harness() -> TestHarness {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::open_at(&dir.path().join("test.db")).unwrap();
    let crypto: Arc<dyn CryptoProvider> = Arc::new(SealedBoxCrypto);
    let identity = identity::load_or_create(&db, crypto.as_ref()).unwrap();
    let relay = Arc::new(FakeRelay::new());
    let (events_tx, events_rx) = mpsc::unbounded_channel();

    let ctx = Arc::new(SessionCtx {
        db: Arc::new(Mutex::new(db)),
        transport: relay.clone(),
        crypto,
        identity,
        events: events_tx,
        open_conversation: Mutex::new(None),
    });

    TestHarness {
        ctx,
        relay,
        events: events_rx,
        dir,
    }
}
