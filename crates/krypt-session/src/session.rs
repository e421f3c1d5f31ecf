//! Session orchestrator: the composition root.
//!
//! [`Session::start`] loads the device identity, announces it on the relay,
//! and spawns the inbound dispatch loop plus the periodic status sweep.
//! Inbound envelopes are routed by type to the three engines; each envelope
//! is handled on its own task, so handlers for different peers and
//! transfers interleave freely.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::Utc;
use directories::ProjectDirs;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use krypt_shared::constants::STATUS_SWEEP_SECS;
use krypt_shared::crypto::CryptoProvider;
use krypt_shared::protocol::{Envelope, MessageBody};
use krypt_shared::types::PeerUuid;
use krypt_store::{Database, NewStatus, Status};

use crate::call::CallMachine;
use crate::error::{Result, SessionError};
use crate::events::{emit, SessionEvent};
use crate::identity::{self, Identity};
use crate::media::MediaEngine;
use crate::messaging::MessageEngine;
use crate::transfer::TransferEngine;
use crate::transport::RelayTransport;

/// Shared context handed to every engine: the store, the boundary
/// implementations, the device identity, the event channel, and the
/// currently open conversation.  No ambient globals.
pub(crate) struct SessionCtx {
    pub(crate) db: Arc<Mutex<Database>>,
    pub(crate) transport: Arc<dyn RelayTransport>,
    pub(crate) crypto: Arc<dyn CryptoProvider>,
    pub(crate) identity: Identity,
    pub(crate) events: mpsc::UnboundedSender<SessionEvent>,
    pub(crate) open_conversation: Mutex<Option<PeerUuid>>,
}

impl SessionCtx {
    pub(crate) fn db(&self) -> Result<MutexGuard<'_, Database>> {
        self.db.lock().map_err(|_| SessionError::LockPoisoned)
    }

    pub(crate) fn is_conversation_open(&self, peer: &PeerUuid) -> bool {
        self.open_conversation
            .lock()
            .map(|guard| guard.as_ref() == Some(peer))
            .unwrap_or(false)
    }

    pub(crate) fn set_open_conversation(&self, peer: Option<PeerUuid>) {
        if let Ok(mut guard) = self.open_conversation.lock() {
            *guard = peer;
        }
    }

    /// Look up a contact with a usable public key, issuing a key request
    /// when the key is missing.  Shared by the message and transfer engines.
    pub(crate) async fn sendable_contact(&self, to: &PeerUuid) -> Result<krypt_store::Contact> {
        let contact = self
            .db()?
            .get_contact(to.as_str())?
            .ok_or_else(|| SessionError::UnknownContact(to.as_str().to_string()))?;

        if contact.public_key.is_empty() {
            self.transport.request_public_key(to).await;
            return Err(SessionError::MissingKey);
        }
        Ok(contact)
    }
}

/// Configuration for the session core.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Directory where sent and received files are kept in plaintext.
    pub files_dir: PathBuf,
}

impl SessionConfig {
    pub fn new(files_dir: impl Into<PathBuf>) -> Self {
        Self {
            files_dir: files_dir.into(),
        }
    }

    /// Platform default: `<data dir>/files` next to the database.
    pub fn default_dirs() -> Result<Self> {
        let project_dirs =
            ProjectDirs::from("com", "krypt", "krypt").ok_or(SessionError::NoDataDir)?;
        Ok(Self::new(project_dirs.data_dir().join("files")))
    }
}

/// The running session.
pub struct Session {
    ctx: Arc<SessionCtx>,
    messaging: MessageEngine,
    transfers: TransferEngine,
    calls: CallMachine,
}

impl Session {
    /// Load or create the device identity, announce it, and spawn the
    /// background loops.  Returns the session plus the UI event stream.
    pub async fn start(
        db: Database,
        crypto: Arc<dyn CryptoProvider>,
        transport: Arc<dyn RelayTransport>,
        media: Arc<dyn MediaEngine>,
        config: SessionConfig,
        inbound: mpsc::Receiver<Envelope>,
    ) -> Result<(Arc<Session>, mpsc::UnboundedReceiver<SessionEvent>)> {
        let identity = identity::load_or_create(&db, crypto.as_ref())?;
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let ctx = Arc::new(SessionCtx {
            db: Arc::new(Mutex::new(db)),
            transport,
            crypto,
            identity,
            events: events_tx,
            open_conversation: Mutex::new(None),
        });

        ctx.transport
            .announce(&ctx.identity.device_id, &ctx.identity.public_key)
            .await;
        info!(device = %ctx.identity.device_id.short(), "session identity announced");

        let session = Arc::new(Session {
            messaging: MessageEngine::new(ctx.clone()),
            transfers: TransferEngine::new(ctx.clone(), config.files_dir),
            calls: CallMachine::new(ctx.clone(), media),
            ctx,
        });

        session.spawn_dispatch(inbound);
        session.spawn_status_sweep();

        Ok((session, events_rx))
    }

    /// The message protocol engine.
    pub fn messaging(&self) -> &MessageEngine {
        &self.messaging
    }

    /// The file transfer engine.
    pub fn transfers(&self) -> &TransferEngine {
        &self.transfers
    }

    /// The call signaling state machine.
    pub fn calls(&self) -> &CallMachine {
        &self.calls
    }

    /// The local device identity.
    pub fn identity(&self) -> &Identity {
        &self.ctx.identity
    }

    /// Direct store access for the embedding UI layer (conversation lists,
    /// previews, unread counts).
    pub fn database(&self) -> Arc<Mutex<Database>> {
        self.ctx.db.clone()
    }

    // ------------------------------------------------------------------
    // Statuses
    // ------------------------------------------------------------------

    /// Broadcast a status and persist it locally.  A failed broadcast is
    /// logged; the local copy is kept either way.
    pub async fn post_status(&self, text: &str) -> Result<i64> {
        let sent = self
            .ctx
            .transport
            .send_status(&self.ctx.identity.device_id, text)
            .await;
        if !sent {
            warn!("status broadcast failed");
        }

        let id = self.ctx.db()?.insert_status(&NewStatus {
            from_uuid: self.ctx.identity.device_id.as_str().to_string(),
            content: text.to_string(),
            created_at: Utc::now(),
        })?;
        Ok(id)
    }

    /// All statuses that have not yet expired, newest first.
    pub fn active_statuses(&self) -> Result<Vec<Status>> {
        Ok(self.ctx.db()?.active_statuses()?)
    }

    // ------------------------------------------------------------------
    // Inbound dispatch
    // ------------------------------------------------------------------

    fn spawn_dispatch(self: &Arc<Self>, mut inbound: mpsc::Receiver<Envelope>) {
        let session = Arc::clone(self);
        tokio::spawn(async move {
            info!("inbound dispatch loop started");
            while let Some(envelope) = inbound.recv().await {
                // One task per envelope: a slow file chunk must not block
                // receipts or call signaling from other peers.
                let session = Arc::clone(&session);
                tokio::spawn(async move {
                    if let Err(e) = session.dispatch(envelope).await {
                        warn!(error = %e, "inbound envelope handling failed");
                    }
                });
            }
            warn!("inbound dispatch loop ended");
        });
    }

    async fn dispatch(&self, envelope: Envelope) -> Result<()> {
        match envelope {
            Envelope::Message { from, body } => match body {
                MessageBody::Receipt {
                    receipt_type,
                    message_ref_id,
                } => {
                    self.messaging
                        .receive_receipt(&from, receipt_type, message_ref_id)
                        .await
                }
                MessageBody::Encrypted { payload } => {
                    self.messaging.receive(&from, &payload).await
                }
            },

            Envelope::FileChunk { from, payload } => self.transfers.on_chunk(&from, payload).await,

            Envelope::Status { from, content } => self.ingest_status(&from, &content),

            Envelope::PublicKeyResponse { target, public_key } => {
                self.messaging.reconcile_key(&target, &public_key)
            }

            Envelope::WebrtcOffer { from, sdp } => {
                self.calls.on_offer(&from, &sdp).await;
                Ok(())
            }

            Envelope::WebrtcAnswer { sdp } => {
                self.calls.on_answer(&sdp).await;
                Ok(())
            }

            Envelope::WebrtcIce {
                candidate,
                sdp_mid,
                sdp_m_line_index,
            } => {
                self.calls
                    .on_ice_candidate(&candidate, sdp_mid.as_deref(), sdp_m_line_index)
                    .await;
                Ok(())
            }
        }
    }

    /// Store a peer's status broadcast.  Own echoes and unknown senders are
    /// dropped.
    fn ingest_status(&self, from: &PeerUuid, content: &str) -> Result<()> {
        if *from == self.ctx.identity.device_id {
            return Ok(());
        }

        {
            let db = self.ctx.db()?;
            if db.get_contact(from.as_str())?.is_none() {
                debug!(from = %from.short(), "status from unknown sender dropped");
                return Ok(());
            }
            db.insert_status(&NewStatus {
                from_uuid: from.as_str().to_string(),
                content: content.to_string(),
                created_at: Utc::now(),
            })?;
        }

        emit(
            &self.ctx.events,
            SessionEvent::StatusPosted {
                from: from.clone(),
                content: content.to_string(),
            },
        );
        Ok(())
    }

    fn spawn_status_sweep(self: &Arc<Self>) {
        let ctx = self.ctx.clone();
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(Duration::from_secs(STATUS_SWEEP_SECS));
            loop {
                tick.tick().await;
                match ctx.db().and_then(|db| Ok(db.delete_expired_statuses()?)) {
                    Ok(0) => {}
                    Ok(n) => debug!(deleted = n, "expired statuses swept"),
                    Err(e) => warn!(error = %e, "status sweep failed"),
                }
            }
        });
    }
}
