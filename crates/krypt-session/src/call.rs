//! Call signaling state machine.
//!
//! One call at a time, driven by discrete events: each transition is a
//! function of (current phase, event).  The media engine sits behind the
//! [`MediaEngine`](crate::media::MediaEngine) boundary; its asynchronous
//! events (local ICE candidates, connectivity loss) are forwarded by a
//! task spawned per call.
//!
//! A second `start_call` or inbound offer while a session is active is
//! rejected; the slot is never silently replaced.

use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

use krypt_shared::types::PeerUuid;

use crate::error::{Result, SessionError};
use crate::events::{emit, SessionEvent};
use crate::media::{MediaEngine, MediaEvent, MediaSession};
use crate::session::SessionCtx;

/// Signaling phase of the single call slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallPhase {
    Idle,
    /// We sent (or are about to send) an offer and wait for the answer.
    OutgoingPending { remote: PeerUuid },
    /// A remote offer is stored, waiting for the local user to accept.
    IncomingOffered { remote: PeerUuid, offer_sdp: String },
    Connected { remote: PeerUuid },
}

impl CallPhase {
    pub fn is_idle(&self) -> bool {
        matches!(self, CallPhase::Idle)
    }

    pub fn remote(&self) -> Option<&PeerUuid> {
        match self {
            CallPhase::Idle => None,
            CallPhase::OutgoingPending { remote }
            | CallPhase::IncomingOffered { remote, .. }
            | CallPhase::Connected { remote } => Some(remote),
        }
    }
}

struct CallSlot {
    phase: CallPhase,
    media: Option<Arc<dyn MediaSession>>,
}

pub struct CallMachine {
    ctx: Arc<SessionCtx>,
    engine: Arc<dyn MediaEngine>,
    // One async mutex over the slot: every transition holds it across its
    // media/transport awaits, which is what makes check-and-set atomic.
    // Shared with the per-call media event forwarder for teardown.
    slot: Arc<Mutex<CallSlot>>,
}

impl CallMachine {
    pub(crate) fn new(ctx: Arc<SessionCtx>, engine: Arc<dyn MediaEngine>) -> Self {
        Self {
            ctx,
            engine,
            slot: Arc::new(Mutex::new(CallSlot {
                phase: CallPhase::Idle,
                media: None,
            })),
        }
    }

    /// Current signaling phase.
    pub async fn phase(&self) -> CallPhase {
        self.slot.lock().await.phase.clone()
    }

    /// Start an outgoing call: open media, create the offer, send it.
    /// Any local failure aborts the attempt and returns the slot to idle;
    /// there is no retry.
    pub async fn start_call(&self, remote: &PeerUuid) -> Result<()> {
        let mut slot = self.slot.lock().await;
        if !slot.phase.is_idle() {
            return Err(SessionError::CallBusy);
        }
        slot.phase = CallPhase::OutgoingPending {
            remote: remote.clone(),
        };

        info!(remote = %remote.short(), "starting call");

        match self.open_media_and_offer(&mut slot, remote).await {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!(remote = %remote.short(), error = %e, "call start failed");
                teardown(&self.ctx, &mut slot).await;
                Err(e)
            }
        }
    }

    async fn open_media_and_offer(&self, slot: &mut CallSlot, remote: &PeerUuid) -> Result<()> {
        let (media, events) = self
            .engine
            .open(remote)
            .map_err(|e| SessionError::MediaInit(e.0))?;
        slot.media = Some(media.clone());
        self.spawn_media_forwarder(remote.clone(), events);

        let sdp = media
            .create_offer()
            .await
            .map_err(|e| SessionError::MediaInit(e.0))?;

        if !self.ctx.transport.send_offer(remote, &sdp).await {
            warn!(remote = %remote.short(), "offer send failed");
        }
        Ok(())
    }

    /// A remote offer arrived.  Media resources are deferred until accept.
    pub async fn on_offer(&self, from: &PeerUuid, sdp: &str) {
        let mut slot = self.slot.lock().await;
        if !slot.phase.is_idle() {
            warn!(from = %from.short(), "offer received while a call is active, rejected");
            return;
        }
        slot.phase = CallPhase::IncomingOffered {
            remote: from.clone(),
            offer_sdp: sdp.to_string(),
        };
        info!(from = %from.short(), "incoming call offer");
        emit(
            &self.ctx.events,
            SessionEvent::IncomingCall { from: from.clone() },
        );
    }

    /// Accept the stored incoming offer: open media, answer it, send the
    /// answer.  Failure aborts back to idle.
    pub async fn accept_call(&self) -> Result<()> {
        let mut slot = self.slot.lock().await;
        let CallPhase::IncomingOffered { remote, offer_sdp } = slot.phase.clone() else {
            return Err(SessionError::NoIncomingCall);
        };

        match self.answer_offer(&mut slot, &remote, &offer_sdp).await {
            Ok(()) => {
                // Pending offer is dropped with the phase change
                slot.phase = CallPhase::Connected {
                    remote: remote.clone(),
                };
                info!(remote = %remote.short(), "call accepted");
                Ok(())
            }
            Err(e) => {
                warn!(remote = %remote.short(), error = %e, "call accept failed");
                teardown(&self.ctx, &mut slot).await;
                Err(e)
            }
        }
    }

    async fn answer_offer(
        &self,
        slot: &mut CallSlot,
        remote: &PeerUuid,
        offer_sdp: &str,
    ) -> Result<()> {
        let (media, events) = self
            .engine
            .open(remote)
            .map_err(|e| SessionError::MediaInit(e.0))?;
        slot.media = Some(media.clone());
        self.spawn_media_forwarder(remote.clone(), events);

        let sdp = media
            .create_answer(offer_sdp)
            .await
            .map_err(|e| SessionError::MediaInit(e.0))?;

        if !self.ctx.transport.send_answer(remote, &sdp).await {
            warn!(remote = %remote.short(), "answer send failed");
        }
        Ok(())
    }

    /// The remote answered our offer.  Only meaningful while an outgoing
    /// call is pending; the media engine finalizes the connection.
    pub async fn on_answer(&self, sdp: &str) {
        let mut slot = self.slot.lock().await;
        match (&slot.phase, &slot.media) {
            (CallPhase::OutgoingPending { remote }, Some(media)) => {
                if let Err(e) = media.set_remote_answer(sdp).await {
                    warn!(error = %e, "applying remote answer failed");
                    return;
                }
                let remote = remote.clone();
                info!(remote = %remote.short(), "call answered");
                slot.phase = CallPhase::Connected { remote };
            }
            _ => debug!("answer with no outgoing call pending, ignored"),
        }
    }

    /// A remote ICE candidate: forwarded whenever a media session exists,
    /// silently dropped otherwise.
    pub async fn on_ice_candidate(
        &self,
        candidate: &str,
        sdp_mid: Option<&str>,
        sdp_m_line_index: i32,
    ) {
        let slot = self.slot.lock().await;
        match &slot.media {
            Some(media) => {
                if let Err(e) = media
                    .add_ice_candidate(candidate, sdp_mid, sdp_m_line_index)
                    .await
                {
                    warn!(error = %e, "adding ICE candidate failed");
                }
            }
            None => debug!("ICE candidate with no media session, dropped"),
        }
    }

    /// End the call from any state.  Safe to invoke redundantly: media is
    /// released exactly once.
    pub async fn end_call(&self) {
        let mut slot = self.slot.lock().await;
        teardown(&self.ctx, &mut slot).await;
    }

    fn spawn_media_forwarder(
        &self,
        remote: PeerUuid,
        mut events: mpsc::UnboundedReceiver<MediaEvent>,
    ) {
        let ctx = self.ctx.clone();
        let slot = self.slot.clone();
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                match event {
                    MediaEvent::LocalCandidate {
                        candidate,
                        sdp_mid,
                        sdp_m_line_index,
                    } => {
                        ctx.transport
                            .send_ice_candidate(
                                &remote,
                                &candidate,
                                sdp_mid.as_deref(),
                                sdp_m_line_index,
                            )
                            .await;
                    }
                    MediaEvent::ConnectionClosed => {
                        debug!(remote = %remote.short(), "media connection closed");
                        let mut slot = slot.lock().await;
                        teardown(&ctx, &mut slot).await;
                        break;
                    }
                }
            }
        });
    }
}

/// Release media (exactly once per call) and return the slot to idle.
async fn teardown(ctx: &SessionCtx, slot: &mut CallSlot) {
    if let Some(media) = slot.media.take() {
        media.close().await;
    }
    if let Some(remote) = slot.phase.remote().cloned() {
        info!(remote = %remote.short(), "call ended");
        emit(&ctx.events, SessionEvent::CallEnded { remote });
    }
    slot.phase = CallPhase::Idle;
}
