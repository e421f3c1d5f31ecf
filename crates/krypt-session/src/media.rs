//! The media engine boundary.
//!
//! Camera/microphone capture, peer connections and NAT traversal live
//! behind these traits.  The call state machine opens one
//! [`MediaSession`] per call and drives it with discrete events; local ICE
//! candidates and connectivity loss flow back on the event channel.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

use krypt_shared::types::PeerUuid;

#[derive(Error, Debug, Clone)]
#[error("{0}")]
pub struct MediaError(pub String);

/// Events pushed out of an active media session.
#[derive(Debug, Clone)]
pub enum MediaEvent {
    /// A local ICE candidate is ready to be signaled to the remote peer.
    LocalCandidate {
        candidate: String,
        sdp_mid: Option<String>,
        sdp_m_line_index: i32,
    },

    /// Lower-layer connectivity was lost or the connection closed.
    /// Treated as an external trigger equivalent to ending the call.
    ConnectionClosed,
}

/// Factory for per-call media resources.
pub trait MediaEngine: Send + Sync {
    /// Allocate capture devices and a peer connection for a call with
    /// `remote`.  Failure is terminal for the call attempt.
    fn open(
        &self,
        remote: &PeerUuid,
    ) -> Result<(Arc<dyn MediaSession>, mpsc::UnboundedReceiver<MediaEvent>), MediaError>;
}

/// One live call's media resources.
#[async_trait]
pub trait MediaSession: Send + Sync {
    /// Create the local SDP offer (caller side).
    async fn create_offer(&self) -> Result<String, MediaError>;

    /// Apply the remote offer and create the local SDP answer (callee side).
    async fn create_answer(&self, remote_offer_sdp: &str) -> Result<String, MediaError>;

    /// Apply the remote answer (caller side).
    async fn set_remote_answer(&self, sdp: &str) -> Result<(), MediaError>;

    /// Attach a remote ICE candidate.
    async fn add_ice_candidate(
        &self,
        candidate: &str,
        sdp_mid: Option<&str>,
        sdp_m_line_index: i32,
    ) -> Result<(), MediaError>;

    /// Release capture devices and the peer connection.  Must be safe to
    /// call more than once.
    async fn close(&self);
}
