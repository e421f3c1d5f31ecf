//! The relay transport boundary.
//!
//! The session core never talks to sockets; it hands fully formed protocol
//! operations to an implementation of [`RelayTransport`] and receives
//! inbound [`Envelope`]s on the channel passed to
//! [`Session::start`](crate::session::Session::start).  The inbound stream
//! is unordered and at-most-once.
//!
//! Every outbound operation returns `true` on success and `false` on
//! failure; implementations must not panic across this boundary.

use async_trait::async_trait;

use krypt_shared::protocol::{EncryptedPayload, FileChunk, ReceiptKind};
use krypt_shared::types::PeerUuid;

#[async_trait]
pub trait RelayTransport: Send + Sync {
    /// Announce this device's identity to the relay.  Called once after the
    /// identity is loaded.
    async fn announce(&self, uuid: &PeerUuid, public_key: &str) -> bool;

    /// Send an encrypted message envelope to a peer.
    async fn send_message(&self, to: &PeerUuid, payload: EncryptedPayload) -> bool;

    /// Send one file chunk to a peer.
    async fn send_file_chunk(&self, to: &PeerUuid, chunk: FileChunk) -> bool;

    /// Send a delivery or read receipt.  `message_ref_id` is required for
    /// [`ReceiptKind::Delivered`] and absent for [`ReceiptKind::ReadAll`].
    async fn send_receipt(
        &self,
        to: &PeerUuid,
        kind: ReceiptKind,
        message_ref_id: Option<i64>,
    ) -> bool;

    /// Ask the relay for a peer's public key.
    async fn request_public_key(&self, uuid: &PeerUuid) -> bool;

    /// Send a WebRTC SDP offer.
    async fn send_offer(&self, to: &PeerUuid, sdp: &str) -> bool;

    /// Send a WebRTC SDP answer.
    async fn send_answer(&self, to: &PeerUuid, sdp: &str) -> bool;

    /// Send a WebRTC ICE candidate.
    async fn send_ice_candidate(
        &self,
        to: &PeerUuid,
        candidate: &str,
        sdp_mid: Option<&str>,
        sdp_m_line_index: i32,
    ) -> bool;

    /// Broadcast a plaintext status.
    async fn send_status(&self, from: &PeerUuid, content: &str) -> bool;
}
