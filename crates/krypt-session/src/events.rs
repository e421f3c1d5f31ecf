//! Events surfaced to the embedding UI layer.
//!
//! The session pushes these over an unbounded channel handed out by
//! [`Session::start`](crate::session::Session::start); the UI decides how to
//! render or notify.

use tokio::sync::mpsc;

use krypt_shared::types::PeerUuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// An encrypted message arrived while its conversation was not open.
    MessageReceived {
        from: PeerUuid,
        message_id: i64,
        preview: String,
    },

    /// A file transfer completed while its conversation was not open.
    FileReceived {
        from: PeerUuid,
        message_id: i64,
        file_name: String,
    },

    /// A contact posted a status.
    StatusPosted { from: PeerUuid, content: String },

    /// A peer's public key was received or refreshed.
    KeyReconciled { uuid: PeerUuid },

    /// An incoming call offer is waiting to be accepted or declined.
    IncomingCall { from: PeerUuid },

    /// The active call ended (locally or from the remote side).
    CallEnded { remote: PeerUuid },
}

/// Push an event, tolerating a departed subscriber.
pub(crate) fn emit(tx: &mpsc::UnboundedSender<SessionEvent>, event: SessionEvent) {
    if tx.send(event).is_err() {
        tracing::debug!("no event subscriber, dropping session event");
    }
}
