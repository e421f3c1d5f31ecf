use thiserror::Error;

use krypt_shared::error::CryptoError;
use krypt_store::StoreError;

/// Errors surfaced by the session layer.
///
/// Expected protocol conditions (missing key, busy call slot) are variants
/// here, not panics; transport failures never appear at all, since they are
/// absorbed at the engine boundary and show up as undelivered messages.
#[derive(Error, Debug)]
pub enum SessionError {
    /// The contact's public key has not been exchanged yet.  A key request
    /// has already been issued as a side effect of the failed operation.
    #[error("No public key for contact yet; key request issued")]
    MissingKey,

    /// The target peer is not in the contact list.
    #[error("Unknown contact: {0}")]
    UnknownContact(String),

    /// A call session is already active; end it before starting another.
    #[error("A call is already active")]
    CallBusy,

    /// `accept_call` without a pending incoming offer.
    #[error("No incoming call to accept")]
    NoIncomingCall,

    /// The media engine failed to come up; the call attempt is over.
    #[error("Media engine failed to initialize: {0}")]
    MediaInit(String),

    /// Payload exceeds the transfer limit.
    #[error("File too large: {size} bytes (max {max})")]
    FileTooLarge { size: usize, max: usize },

    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to determine a platform data directory.
    #[error("Could not determine application data directory")]
    NoDataDir,

    /// A shared-state mutex was poisoned by a panicking task.
    #[error("State lock poisoned")]
    LockPoisoned,
}

pub type Result<T> = std::result::Result<T, SessionError>;
