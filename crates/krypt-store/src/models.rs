//! Domain model structs persisted in the local database.
//!
//! Every struct derives `Serialize` so it can be handed directly to an
//! embedding UI layer.

use chrono::{DateTime, Utc};
use krypt_shared::types::ContentType;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Local identity
// ---------------------------------------------------------------------------

/// The single-row device identity: a stable UUID plus the X25519 key pair.
/// Created on first launch and never regenerated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LocalIdentityRow {
    pub device_id: String,
    /// Hex-encoded X25519 public key.
    pub public_key: String,
    /// Hex-encoded X25519 secret key.  Never leaves the device.
    pub private_key: String,
}

// ---------------------------------------------------------------------------
// Contact
// ---------------------------------------------------------------------------

/// A known peer.  The primary key is the peer's device UUID.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Contact {
    /// Peer device UUID.
    pub uuid: String,
    /// Hex-encoded public key; empty until the key exchange completes.
    pub public_key: String,
    /// Local display name.
    pub nickname: String,
    /// When this contact was added locally.
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// A single chat message as stored.  `id` is the SQLite rowid and serves as
/// the monotonic local identifier that delivery receipts reference.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    pub id: i64,
    /// The peer UUID this conversation is with.
    pub conversation_id: String,
    pub from_uuid: String,
    pub content: String,
    pub content_type: ContentType,
    /// Local plaintext copy for file/image messages.
    pub file_path: Option<String>,
    pub is_sent: bool,
    /// Only ever transitions false -> true.
    pub is_delivered: bool,
    /// Only ever transitions false -> true.
    pub is_read: bool,
    pub timestamp: DateTime<Utc>,
}

/// A message about to be inserted; the store assigns the rowid.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub conversation_id: String,
    pub from_uuid: String,
    pub content: String,
    pub content_type: ContentType,
    pub file_path: Option<String>,
    pub is_sent: bool,
    pub is_delivered: bool,
    pub is_read: bool,
    pub timestamp: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// An ephemeral status broadcast.  Swept once `expires_at` passes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Status {
    pub id: i64,
    pub from_uuid: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// A status about to be inserted; `expires_at` is derived from `created_at`.
#[derive(Debug, Clone)]
pub struct NewStatus {
    pub from_uuid: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}
