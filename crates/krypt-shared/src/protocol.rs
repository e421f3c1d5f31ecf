//! Relay wire protocol.
//!
//! Every envelope exchanged with the relay is a JSON object whose `type`
//! field selects the variant. Payload field names are fixed by the wire
//! format (`encryptedData`, `transferId`, `sdpMid`, ...), so the structs
//! here carry explicit serde renames rather than Rust casing.

use serde::{Deserialize, Serialize};

use crate::types::PeerUuid;

/// All protocol envelopes exchanged with the relay
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Envelope {
    /// Encrypted chat message or a delivery/read receipt
    Message {
        from: PeerUuid,
        #[serde(flatten)]
        body: MessageBody,
    },

    /// One chunk of an encrypted file transfer
    FileChunk { from: PeerUuid, payload: FileChunk },

    /// Ephemeral plaintext status broadcast
    Status { from: PeerUuid, content: String },

    /// Answer to a key request
    PublicKeyResponse { target: PeerUuid, public_key: String },

    /// WebRTC SDP offer
    WebrtcOffer { from: PeerUuid, sdp: String },

    /// WebRTC SDP answer
    WebrtcAnswer { sdp: String },

    /// WebRTC ICE candidate
    WebrtcIce {
        candidate: String,
        #[serde(rename = "sdpMid", default)]
        sdp_mid: Option<String>,
        #[serde(rename = "sdpMLineIndex", default)]
        sdp_m_line_index: i32,
    },
}

/// The two shapes a `message` envelope can take. A receipt carries
/// `receipt_type`; anything else must carry an encrypted payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum MessageBody {
    Receipt {
        receipt_type: ReceiptKind,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message_ref_id: Option<i64>,
    },
    Encrypted { payload: EncryptedPayload },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReceiptKind {
    /// Marks exactly one message (by local id) as delivered
    Delivered,
    /// Marks every outbound message in the conversation as read
    ReadAll,
}

/// Wire unit for one encrypted message: asymmetric-wrapped symmetric key,
/// ciphertext, and initialization vector, all base64.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedPayload {
    pub encrypted_data: String,
    pub iv: String,
    pub encrypted_key: String,
}

/// One encrypted chunk of a file transfer. Every chunk carries the full
/// header so a receiver can identify the transfer from any chunk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FileChunk {
    pub transfer_id: String,
    pub file_name: String,
    pub mime_type: String,
    /// 0-based, unique within a transfer
    pub chunk_index: u32,
    pub total_chunks: u32,
    /// Base64 ciphertext
    pub ciphertext: String,
}

impl Envelope {
    /// Serialize to the JSON wire form.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from the JSON wire form.
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}
