//! # krypt-shared
//!
//! Types shared by every Krypt crate: the relay wire protocol, core
//! identifier types, the crypto provider boundary with its default
//! implementation, and the common error taxonomy.

pub mod constants;
pub mod crypto;
pub mod error;
pub mod protocol;
pub mod types;

pub use crypto::{CryptoProvider, SealedBoxCrypto};
pub use error::CryptoError;
pub use protocol::{EncryptedPayload, Envelope, FileChunk, MessageBody, ReceiptKind};
pub use types::{ContentType, PeerUuid};
