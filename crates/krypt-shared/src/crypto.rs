//! Crypto provider boundary and its default implementation.
//!
//! The session layer only ever talks to [`CryptoProvider`]; the default
//! [`SealedBoxCrypto`] seals to a peer's X25519 public key with an
//! ephemeral ECDH exchange and XChaCha20-Poly1305. Keys travel as hex
//! strings, wire fields as base64.

use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine;
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    XChaCha20Poly1305, XNonce,
};
use rand::rngs::OsRng;
use rand::RngCore;
use x25519_dalek::{EphemeralSecret, PublicKey, StaticSecret};

use crate::constants::{CHUNK_SIZE, KDF_CONTEXT_SEAL_KEY, NONCE_SIZE, PUBKEY_SIZE};
use crate::error::CryptoError;
use crate::protocol::{EncryptedPayload, FileChunk};

pub type SymmetricKey = [u8; 32];

/// Everything the session layer needs from the cryptography stack.
///
/// All methods are expected-failure territory: a wrong or stale key is a
/// [`CryptoError`], never a panic.
pub trait CryptoProvider: Send + Sync {
    /// Generate a fresh key pair, returned as `(public_hex, private_hex)`.
    fn generate_keypair(&self) -> (String, String);

    /// Encrypt a text message to the peer's public key.
    fn encrypt_message(
        &self,
        text: &str,
        peer_public_hex: &str,
    ) -> Result<EncryptedPayload, CryptoError>;

    /// Decrypt an inbound message payload with our private key.
    fn decrypt_message(
        &self,
        payload: &EncryptedPayload,
        my_private_hex: &str,
    ) -> Result<String, CryptoError>;

    /// Split a file into independently encrypted, fully headered chunks,
    /// in index order.
    fn encrypt_chunks(
        &self,
        bytes: &[u8],
        file_name: &str,
        mime_type: &str,
        peer_public_hex: &str,
        transfer_id: &str,
    ) -> Result<Vec<FileChunk>, CryptoError>;

    /// Decrypt one chunk with our private key.
    fn decrypt_chunk(
        &self,
        chunk: &FileChunk,
        my_private_hex: &str,
    ) -> Result<Vec<u8>, CryptoError>;
}

/// Default provider: ephemeral-X25519 sealed boxes over XChaCha20-Poly1305.
#[derive(Debug, Default, Clone, Copy)]
pub struct SealedBoxCrypto;

impl SealedBoxCrypto {
    pub fn new() -> Self {
        Self
    }
}

fn generate_nonce() -> [u8; NONCE_SIZE] {
    let mut nonce = [0u8; NONCE_SIZE];
    OsRng.fill_bytes(&mut nonce);
    nonce
}

fn generate_symmetric_key() -> SymmetricKey {
    let mut key = [0u8; 32];
    OsRng.fill_bytes(&mut key);
    key
}

fn parse_public(hex_str: &str) -> Result<PublicKey, CryptoError> {
    let bytes = hex::decode(hex_str)
        .map_err(|e| CryptoError::InvalidKey(format!("public key hex: {e}")))?;
    let arr: [u8; PUBKEY_SIZE] = bytes
        .try_into()
        .map_err(|_| CryptoError::InvalidKey("public key must be 32 bytes".into()))?;
    Ok(PublicKey::from(arr))
}

fn parse_secret(hex_str: &str) -> Result<StaticSecret, CryptoError> {
    let bytes = hex::decode(hex_str)
        .map_err(|e| CryptoError::InvalidKey(format!("secret key hex: {e}")))?;
    let arr: [u8; 32] = bytes
        .try_into()
        .map_err(|_| CryptoError::InvalidKey("secret key must be 32 bytes".into()))?;
    Ok(StaticSecret::from(arr))
}

// Symmetric core: returns nonce || ciphertext (24-byte nonce prepended)
fn encrypt_symmetric(key: &SymmetricKey, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let cipher = XChaCha20Poly1305::new(key.into());
    let nonce_bytes = generate_nonce();
    let nonce = XNonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|_| CryptoError::EncryptionFailed)?;

    let mut output = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    output.extend_from_slice(&nonce_bytes);
    output.extend_from_slice(&ciphertext);
    Ok(output)
}

fn decrypt_symmetric(key: &SymmetricKey, data: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if data.len() < NONCE_SIZE {
        return Err(CryptoError::DecryptionFailed);
    }

    let (nonce_bytes, ciphertext) = data.split_at(NONCE_SIZE);
    let cipher = XChaCha20Poly1305::new(key.into());
    let nonce = XNonce::from_slice(nonce_bytes);

    cipher
        .decrypt(nonce, ciphertext)
        .map_err(|_| CryptoError::DecryptionFailed)
}

/// Seal plaintext to a public key: ephemeral_pub || nonce || ciphertext.
fn seal(peer_public: &PublicKey, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let ephemeral = EphemeralSecret::random_from_rng(OsRng);
    let ephemeral_public = PublicKey::from(&ephemeral);
    let shared = ephemeral.diffie_hellman(peer_public);
    let key = blake3::derive_key(KDF_CONTEXT_SEAL_KEY, shared.as_bytes());

    let sealed = encrypt_symmetric(&key, plaintext)?;
    let mut output = Vec::with_capacity(PUBKEY_SIZE + sealed.len());
    output.extend_from_slice(ephemeral_public.as_bytes());
    output.extend_from_slice(&sealed);
    Ok(output)
}

/// Open a sealed box produced by [`seal`].
fn open(my_secret: &StaticSecret, data: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if data.len() < PUBKEY_SIZE + NONCE_SIZE {
        return Err(CryptoError::DecryptionFailed);
    }

    let (ephemeral_bytes, sealed) = data.split_at(PUBKEY_SIZE);
    let arr: [u8; PUBKEY_SIZE] = ephemeral_bytes
        .try_into()
        .map_err(|_| CryptoError::DecryptionFailed)?;
    let ephemeral_public = PublicKey::from(arr);

    let shared = my_secret.diffie_hellman(&ephemeral_public);
    let key = blake3::derive_key(KDF_CONTEXT_SEAL_KEY, shared.as_bytes());
    decrypt_symmetric(&key, sealed)
}

impl CryptoProvider for SealedBoxCrypto {
    fn generate_keypair(&self) -> (String, String) {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = PublicKey::from(&secret);
        (hex::encode(public.as_bytes()), hex::encode(secret.to_bytes()))
    }

    fn encrypt_message(
        &self,
        text: &str,
        peer_public_hex: &str,
    ) -> Result<EncryptedPayload, CryptoError> {
        let peer_public = parse_public(peer_public_hex)?;

        let message_key = generate_symmetric_key();
        let cipher = XChaCha20Poly1305::new((&message_key).into());
        let nonce_bytes = generate_nonce();
        let nonce = XNonce::from_slice(&nonce_bytes);
        let ciphertext = cipher
            .encrypt(nonce, text.as_bytes())
            .map_err(|_| CryptoError::EncryptionFailed)?;

        let encrypted_key = seal(&peer_public, &message_key)?;

        Ok(EncryptedPayload {
            encrypted_data: B64.encode(ciphertext),
            iv: B64.encode(nonce_bytes),
            encrypted_key: B64.encode(encrypted_key),
        })
    }

    fn decrypt_message(
        &self,
        payload: &EncryptedPayload,
        my_private_hex: &str,
    ) -> Result<String, CryptoError> {
        let my_secret = parse_secret(my_private_hex)?;

        let wrapped = B64
            .decode(&payload.encrypted_key)
            .map_err(|_| CryptoError::DecryptionFailed)?;
        let message_key: SymmetricKey = open(&my_secret, &wrapped)?
            .try_into()
            .map_err(|_| CryptoError::DecryptionFailed)?;

        let nonce_bytes = B64
            .decode(&payload.iv)
            .map_err(|_| CryptoError::DecryptionFailed)?;
        if nonce_bytes.len() != NONCE_SIZE {
            return Err(CryptoError::DecryptionFailed);
        }
        let ciphertext = B64
            .decode(&payload.encrypted_data)
            .map_err(|_| CryptoError::DecryptionFailed)?;

        let cipher = XChaCha20Poly1305::new((&message_key).into());
        let plaintext = cipher
            .decrypt(XNonce::from_slice(&nonce_bytes), ciphertext.as_slice())
            .map_err(|_| CryptoError::DecryptionFailed)?;

        String::from_utf8(plaintext).map_err(|_| CryptoError::DecryptionFailed)
    }

    fn encrypt_chunks(
        &self,
        bytes: &[u8],
        file_name: &str,
        mime_type: &str,
        peer_public_hex: &str,
        transfer_id: &str,
    ) -> Result<Vec<FileChunk>, CryptoError> {
        let peer_public = parse_public(peer_public_hex)?;

        let total_chunks = bytes.len().div_ceil(CHUNK_SIZE).max(1) as u32;
        let mut chunks = Vec::with_capacity(total_chunks as usize);
        for (index, slice) in bytes.chunks(CHUNK_SIZE).enumerate() {
            let sealed = seal(&peer_public, slice)?;
            chunks.push(FileChunk {
                transfer_id: transfer_id.to_string(),
                file_name: file_name.to_string(),
                mime_type: mime_type.to_string(),
                chunk_index: index as u32,
                total_chunks,
                ciphertext: B64.encode(sealed),
            });
        }

        // An empty file still produces one (empty) chunk so the receiver
        // sees the transfer at all.
        if chunks.is_empty() {
            let sealed = seal(&peer_public, &[])?;
            chunks.push(FileChunk {
                transfer_id: transfer_id.to_string(),
                file_name: file_name.to_string(),
                mime_type: mime_type.to_string(),
                chunk_index: 0,
                total_chunks: 1,
                ciphertext: B64.encode(sealed),
            });
        }

        Ok(chunks)
    }

    fn decrypt_chunk(
        &self,
        chunk: &FileChunk,
        my_private_hex: &str,
    ) -> Result<Vec<u8>, CryptoError> {
        let my_secret = parse_secret(my_private_hex)?;
        let sealed = B64
            .decode(&chunk.ciphertext)
            .map_err(|_| CryptoError::DecryptionFailed)?;
        open(&my_secret, &sealed)
    }
}
