//! Transfer reassembly engine: chunked outbound file sends and concurrent
//! inbound reassembly.
//!
//! Inbound chunks for any number of transfers may be processed on
//! concurrent tasks.  All reassembly state lives in one mutex-guarded
//! arena keyed by transfer id; a chunk insert, the completion check, and
//! the removal of a completed transfer happen under a single lock
//! acquisition, so assembly runs at most once per transfer no matter how
//! the final chunks race.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use krypt_shared::constants::{CHUNK_PACING_MS, MAX_FILE_SIZE};
use krypt_shared::protocol::FileChunk;
use krypt_shared::types::{ContentType, PeerUuid};
use krypt_store::NewMessage;

use crate::error::{Result, SessionError};
use crate::events::{emit, SessionEvent};
use crate::session::SessionCtx;

/// Accumulated state for one inbound transfer.
struct PendingTransfer {
    /// Decrypted chunk bodies by index.  Insertion overwrites, so duplicate
    /// delivery of a chunk cannot inflate the completion count.
    received: HashMap<u32, Vec<u8>>,
    /// Last-seen chunk header; supplies file name and MIME type at
    /// assembly time.
    meta: FileChunk,
}

pub struct TransferEngine {
    ctx: Arc<SessionCtx>,
    files_dir: PathBuf,
    pending: Mutex<HashMap<String, PendingTransfer>>,
}

impl TransferEngine {
    pub(crate) fn new(ctx: Arc<SessionCtx>, files_dir: PathBuf) -> Self {
        Self {
            ctx,
            files_dir,
            pending: Mutex::new(HashMap::new()),
        }
    }

    // ------------------------------------------------------------------
    // Outbound
    // ------------------------------------------------------------------

    /// Encrypt a file into chunks and send them in index order, paced so
    /// the relay buffer can drain.  Per-chunk failures are counted but do
    /// not abort the transfer.  Returns the local message id.
    pub async fn send_file(
        &self,
        to: &PeerUuid,
        bytes: &[u8],
        file_name: &str,
        mime_type: &str,
    ) -> Result<i64> {
        let contact = self.ctx.sendable_contact(to).await?;

        if bytes.len() > MAX_FILE_SIZE {
            return Err(SessionError::FileTooLarge {
                size: bytes.len(),
                max: MAX_FILE_SIZE,
            });
        }

        // Fresh id per transfer so re-sending the same file never collides.
        let transfer_id = Uuid::new_v4().to_string();

        let chunks = match self.ctx.crypto.encrypt_chunks(
            bytes,
            file_name,
            mime_type,
            &contact.public_key,
            &transfer_id,
        ) {
            Ok(c) => c,
            Err(e) => {
                warn!(to = %to.short(), error = %e, "chunk encrypt failed, re-requesting key");
                self.ctx.transport.request_public_key(to).await;
                return Err(SessionError::MissingKey);
            }
        };

        debug!(
            transfer = %transfer_id,
            chunks = chunks.len(),
            size = bytes.len(),
            "sending file"
        );

        let total = chunks.len();
        let mut failed = 0usize;
        for chunk in chunks {
            if !self.ctx.transport.send_file_chunk(to, chunk).await {
                failed += 1;
            }
            tokio::time::sleep(Duration::from_millis(CHUNK_PACING_MS)).await;
        }
        if failed > 0 {
            warn!(failed, total, transfer = %transfer_id, "some chunks failed to send");
        }

        // Keep a plaintext copy so the sender sees their own file.
        let path = self.write_local_copy(file_name, bytes).await?;

        let id = self.ctx.db()?.insert_message(&NewMessage {
            conversation_id: to.as_str().to_string(),
            from_uuid: self.ctx.identity.device_id.as_str().to_string(),
            content: format!("[sent: {file_name}]"),
            content_type: ContentType::for_mime(mime_type),
            file_path: Some(path.display().to_string()),
            is_sent: true,
            is_delivered: false,
            is_read: false,
            timestamp: Utc::now(),
        })?;

        info!(msg_id = id, transfer = %transfer_id, to = %to.short(), "file sent");
        Ok(id)
    }

    // ------------------------------------------------------------------
    // Inbound
    // ------------------------------------------------------------------

    /// Handle one inbound chunk.  Decrypts immediately, accumulates, and
    /// assembles once all indices are present.
    pub async fn on_chunk(&self, from: &PeerUuid, chunk: FileChunk) -> Result<()> {
        let key = reassembly_key(from, &chunk);

        if chunk.total_chunks == 0 || chunk.chunk_index >= chunk.total_chunks {
            warn!(
                key = %key,
                index = chunk.chunk_index,
                total = chunk.total_chunks,
                "chunk header out of range, dropped"
            );
            return Ok(());
        }

        debug!(
            key = %key,
            index = chunk.chunk_index,
            total = chunk.total_chunks,
            "received file chunk"
        );

        // Decrypt before touching the arena so a corrupt chunk fails fast.
        let bytes = match self
            .ctx
            .crypto
            .decrypt_chunk(&chunk, self.ctx.identity.private_key())
        {
            Ok(b) => b,
            Err(e) => {
                warn!(key = %key, error = %e, "chunk decrypt failed, discarding transfer state");
                self.remove_pending(&key)?;
                return Ok(());
            }
        };

        // Insert, check completion, and detach the finished transfer under
        // one lock acquisition.
        let completed = {
            let mut pending = self.pending.lock().map_err(|_| SessionError::LockPoisoned)?;
            let entry = pending
                .entry(key.clone())
                .or_insert_with(|| PendingTransfer {
                    received: HashMap::new(),
                    meta: chunk.clone(),
                });
            entry.received.insert(chunk.chunk_index, bytes);
            entry.meta = chunk;

            if entry.received.len() as u32 == entry.meta.total_chunks {
                pending.remove(&key)
            } else {
                None
            }
        };

        let Some(transfer) = completed else {
            return Ok(());
        };

        match self.assemble(from, transfer).await {
            Ok(AssembleOutcome::Done {
                message_id,
                file_name,
            }) => {
                if !self.ctx.is_conversation_open(from) {
                    emit(
                        &self.ctx.events,
                        SessionEvent::FileReceived {
                            from: from.clone(),
                            message_id,
                            file_name,
                        },
                    );
                }
            }
            Ok(AssembleOutcome::MissingIndex(transfer)) => {
                // Defect-tolerance guard: should be unreachable given the
                // header validation above.  Keep the state pending.
                if let Ok(mut pending) = self.pending.lock() {
                    pending.insert(key, transfer);
                }
            }
            Err(e) => {
                // State was already detached, so the next chunk with this
                // transfer id starts clean.
                warn!(key = %key, error = %e, "file assembly failed, transfer discarded");
            }
        }
        Ok(())
    }

    /// Concatenate the chunks in strict index order (never insertion
    /// order), persist the file and its message.
    async fn assemble(
        &self,
        from: &PeerUuid,
        transfer: PendingTransfer,
    ) -> Result<AssembleOutcome> {
        let total = transfer.meta.total_chunks;

        let mut data = Vec::new();
        for index in 0..total {
            match transfer.received.get(&index) {
                Some(part) => data.extend_from_slice(part),
                None => {
                    warn!(
                        transfer = %transfer.meta.transfer_id,
                        index,
                        "missing chunk at assembly time"
                    );
                    return Ok(AssembleOutcome::MissingIndex(transfer));
                }
            }
        }

        let file_name = transfer.meta.file_name.clone();
        let path = self.write_local_copy(&file_name, &data).await?;

        info!(
            transfer = %transfer.meta.transfer_id,
            path = %path.display(),
            size = data.len(),
            "file assembled"
        );

        let message_id = self.ctx.db()?.insert_message(&NewMessage {
            conversation_id: from.as_str().to_string(),
            from_uuid: from.as_str().to_string(),
            content: format!("[received: {file_name}]"),
            content_type: ContentType::for_mime(&transfer.meta.mime_type),
            file_path: Some(path.display().to_string()),
            is_sent: false,
            is_delivered: true,
            is_read: false,
            timestamp: Utc::now(),
        })?;

        Ok(AssembleOutcome::Done {
            message_id,
            file_name,
        })
    }

    async fn write_local_copy(&self, file_name: &str, data: &[u8]) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.files_dir).await?;
        // Keep only the final path component; a sender-controlled name must
        // not escape the files dir.
        let base = Path::new(file_name)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "download.bin".to_string());
        let path = self.files_dir.join(base);
        tokio::fs::write(&path, data).await?;
        Ok(path)
    }

    fn remove_pending(&self, key: &str) -> Result<()> {
        self.pending
            .lock()
            .map_err(|_| SessionError::LockPoisoned)?
            .remove(key);
        Ok(())
    }

    #[cfg(test)]
    fn pending_count(&self) -> usize {
        self.pending.lock().unwrap().len()
    }
}

enum AssembleOutcome {
    Done { message_id: i64, file_name: String },
    MissingIndex(PendingTransfer),
}

/// Prefer the transfer id; fall back to a sender/name/count key for legacy
/// senders that omit it.  The fallback is not collision-safe across
/// concurrent same-name transfers.
fn reassembly_key(from: &PeerUuid, chunk: &FileChunk) -> String {
    if chunk.transfer_id.is_empty() {
        format!("{}_{}_{}", from, chunk.file_name, chunk.total_chunks)
    } else {
        chunk.transfer_id.clone()
    }
}
