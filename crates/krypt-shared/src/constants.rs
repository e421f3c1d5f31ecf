/// Application name
pub const APP_NAME: &str = "Krypt";

/// XChaCha20-Poly1305 nonce size in bytes
pub const NONCE_SIZE: usize = 24;

/// X25519 public key size in bytes
pub const PUBKEY_SIZE: usize = 32;

/// Symmetric key size in bytes (for XChaCha20-Poly1305)
pub const SYMMETRIC_KEY_SIZE: usize = 32;

/// Plaintext bytes per file chunk (64 KiB)
pub const CHUNK_SIZE: usize = 64 * 1024;

/// Maximum file transfer size in bytes (50 MiB)
pub const MAX_FILE_SIZE: usize = 50 * 1024 * 1024;

/// Delay between consecutive outbound file chunks, in milliseconds.
/// Backpressure against unbounded relay buffering, not a protocol rule.
pub const CHUNK_PACING_MS: u64 = 80;

/// Lifetime of a status broadcast before it is swept, in hours
pub const STATUS_TTL_HOURS: i64 = 24;

/// Period of the expired-status sweep, in seconds
pub const STATUS_SWEEP_SECS: u64 = 60;

/// Key derivation contexts (BLAKE3)
pub const KDF_CONTEXT_SEAL_KEY: &str = "krypt-seal-key-v1";
