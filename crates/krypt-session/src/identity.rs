//! Device identity: a stable UUID plus the X25519 key pair.

use tracing::info;

use krypt_shared::crypto::CryptoProvider;
use krypt_shared::types::PeerUuid;
use krypt_store::{Database, LocalIdentityRow};

use crate::error::Result;

/// The local device identity.  Created once on first run and immutable
/// afterwards.
#[derive(Debug, Clone)]
pub struct Identity {
    pub device_id: PeerUuid,
    /// Hex-encoded X25519 public key, announced to the relay.
    pub public_key: String,
    private_key: String,
}

impl Identity {
    /// Hex-encoded X25519 secret key.  Never leaves the device.
    pub fn private_key(&self) -> &str {
        &self.private_key
    }
}

/// Load the persisted identity, or generate and persist one on first run.
/// Idempotent: a second call returns the same identity without touching the
/// key pair.
pub fn load_or_create(db: &Database, crypto: &dyn CryptoProvider) -> Result<Identity> {
    if let Some(row) = db.get_local_identity()? {
        return Ok(Identity {
            device_id: PeerUuid(row.device_id),
            public_key: row.public_key,
            private_key: row.private_key,
        });
    }

    let (public_key, private_key) = crypto.generate_keypair();
    let device_id = PeerUuid::generate();

    db.save_local_identity(&LocalIdentityRow {
        device_id: device_id.as_str().to_string(),
        public_key: public_key.clone(),
        private_key: private_key.clone(),
    })?;

    info!(device = %device_id.short(), "created new device identity");

    Ok(Identity {
        device_id,
        public_key,
        private_key,
    })
}
