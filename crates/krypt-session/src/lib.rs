//! # krypt-session
//!
//! Session orchestration core for the Krypt client: identity lifecycle,
//! the encrypted message protocol with delivery/read receipts, chunked
//! file transfer with concurrent reassembly, and the call signaling state
//! machine, composed by [`session::Session`] and driven by envelopes from
//! the relay transport.
//!
//! UI, media capture, and the raw transport are external; they plug in via
//! the [`transport::RelayTransport`] and [`media::MediaEngine`] traits and
//! observe the session through [`events::SessionEvent`].

pub mod call;
pub mod error;
pub mod events;
pub mod identity;
pub mod media;
pub mod messaging;
pub mod session;
pub mod transfer;
pub mod transport;

#[cfg(test)]
pub(crate) mod testutil;

pub use call::{CallMachine, CallPhase};
pub use error::{Result, SessionError};
pub use events::SessionEvent;
pub use identity::Identity;
pub use media::{MediaEngine, MediaError, MediaEvent, MediaSession};
pub use messaging::MessageEngine;
pub use session::{Session, SessionConfig};
pub use transfer::TransferEngine;
pub use transport::RelayTransport;

use tracing_subscriber::{fmt, EnvFilter};

/// Initialise the tracing subscriber for a host application.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("krypt_session=debug,krypt_store=info,warn"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}
