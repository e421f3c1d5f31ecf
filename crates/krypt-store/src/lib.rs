//! # krypt-store
//!
//! Local storage for the Krypt client, backed by SQLite.
//!
//! The crate exposes a synchronous `Database` handle that wraps a
//! `rusqlite::Connection` and provides typed CRUD helpers for every domain
//! model: contacts, messages, statuses, and the single-row local identity.

pub mod contacts;
pub mod database;
pub mod identity;
pub mod messages;
pub mod migrations;
pub mod models;
pub mod statuses;

mod error;

pub use database::Database;
pub use error::StoreError;
pub use models::*;
