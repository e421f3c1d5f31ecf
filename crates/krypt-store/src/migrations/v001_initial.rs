//! v001 -- Initial schema creation.
//!
//! Creates the four core tables: `local_identity`, `contacts`, `messages`,
//! and `statuses`.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Local identity (single row)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS local_identity (
    id          INTEGER PRIMARY KEY CHECK (id = 1),
    device_id   TEXT NOT NULL,                -- UUID v4, minted once
    public_key  TEXT NOT NULL,                -- hex-encoded X25519 pubkey
    private_key TEXT NOT NULL                 -- hex-encoded X25519 secret
);

-- ----------------------------------------------------------------
-- Contacts
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS contacts (
    uuid       TEXT PRIMARY KEY NOT NULL,     -- peer device UUID
    public_key TEXT NOT NULL DEFAULT '',      -- empty until key exchange
    nickname   TEXT NOT NULL DEFAULT '',
    created_at TEXT NOT NULL                  -- ISO-8601 / RFC-3339
);

-- ----------------------------------------------------------------
-- Messages
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS messages (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    conversation_id TEXT NOT NULL,            -- peer device UUID
    from_uuid       TEXT NOT NULL,
    content         TEXT NOT NULL,
    content_type    TEXT NOT NULL DEFAULT 'text',  -- text | image | file
    file_path       TEXT,                     -- local plaintext copy, if any
    is_sent         INTEGER NOT NULL DEFAULT 0,    -- boolean 0/1
    is_delivered    INTEGER NOT NULL DEFAULT 0,
    is_read         INTEGER NOT NULL DEFAULT 0,
    timestamp       TEXT NOT NULL             -- ISO-8601
);

CREATE INDEX IF NOT EXISTS idx_messages_conversation_id
    ON messages(conversation_id, id);

-- ----------------------------------------------------------------
-- Statuses (ephemeral broadcasts)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS statuses (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    from_uuid  TEXT NOT NULL,
    content    TEXT NOT NULL,
    created_at TEXT NOT NULL,
    expires_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_statuses_expires_at ON statuses(expires_at);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
