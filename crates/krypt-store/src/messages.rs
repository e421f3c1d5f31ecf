//! CRUD and receipt operations for [`Message`] records.
//!
//! Delivery and read flags only ever move forward (0 -> 1); the UPDATE
//! statements are written so re-applying a receipt is a no-op.

use chrono::{DateTime, Utc};
use krypt_shared::types::ContentType;
use rusqlite::params;

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::{Message, NewMessage};

impl Database {
    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    /// Insert a message and return its rowid (the monotonic local id).
    pub fn insert_message(&self, message: &NewMessage) -> Result<i64> {
        self.conn().execute(
            "INSERT INTO messages
                 (conversation_id, from_uuid, content, content_type, file_path,
                  is_sent, is_delivered, is_read, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                message.conversation_id,
                message.from_uuid,
                message.content,
                message.content_type.as_str(),
                message.file_path,
                message.is_sent,
                message.is_delivered,
                message.is_read,
                message.timestamp.to_rfc3339(),
            ],
        )?;
        Ok(self.conn().last_insert_rowid())
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    /// Fetch a single message by id.
    pub fn get_message(&self, id: i64) -> Result<Message> {
        self.conn()
            .query_row(
                "SELECT id, conversation_id, from_uuid, content, content_type,
                        file_path, is_sent, is_delivered, is_read, timestamp
                 FROM messages WHERE id = ?1",
                params![id],
                row_to_message,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }

    /// All messages of one conversation in insertion order.
    pub fn get_messages_for_conversation(&self, conversation_id: &str) -> Result<Vec<Message>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, conversation_id, from_uuid, content, content_type,
                    file_path, is_sent, is_delivered, is_read, timestamp
             FROM messages
             WHERE conversation_id = ?1
             ORDER BY id ASC",
        )?;

        let rows = stmt.query_map(params![conversation_id], row_to_message)?;

        let mut messages = Vec::new();
        for row in rows {
            messages.push(row?);
        }
        Ok(messages)
    }

    /// The latest message of every conversation, for the conversation list.
    pub fn get_conversation_previews(&self) -> Result<Vec<Message>> {
        let mut stmt = self.conn().prepare(
            "SELECT m.id, m.conversation_id, m.from_uuid, m.content, m.content_type,
                    m.file_path, m.is_sent, m.is_delivered, m.is_read, m.timestamp
             FROM messages m
             JOIN (SELECT conversation_id, MAX(id) AS max_id
                   FROM messages GROUP BY conversation_id) latest
               ON m.id = latest.max_id
             ORDER BY m.id DESC",
        )?;

        let rows = stmt.query_map([], row_to_message)?;

        let mut previews = Vec::new();
        for row in rows {
            previews.push(row?);
        }
        Ok(previews)
    }

    /// Number of inbound messages not yet read in one conversation.
    pub fn unread_count(&self, conversation_id: &str) -> Result<i64> {
        let count = self.conn().query_row(
            "SELECT COUNT(*) FROM messages
             WHERE conversation_id = ?1 AND is_sent = 0 AND is_read = 0",
            params![conversation_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    // ------------------------------------------------------------------
    // Receipts
    // ------------------------------------------------------------------

    /// Mark one outbound message delivered.  Idempotent.
    pub fn mark_delivered(&self, id: i64) -> Result<bool> {
        let affected = self.conn().execute(
            "UPDATE messages SET is_delivered = 1
             WHERE id = ?1 AND is_sent = 1 AND is_delivered = 0",
            params![id],
        )?;
        Ok(affected > 0)
    }

    /// Mark every outbound message of a conversation read (a `read_all`
    /// receipt from the peer).  Idempotent.
    pub fn mark_outbound_read(&self, conversation_id: &str) -> Result<usize> {
        let affected = self.conn().execute(
            "UPDATE messages SET is_read = 1
             WHERE conversation_id = ?1 AND is_sent = 1 AND is_read = 0",
            params![conversation_id],
        )?;
        Ok(affected)
    }

    /// Mark every inbound message of a conversation read (the local user
    /// opened it).  Idempotent.
    pub fn mark_inbound_read(&self, conversation_id: &str) -> Result<usize> {
        let affected = self.conn().execute(
            "UPDATE messages SET is_read = 1
             WHERE conversation_id = ?1 AND is_sent = 0 AND is_read = 0",
            params![conversation_id],
        )?;
        Ok(affected)
    }

    // ------------------------------------------------------------------
    // Delete
    // ------------------------------------------------------------------

    /// Delete a single message.  Returns `true` if a row was deleted.
    pub fn delete_message(&self, id: i64) -> Result<bool> {
        let affected = self
            .conn()
            .execute("DELETE FROM messages WHERE id = ?1", params![id])?;
        Ok(affected > 0)
    }

    /// Delete every message of one conversation.  Returns the row count.
    pub fn delete_conversation(&self, conversation_id: &str) -> Result<usize> {
        let affected = self.conn().execute(
            "DELETE FROM messages WHERE conversation_id = ?1",
            params![conversation_id],
        )?;
        Ok(affected)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Map a `rusqlite::Row` to a [`Message`].
fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    let content_type_str: String = row.get(4)?;
    let ts_str: String = row.get(9)?;

    let timestamp: DateTime<Utc> = DateTime::parse_from_rfc3339(&ts_str)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(9, rusqlite::types::Type::Text, Box::new(e))
        })?;

    Ok(Message {
        id: row.get(0)?,
        conversation_id: row.get(1)?,
        from_uuid: row.get(2)?,
        content: row.get(3)?,
        content_type: ContentType::from_db(&content_type_str),
        file_path: row.get(5)?,
        is_sent: row.get(6)?,
        is_delivered: row.get(7)?,
        is_read: row.get(8)?,
        timestamp,
    })
}
