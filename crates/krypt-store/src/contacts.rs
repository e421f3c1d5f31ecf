//! CRUD operations for [`Contact`] records.

use chrono::{DateTime, Utc};
use rusqlite::params;

use crate::database::Database;
use crate::error::Result;
use crate::models::Contact;

impl Database {
    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    /// Insert a contact.  Replaces an existing row with the same UUID.
    pub fn insert_contact(&self, contact: &Contact) -> Result<()> {
        self.conn().execute(
            "INSERT OR REPLACE INTO contacts (uuid, public_key, nickname, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                contact.uuid,
                contact.public_key,
                contact.nickname,
                contact.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    /// Fetch a single contact by peer UUID.
    pub fn get_contact(&self, uuid: &str) -> Result<Option<Contact>> {
        self.conn()
            .query_row(
                "SELECT uuid, public_key, nickname, created_at
                 FROM contacts WHERE uuid = ?1",
                params![uuid],
                row_to_contact,
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other.into()),
            })
    }

    /// List all contacts, ordered by nickname.
    pub fn list_contacts(&self) -> Result<Vec<Contact>> {
        let mut stmt = self.conn().prepare(
            "SELECT uuid, public_key, nickname, created_at
             FROM contacts
             ORDER BY nickname ASC, uuid ASC",
        )?;

        let rows = stmt.query_map([], row_to_contact)?;

        let mut contacts = Vec::new();
        for row in rows {
            contacts.push(row?);
        }
        Ok(contacts)
    }

    // ------------------------------------------------------------------
    // Update
    // ------------------------------------------------------------------

    /// Change a contact's nickname.  Returns `true` if the contact existed.
    pub fn update_nickname(&self, uuid: &str, nickname: &str) -> Result<bool> {
        let affected = self.conn().execute(
            "UPDATE contacts SET nickname = ?1 WHERE uuid = ?2",
            params![nickname, uuid],
        )?;
        Ok(affected > 0)
    }

    /// Upsert a contact's public key without touching nickname or any other
    /// local field.  Inserts a bare row when the contact is unknown, so a
    /// key response can arrive before the contact is added locally.
    pub fn set_contact_public_key(&self, uuid: &str, public_key: &str) -> Result<()> {
        let affected = self.conn().execute(
            "UPDATE contacts SET public_key = ?1 WHERE uuid = ?2",
            params![public_key, uuid],
        )?;
        if affected == 0 {
            self.conn().execute(
                "INSERT INTO contacts (uuid, public_key, nickname, created_at)
                 VALUES (?1, ?2, '', ?3)",
                params![uuid, public_key, Utc::now().to_rfc3339()],
            )?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Delete
    // ------------------------------------------------------------------

    /// Delete a contact by UUID.  Returns `true` if a row was deleted.
    pub fn delete_contact(&self, uuid: &str) -> Result<bool> {
        let affected = self
            .conn()
            .execute("DELETE FROM contacts WHERE uuid = ?1", params![uuid])?;
        Ok(affected > 0)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Map a `rusqlite::Row` to a [`Contact`].
fn row_to_contact(row: &rusqlite::Row<'_>) -> rusqlite::Result<Contact> {
    let created_str: String = row.get(3)?;
    let created_at: DateTime<Utc> = DateTime::parse_from_rfc3339(&created_str)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e))
        })?;

    Ok(Contact {
        uuid: row.get(0)?,
        public_key: row.get(1)?,
        nickname: row.get(2)?,
        created_at,
    })
}
