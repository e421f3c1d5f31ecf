//! CRUD operations for [`Status`] records.
//!
//! Statuses are ephemeral: `expires_at` is fixed at insert time and the
//! session layer sweeps expired rows periodically.

use chrono::{DateTime, Duration, Utc};
use krypt_shared::constants::STATUS_TTL_HOURS;
use rusqlite::params;

use crate::database::Database;
use crate::error::Result;
use crate::models::{NewStatus, Status};

impl Database {
    /// Insert a status and return its rowid.  The expiry is derived from
    /// `created_at` plus the status TTL.
    pub fn insert_status(&self, status: &NewStatus) -> Result<i64> {
        let expires_at = status.created_at + Duration::hours(STATUS_TTL_HOURS);
        self.conn().execute(
            "INSERT INTO statuses (from_uuid, content, created_at, expires_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                status.from_uuid,
                status.content,
                status.created_at.to_rfc3339(),
                expires_at.to_rfc3339(),
            ],
        )?;
        Ok(self.conn().last_insert_rowid())
    }

    /// All statuses that have not yet expired, newest first.
    pub fn active_statuses(&self) -> Result<Vec<Status>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, from_uuid, content, created_at, expires_at
             FROM statuses
             WHERE expires_at > ?1
             ORDER BY created_at DESC",
        )?;

        let rows = stmt.query_map(params![Utc::now().to_rfc3339()], row_to_status)?;

        let mut statuses = Vec::new();
        for row in rows {
            statuses.push(row?);
        }
        Ok(statuses)
    }

    /// Delete a single status.  Returns `true` if a row was deleted.
    pub fn delete_status(&self, id: i64) -> Result<bool> {
        let affected = self
            .conn()
            .execute("DELETE FROM statuses WHERE id = ?1", params![id])?;
        Ok(affected > 0)
    }

    /// Remove every expired status.  Returns the number of rows deleted.
    pub fn delete_expired_statuses(&self) -> Result<usize> {
        let affected = self.conn().execute(
            "DELETE FROM statuses WHERE expires_at <= ?1",
            params![Utc::now().to_rfc3339()],
        )?;
        Ok(affected)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn row_to_status(row: &rusqlite::Row<'_>) -> rusqlite::Result<Status> {
    let created_str: String = row.get(3)?;
    let expires_str: String = row.get(4)?;

    let parse = |s: &str, idx: usize| {
        DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(
                    idx,
                    rusqlite::types::Type::Text,
                    Box::new(e),
                )
            })
    };

    Ok(Status {
        id: row.get(0)?,
        from_uuid: row.get(1)?,
        content: row.get(2)?,
        created_at: parse(&created_str, 3)?,
        expires_at: parse(&expires_str, 4)?,
    })
}
