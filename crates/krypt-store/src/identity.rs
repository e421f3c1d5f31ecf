//! Load/save for the single-row local identity.

use rusqlite::params;

use crate::database::Database;
use crate::error::Result;
use crate::models::LocalIdentityRow;

impl Database {
    /// Fetch the persisted device identity, if one exists.
    pub fn get_local_identity(&self) -> Result<Option<LocalIdentityRow>> {
        let row = self
            .conn()
            .query_row(
                "SELECT device_id, public_key, private_key
                 FROM local_identity WHERE id = 1",
                [],
                |row| {
                    Ok(LocalIdentityRow {
                        device_id: row.get(0)?,
                        public_key: row.get(1)?,
                        private_key: row.get(2)?,
                    })
                },
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })?;
        Ok(row)
    }

    /// Persist the device identity.  Replaces any existing row.
    pub fn save_local_identity(&self, identity: &LocalIdentityRow) -> Result<()> {
        self.conn().execute(
            "INSERT OR REPLACE INTO local_identity (id, device_id, public_key, private_key)
             VALUES (1, ?1, ?2, ?3)",
            params![
                identity.device_id,
                identity.public_key,
                identity.private_key,
            ],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_db() -> (tempfile::TempDir, Database) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_at(&dir.path().join("test.db")).unwrap();
        (dir, db)
    }

    #[test]
    fn missing_identity_is_none() {
        let (_dir, db) = open_db();
        assert!(db.get_local_identity().unwrap().is_none());
    }

    #[test]
    fn save_and_load_round_trip() {
        let (_dir, db) = open_db();
        let identity = LocalIdentityRow {
            device_id: "device-1".into(),
            public_key: "aa".repeat(32),
            private_key: "bb".repeat(32),
        };
        db.save_local_identity(&identity).unwrap();

        let loaded = db.get_local_identity().unwrap().unwrap();
        assert_eq!(loaded, identity);
    }
}
