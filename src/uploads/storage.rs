use super::types::Upload;
use crate::database::{Database, DbError};

impl Database {
    /// Create the uploads table
    pub fn create_uploads_table(&self) -> Result<(), DbError> {
        let conn = self.conn.lock().map_err(|_| DbError::Lock)?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS uploads (
                id TEXT PRIMARY KEY,
                owner_id TEXT NOT NULL,
                original_name TEXT NOT NULL,
                filename TEXT NOT NULL,
                mime_type TEXT NOT NULL,
                size INTEGER NOT NULL,
                url TEXT NOT NULL,
                deleted_at INTEGER,
                created_at INTEGER NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_uploads_owner_created
             ON uploads(owner_id, created_at DESC)",
            [],
        )?;

        Ok(())
    }

    /// Record a new upload reference
    pub fn insert_upload(
        &self,
        owner_id: &str,
        original_name: &str,
        filename: &str,
        mime_type: &str,
        size: i64,
        url: &str,
    ) -> Result<Upload, DbError> {
        let conn = self.conn.lock().map_err(|_| DbError::Lock)?;
        let id = uuid::Uuid::new_v4().to_string();
        let now = chrono::Utc::now().timestamp_millis();

        conn.execute(
            "INSERT INTO uploads (id, owner_id, original_name, filename, mime_type, size, url,
                                  deleted_at, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, NULL, ?8)",
            rusqlite::params![id, owner_id, original_name, filename, mime_type, size, url, now],
        )?;

        Ok(Upload {
            id,
            owner_id: owner_id.to_string(),
            original_name: original_name.to_string(),
            filename: filename.to_string(),
            mime_type: mime_type.to_string(),
            size,
            url: url.to_string(),
            deleted_at: None,
            created_at: now,
        })
    }

    /// List a user's active uploads, newest first
    pub fn list_uploads_by_owner(&self, owner_id: &str) -> Result<Vec<Upload>, DbError> {
        let conn = self.conn.lock().map_err(|_| DbError::Lock)?;

        let mut stmt = conn.prepare(
            "SELECT id, owner_id, original_name, filename, mime_type, size, url,
                    deleted_at, created_at
             FROM uploads
             WHERE owner_id = ?1 AND deleted_at IS NULL
             ORDER BY created_at DESC",
        )?;

        let rows = stmt.query_map([owner_id], |row| {
            Ok(Upload {
                id: row.get(0)?,
                owner_id: row.get(1)?,
                original_name: row.get(2)?,
                filename: row.get(3)?,
                mime_type: row.get(4)?,
                size: row.get(5)?,
                url: row.get(6)?,
                deleted_at: row.get(7)?,
                created_at: row.get(8)?,
            })
        })?;

        let mut uploads = Vec::new();
        for row in rows {
            uploads.push(row?);
        }

        Ok(uploads)
    }

    /// Soft-delete an upload reference. Owner-scoped; returns false when no
    /// active upload with this id belongs to the caller.
    pub fn soft_delete_upload(&self, id: &str, owner_id: &str, now: i64) -> Result<bool, DbError> {
        let conn = self.conn.lock().map_err(|_| DbError::Lock)?;

        let affected = conn.execute(
            "UPDATE uploads SET deleted_at = ?1
             WHERE id = ?2 AND owner_id = ?3 AND deleted_at IS NULL",
            rusqlite::params![now, id, owner_id],
        )?;

        Ok(affected > 0)
    }
}
