use super::types::{Document, EditorChange, GuardedUpdate, PublicDocument, UpdateDocumentInput};
use crate::database::{Database, DbError};

impl Database {
    /// Create the documents table
    pub fn create_documents_table(&self) -> Result<(), DbError> {
        let conn = self.conn.lock().map_err(|_| DbError::Lock)?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS documents (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                content TEXT NOT NULL DEFAULT '',
                owner_id TEXT NOT NULL,
                editors TEXT NOT NULL DEFAULT '[]',
                view_public INTEGER NOT NULL DEFAULT 0,
                public_token TEXT,
                locked_by TEXT,
                lock_expires_at INTEGER,
                deleted_at INTEGER,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_documents_owner_updated
             ON documents(owner_id, updated_at DESC)",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_documents_public_token
             ON documents(public_token)",
            [],
        )?;

        Ok(())
    }

    /// Insert a new document with no lease, no sharing, not trashed
    pub fn insert_document(
        &self,
        owner_id: &str,
        title: &str,
        content: &str,
    ) -> Result<Document, DbError> {
        let conn = self.conn.lock().map_err(|_| DbError::Lock)?;
        let id = uuid::Uuid::new_v4().to_string();
        let now = chrono::Utc::now().timestamp_millis();

        conn.execute(
            "INSERT INTO documents (id, title, content, owner_id, editors,
                                    view_public, public_token, locked_by, lock_expires_at,
                                    deleted_at, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, '[]', 0, NULL, NULL, NULL, NULL, ?5, ?5)",
            rusqlite::params![id, title, content, owner_id, now],
        )?;

        Ok(Document {
            id,
            title: title.to_string(),
            content: content.to_string(),
            owner_id: owner_id.to_string(),
            editors: vec![],
            view_public: false,
            public_token: None,
            locked_by: None,
            lock_expires_at: None,
            deleted_at: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// Get a document by ID regardless of trash state
    pub fn get_document(&self, id: &str) -> Result<Option<Document>, DbError> {
        let conn = self.conn.lock().map_err(|_| DbError::Lock)?;

        let mut stmt = conn.prepare(
            "SELECT id, title, content, owner_id, editors,
                    view_public, public_token, locked_by, lock_expires_at,
                    deleted_at, created_at, updated_at
             FROM documents WHERE id = ?1",
        )?;

        let mut rows = stmt.query([id])?;

        if let Some(row) = rows.next()? {
            Ok(Some(row_to_document(row)?))
        } else {
            Ok(None)
        }
    }

    /// Get a non-trashed document by ID. Every operation that must not see
    /// trashed documents goes through this accessor.
    pub fn get_active_document(&self, id: &str) -> Result<Option<Document>, DbError> {
        let conn = self.conn.lock().map_err(|_| DbError::Lock)?;

        let mut stmt = conn.prepare(
            "SELECT id, title, content, owner_id, editors,
                    view_public, public_token, locked_by, lock_expires_at,
                    deleted_at, created_at, updated_at
             FROM documents WHERE id = ?1 AND deleted_at IS NULL",
        )?;

        let mut rows = stmt.query([id])?;

        if let Some(row) = rows.next()? {
            Ok(Some(row_to_document(row)?))
        } else {
            Ok(None)
        }
    }

    /// List a user's active documents, most recently updated first
    pub fn list_documents_by_owner(&self, owner_id: &str) -> Result<Vec<Document>, DbError> {
        let conn = self.conn.lock().map_err(|_| DbError::Lock)?;

        let mut stmt = conn.prepare(
            "SELECT id, title, content, owner_id, editors,
                    view_public, public_token, locked_by, lock_expires_at,
                    deleted_at, created_at, updated_at
             FROM documents
             WHERE owner_id = ?1 AND deleted_at IS NULL
             ORDER BY updated_at DESC",
        )?;

        let rows = stmt.query_map([owner_id], |row| row_to_document(row))?;

        let mut documents = Vec::new();
        for row in rows {
            documents.push(row?);
        }

        Ok(documents)
    }

    /// List a user's trashed documents, most recently trashed first
    pub fn list_trash_by_owner(&self, owner_id: &str) -> Result<Vec<Document>, DbError> {
        let conn = self.conn.lock().map_err(|_| DbError::Lock)?;

        let mut stmt = conn.prepare(
            "SELECT id, title, content, owner_id, editors,
                    view_public, public_token, locked_by, lock_expires_at,
                    deleted_at, created_at, updated_at
             FROM documents
             WHERE owner_id = ?1 AND deleted_at IS NOT NULL
             ORDER BY deleted_at DESC",
        )?;

        let rows = stmt.query_map([owner_id], |row| row_to_document(row))?;

        let mut documents = Vec::new();
        for row in rows {
            documents.push(row?);
        }

        Ok(documents)
    }

    /// Apply a field update, but only when the caller holds an unexpired
    /// lease. The lease check and the write are one conditional UPDATE, so a
    /// lapsed or stolen lease can never slip a write through. `updated_at`
    /// bumps only when a field actually changes.
    pub fn update_document_guarded(
        &self,
        id: &str,
        user_id: &str,
        input: &UpdateDocumentInput,
        now: i64,
    ) -> Result<GuardedUpdate, DbError> {
        let conn = self.conn.lock().map_err(|_| DbError::Lock)?;

        // Build dynamic update query
        let mut updates = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();
        let mut param_idx = 1;

        if let Some(title) = &input.title {
            updates.push(format!("title = ?{}", param_idx));
            params.push(Box::new(title.clone()));
            param_idx += 1;
        }

        if let Some(content) = &input.content {
            updates.push(format!("content = ?{}", param_idx));
            params.push(Box::new(content.clone()));
            param_idx += 1;
        }

        if !updates.is_empty() {
            updates.push(format!("updated_at = ?{}", param_idx));
            params.push(Box::new(now));
            param_idx += 1;

            let sql = format!(
                "UPDATE documents SET {}
                 WHERE id = ?{} AND deleted_at IS NULL
                   AND locked_by = ?{} AND lock_expires_at > ?{}",
                updates.join(", "),
                param_idx,
                param_idx + 1,
                param_idx + 2
            );
            params.push(Box::new(id.to_string()));
            params.push(Box::new(user_id.to_string()));
            params.push(Box::new(now));

            let params_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();
            let affected = conn.execute(&sql, params_refs.as_slice())?;

            if affected == 1 {
                return fetch_document(&conn, id).map(|doc| match doc {
                    Some(doc) => GuardedUpdate::Applied(doc),
                    None => GuardedUpdate::Missing,
                });
            }
        }

        // Nothing applied: either nothing to update, the document is gone,
        // or the lease condition failed. Classify under the same guard.
        match fetch_document(&conn, id)? {
            None => Ok(GuardedUpdate::Missing),
            Some(doc) if doc.deleted_at.is_some() => Ok(GuardedUpdate::Missing),
            Some(doc) => {
                let held_by_caller = doc.locked_by.as_deref() == Some(user_id)
                    && doc.lock_expires_at.map_or(false, |exp| exp > now);
                if held_by_caller {
                    // Empty input with a valid lease: no-op success
                    Ok(GuardedUpdate::Applied(doc))
                } else {
                    Ok(GuardedUpdate::LockMissed {
                        locked_by: doc.locked_by,
                        lock_expires_at: doc.lock_expires_at,
                    })
                }
            }
        }
    }

    /// Move a document to the trash. Clears sharing and the lease in the
    /// same statement: a trashed document must not stay writable or
    /// publicly visible. Owner-scoped; returns false when there is no
    /// active document with this id owned by the caller.
    pub fn soft_delete_document(
        &self,
        id: &str,
        owner_id: &str,
        now: i64,
    ) -> Result<bool, DbError> {
        let conn = self.conn.lock().map_err(|_| DbError::Lock)?;

        let affected = conn.execute(
            "UPDATE documents
             SET deleted_at = ?1, view_public = 0, public_token = NULL,
                 locked_by = NULL, lock_expires_at = NULL, updated_at = ?1
             WHERE id = ?2 AND owner_id = ?3 AND deleted_at IS NULL",
            rusqlite::params![now, id, owner_id],
        )?;

        Ok(affected > 0)
    }

    /// Bring a trashed document back. Owner-scoped, trash-only.
    pub fn restore_document(&self, id: &str, owner_id: &str, now: i64) -> Result<bool, DbError> {
        let conn = self.conn.lock().map_err(|_| DbError::Lock)?;

        let affected = conn.execute(
            "UPDATE documents SET deleted_at = NULL, updated_at = ?1
             WHERE id = ?2 AND owner_id = ?3 AND deleted_at IS NOT NULL",
            rusqlite::params![now, id, owner_id],
        )?;

        Ok(affected > 0)
    }

    /// Permanently remove a trashed document. Owner-scoped, trash-only.
    pub fn delete_document_forever(&self, id: &str, owner_id: &str) -> Result<bool, DbError> {
        let conn = self.conn.lock().map_err(|_| DbError::Lock)?;

        let affected = conn.execute(
            "DELETE FROM documents WHERE id = ?1 AND owner_id = ?2 AND deleted_at IS NOT NULL",
            rusqlite::params![id, owner_id],
        )?;

        Ok(affected > 0)
    }

    /// Permanently remove all of a user's trashed documents
    pub fn empty_trash(&self, owner_id: &str) -> Result<u64, DbError> {
        let conn = self.conn.lock().map_err(|_| DbError::Lock)?;

        let deleted = conn.execute(
            "DELETE FROM documents WHERE owner_id = ?1 AND deleted_at IS NOT NULL",
            rusqlite::params![owner_id],
        )?;

        Ok(deleted as u64)
    }

    /// Add a user to the editor set. Read-modify-write under one guard.
    /// Adding a user who is already an editor is a no-op that still reports
    /// the (unchanged) set and does not bump `updated_at`.
    pub fn add_editor(
        &self,
        id: &str,
        owner_id: &str,
        editor_id: &str,
        now: i64,
    ) -> Result<EditorChange, DbError> {
        let conn = self.conn.lock().map_err(|_| DbError::Lock)?;

        let mut editors = match fetch_editors(&conn, id, owner_id)? {
            Some(editors) => editors,
            None => return Ok(EditorChange::Missing),
        };

        if !editors.iter().any(|e| e == editor_id) {
            editors.push(editor_id.to_string());
            let editors_json = serde_json::to_string(&editors).unwrap_or_else(|_| "[]".to_string());
            conn.execute(
                "UPDATE documents SET editors = ?1, updated_at = ?2 WHERE id = ?3",
                rusqlite::params![editors_json, now, id],
            )?;
        }

        Ok(EditorChange::Applied(editors))
    }

    /// Remove a user from the editor set. Removing a non-editor is a no-op
    /// that still reports the (unchanged) set.
    pub fn remove_editor(
        &self,
        id: &str,
        owner_id: &str,
        editor_id: &str,
        now: i64,
    ) -> Result<EditorChange, DbError> {
        let conn = self.conn.lock().map_err(|_| DbError::Lock)?;

        let mut editors = match fetch_editors(&conn, id, owner_id)? {
            Some(editors) => editors,
            None => return Ok(EditorChange::Missing),
        };

        let before = editors.len();
        editors.retain(|e| e != editor_id);

        if editors.len() != before {
            let editors_json = serde_json::to_string(&editors).unwrap_or_else(|_| "[]".to_string());
            conn.execute(
                "UPDATE documents SET editors = ?1, updated_at = ?2 WHERE id = ?3",
                rusqlite::params![editors_json, now, id],
            )?;
        }

        Ok(EditorChange::Applied(editors))
    }

    /// Turn sharing on. The token is generated once: repeated enables keep
    /// returning the stored token. Owner-scoped; returns None when there is
    /// no active document with this id owned by the caller.
    pub fn enable_public_link(
        &self,
        id: &str,
        owner_id: &str,
        candidate_token: &str,
        now: i64,
    ) -> Result<Option<String>, DbError> {
        let conn = self.conn.lock().map_err(|_| DbError::Lock)?;

        let mut stmt = conn.prepare(
            "SELECT public_token, view_public FROM documents
             WHERE id = ?1 AND owner_id = ?2 AND deleted_at IS NULL",
        )?;
        let mut rows = stmt.query(rusqlite::params![id, owner_id])?;

        let (existing, enabled): (Option<String>, bool) = match rows.next()? {
            Some(row) => (row.get(0)?, row.get::<_, i32>(1)? != 0),
            None => return Ok(None),
        };
        drop(rows);
        drop(stmt);

        let token = existing.clone().unwrap_or_else(|| candidate_token.to_string());

        if existing.is_none() || !enabled {
            conn.execute(
                "UPDATE documents SET public_token = ?1, view_public = 1, updated_at = ?2
                 WHERE id = ?3",
                rusqlite::params![token, now, id],
            )?;
        }

        Ok(Some(token))
    }

    /// Turn sharing off and drop the token; a later re-enable issues a new
    /// one. Owner-scoped; idempotent when already disabled.
    pub fn disable_public_link(
        &self,
        id: &str,
        owner_id: &str,
        now: i64,
    ) -> Result<bool, DbError> {
        let conn = self.conn.lock().map_err(|_| DbError::Lock)?;

        let exists = conn
            .prepare(
                "SELECT 1 FROM documents
                 WHERE id = ?1 AND owner_id = ?2 AND deleted_at IS NULL",
            )?
            .exists(rusqlite::params![id, owner_id])?;
        if !exists {
            return Ok(false);
        }

        conn.execute(
            "UPDATE documents SET view_public = 0, public_token = NULL, updated_at = ?1
             WHERE id = ?2 AND (view_public = 1 OR public_token IS NOT NULL)",
            rusqlite::params![now, id],
        )?;

        Ok(true)
    }

    /// Unauthenticated read-only projection for a public token
    pub fn get_document_by_token(&self, token: &str) -> Result<Option<PublicDocument>, DbError> {
        let conn = self.conn.lock().map_err(|_| DbError::Lock)?;

        let mut stmt = conn.prepare(
            "SELECT title, content, updated_at FROM documents
             WHERE public_token = ?1 AND view_public = 1 AND deleted_at IS NULL",
        )?;

        let mut rows = stmt.query([token])?;

        if let Some(row) = rows.next()? {
            Ok(Some(PublicDocument {
                title: row.get(0)?,
                content: row.get(1)?,
                updated_at: row.get(2)?,
            }))
        } else {
            Ok(None)
        }
    }
}

fn fetch_document(conn: &rusqlite::Connection, id: &str) -> Result<Option<Document>, DbError> {
    let mut stmt = conn.prepare(
        "SELECT id, title, content, owner_id, editors,
                view_public, public_token, locked_by, lock_expires_at,
                deleted_at, created_at, updated_at
         FROM documents WHERE id = ?1",
    )?;

    let mut rows = stmt.query([id])?;

    if let Some(row) = rows.next()? {
        Ok(Some(row_to_document(row)?))
    } else {
        Ok(None)
    }
}

fn fetch_editors(
    conn: &rusqlite::Connection,
    id: &str,
    owner_id: &str,
) -> Result<Option<Vec<String>>, DbError> {
    let mut stmt = conn.prepare(
        "SELECT editors FROM documents
         WHERE id = ?1 AND owner_id = ?2 AND deleted_at IS NULL",
    )?;
    let mut rows = stmt.query(rusqlite::params![id, owner_id])?;

    if let Some(row) = rows.next()? {
        let editors_str: String = row.get(0)?;
        Ok(Some(
            serde_json::from_str(&editors_str).unwrap_or_default(),
        ))
    } else {
        Ok(None)
    }
}

fn row_to_document(row: &rusqlite::Row) -> rusqlite::Result<Document> {
    let editors_str: String = row.get(4)?;
    let editors: Vec<String> = serde_json::from_str(&editors_str).unwrap_or_default();

    Ok(Document {
        id: row.get(0)?,
        title: row.get(1)?,
        content: row.get(2)?,
        owner_id: row.get(3)?,
        editors,
        view_public: row.get::<_, i32>(5)? != 0,
        public_token: row.get(6)?,
        locked_by: row.get(7)?,
        lock_expires_at: row.get(8)?,
        deleted_at: row.get(9)?,
        created_at: row.get(10)?,
        updated_at: row.get(11)?,
    })
}
