//! Request-per-call orchestration over the store. Each operation takes an
//! opaque, already-authenticated caller id, consults the access policy, then
//! (for mutations) the lease, and only then touches the record.

use crate::access;
use crate::database::Database;
use crate::documents::{Document, EditorChange, GuardedUpdate, UpdateDocumentInput};
use crate::error::ServiceError;
use crate::uploads::{Upload, UploadInput, ALLOWED_MIME_TYPES, MAX_UPLOAD_BYTES};
use crate::users::{hash_password, normalize_email, verify_password, User};
use std::sync::Arc;
use tracing::info;

/// Minimum accepted password length at registration
const MIN_PASSWORD_LEN: usize = 6;

pub struct Service {
    pub(crate) db: Arc<Database>,
}

impl Service {
    pub fn new(db: Arc<Database>) -> Self {
        Service { db }
    }
}

// ==================== Identity ====================

impl Service {
    /// Register a new user. The credential hash is stored; the caller-facing
    /// session machinery (tokens, cookies) lives outside the core.
    pub fn register(&self, email: &str, password: &str) -> Result<User, ServiceError> {
        let email = normalize_email(email);
        if email.is_empty() || !email.contains('@') {
            return Err(ServiceError::InvalidInput(
                "a valid email is required".to_string(),
            ));
        }
        if password.len() < MIN_PASSWORD_LEN {
            return Err(ServiceError::InvalidInput(format!(
                "password must be at least {} characters",
                MIN_PASSWORD_LEN
            )));
        }

        let password_hash = hash_password(password);
        match self.db.create_user(&email, &password_hash)? {
            Some(user) => {
                info!(user = %user.id, "user registered");
                Ok(user)
            }
            None => Err(ServiceError::Conflict),
        }
    }

    /// Resolve credentials to a user. Unknown email and wrong password fail
    /// identically so registration state never leaks.
    pub fn verify_credentials(&self, email: &str, password: &str) -> Result<User, ServiceError> {
        let email = normalize_email(email);
        let user = self
            .db
            .find_user_by_email(&email)?
            .ok_or(ServiceError::Unauthorized)?;
        if !verify_password(password, &user.password_hash) {
            return Err(ServiceError::Unauthorized);
        }
        Ok(user)
    }
}

// ==================== Documents ====================

impl Service {
    /// Create a document owned by the caller: empty content, no lease, no
    /// sharing.
    pub fn create_document(&self, user_id: &str, title: &str) -> Result<Document, ServiceError> {
        if title.trim().is_empty() {
            return Err(ServiceError::InvalidInput("title is required".to_string()));
        }

        let doc = self.db.insert_document(user_id, title, "")?;
        info!(doc = %doc.id, user = user_id, "document created");
        Ok(doc)
    }

    /// Fetch a document the caller may read
    pub fn get_document(&self, user_id: &str, doc_id: &str) -> Result<Document, ServiceError> {
        let doc = self
            .db
            .get_active_document(doc_id)?
            .ok_or(ServiceError::NotFound)?;
        if !access::can_read(&doc, user_id) {
            return Err(ServiceError::Forbidden);
        }
        Ok(doc)
    }

    /// The caller's active documents, most recently updated first
    pub fn list_documents(&self, user_id: &str) -> Result<Vec<Document>, ServiceError> {
        Ok(self.db.list_documents_by_owner(user_id)?)
    }

    /// Apply a partial update (title and/or content). Requires write
    /// eligibility and an unexpired lease held by the caller; the lease
    /// check rides in the same conditional UPDATE as the fields.
    pub fn update_document(
        &self,
        user_id: &str,
        doc_id: &str,
        input: &UpdateDocumentInput,
    ) -> Result<Document, ServiceError> {
        if let Some(title) = &input.title {
            if title.trim().is_empty() {
                return Err(ServiceError::InvalidInput("title is required".to_string()));
            }
        }

        let doc = self
            .db
            .get_active_document(doc_id)?
            .ok_or(ServiceError::NotFound)?;
        if !access::can_write(&doc, user_id) {
            return Err(ServiceError::Forbidden);
        }

        let now = chrono::Utc::now().timestamp_millis();
        match self
            .db
            .update_document_guarded(doc_id, user_id, input, now)?
        {
            GuardedUpdate::Applied(doc) => Ok(doc),
            GuardedUpdate::LockMissed {
                locked_by,
                lock_expires_at,
            } => Err(ServiceError::LockRequired {
                locked_by,
                lock_expires_at,
            }),
            GuardedUpdate::Missing => Err(ServiceError::NotFound),
        }
    }

    /// Move a document to the trash. Owner-scoped: anyone else sees
    /// `NotFound`. Sharing and the lease are cleared in the same statement,
    /// so an in-progress editor loses the lease immediately.
    pub fn delete_document(&self, user_id: &str, doc_id: &str) -> Result<(), ServiceError> {
        let now = chrono::Utc::now().timestamp_millis();
        if self.db.soft_delete_document(doc_id, user_id, now)? {
            info!(doc = doc_id, user = user_id, "document trashed");
            Ok(())
        } else {
            Err(ServiceError::NotFound)
        }
    }

    /// Copy a document the caller can write into a fresh one the caller
    /// owns: no editors, no sharing, no lease, content verbatim.
    pub fn clone_document(&self, user_id: &str, doc_id: &str) -> Result<Document, ServiceError> {
        let doc = self
            .db
            .get_active_document(doc_id)?
            .ok_or(ServiceError::NotFound)?;
        if !access::can_write(&doc, user_id) {
            return Err(ServiceError::Forbidden);
        }

        let title = format!("{} (copy)", doc.title);
        let copy = self.db.insert_document(user_id, &title, &doc.content)?;
        info!(src = doc_id, doc = %copy.id, user = user_id, "document cloned");
        Ok(copy)
    }
}

// ==================== Trash ====================

impl Service {
    /// The caller's trashed documents, most recently trashed first
    pub fn list_trash(&self, user_id: &str) -> Result<Vec<Document>, ServiceError> {
        Ok(self.db.list_trash_by_owner(user_id)?)
    }

    /// Bring a trashed document back into the active set
    pub fn restore_document(&self, user_id: &str, doc_id: &str) -> Result<(), ServiceError> {
        let now = chrono::Utc::now().timestamp_millis();
        if self.db.restore_document(doc_id, user_id, now)? {
            info!(doc = doc_id, user = user_id, "document restored");
            Ok(())
        } else {
            Err(ServiceError::NotFound)
        }
    }

    /// Irreversibly remove a trashed document
    pub fn delete_forever(&self, user_id: &str, doc_id: &str) -> Result<(), ServiceError> {
        if self.db.delete_document_forever(doc_id, user_id)? {
            info!(doc = doc_id, user = user_id, "document erased");
            Ok(())
        } else {
            Err(ServiceError::NotFound)
        }
    }

    /// Irreversibly remove everything in the caller's trash; returns the
    /// number of documents erased
    pub fn empty_trash(&self, user_id: &str) -> Result<u64, ServiceError> {
        let erased = self.db.empty_trash(user_id)?;
        info!(user = user_id, erased, "trash emptied");
        Ok(erased)
    }
}

// ==================== Editors ====================

impl Service {
    /// Grant edit access by email. Owner only; adding an existing editor is
    /// a reported-success no-op, adding the owner is rejected.
    pub fn add_editor(
        &self,
        user_id: &str,
        doc_id: &str,
        email: &str,
    ) -> Result<Vec<String>, ServiceError> {
        let email = normalize_email(email);
        if email.is_empty() {
            return Err(ServiceError::InvalidInput("email is required".to_string()));
        }

        let doc = self.owned_active_document(user_id, doc_id)?;
        let editor = self
            .db
            .find_user_by_email(&email)?
            .ok_or(ServiceError::NotFound)?;
        if editor.id == doc.owner_id {
            return Err(ServiceError::AlreadyOwner);
        }

        let now = chrono::Utc::now().timestamp_millis();
        match self.db.add_editor(doc_id, user_id, &editor.id, now)? {
            EditorChange::Applied(editors) => Ok(editors),
            EditorChange::Missing => Err(ServiceError::NotFound),
        }
    }

    /// Revoke edit access by email. Removing a user who was never an editor
    /// is a reported-success no-op.
    pub fn remove_editor(
        &self,
        user_id: &str,
        doc_id: &str,
        email: &str,
    ) -> Result<Vec<String>, ServiceError> {
        let email = normalize_email(email);
        if email.is_empty() {
            return Err(ServiceError::InvalidInput("email is required".to_string()));
        }

        self.owned_active_document(user_id, doc_id)?;
        let editor = self
            .db
            .find_user_by_email(&email)?
            .ok_or(ServiceError::NotFound)?;

        let now = chrono::Utc::now().timestamp_millis();
        match self.db.remove_editor(doc_id, user_id, &editor.id, now)? {
            EditorChange::Applied(editors) => Ok(editors),
            EditorChange::Missing => Err(ServiceError::NotFound),
        }
    }

    /// Owner-scoped fetch; non-owners get `NotFound`, never `Forbidden`
    pub(crate) fn owned_active_document(
        &self,
        user_id: &str,
        doc_id: &str,
    ) -> Result<Document, ServiceError> {
        self.db
            .get_active_document(doc_id)?
            .filter(|doc| access::is_owner(doc, user_id))
            .ok_or(ServiceError::NotFound)
    }
}

// ==================== Uploads ====================

impl Service {
    /// Record a blob reference. Validates the reference only; bytes live in
    /// external blob storage.
    pub fn record_upload(
        &self,
        user_id: &str,
        input: &UploadInput,
    ) -> Result<Upload, ServiceError> {
        if !ALLOWED_MIME_TYPES.contains(&input.mime_type.as_str()) {
            return Err(ServiceError::InvalidInput(
                "only image uploads are allowed (jpg/png/webp/gif)".to_string(),
            ));
        }
        if input.size <= 0 || input.size > MAX_UPLOAD_BYTES {
            return Err(ServiceError::InvalidInput(format!(
                "upload size must be between 1 and {} bytes",
                MAX_UPLOAD_BYTES
            )));
        }

        let filename = stored_filename(&input.original_name);
        let url = format!("/uploads/{}", filename);
        let upload = self.db.insert_upload(
            user_id,
            &input.original_name,
            &filename,
            &input.mime_type,
            input.size,
            &url,
        )?;
        Ok(upload)
    }

    /// The caller's active uploads, newest first
    pub fn list_uploads(&self, user_id: &str) -> Result<Vec<Upload>, ServiceError> {
        Ok(self.db.list_uploads_by_owner(user_id)?)
    }

    /// Soft-delete an upload reference the caller owns
    pub fn delete_upload(&self, user_id: &str, upload_id: &str) -> Result<(), ServiceError> {
        let now = chrono::Utc::now().timestamp_millis();
        if self.db.soft_delete_upload(upload_id, user_id, now)? {
            Ok(())
        } else {
            Err(ServiceError::NotFound)
        }
    }
}

/// Server-side name for a stored blob: random stem, original extension
fn stored_filename(original_name: &str) -> String {
    let stem = uuid::Uuid::new_v4().simple().to_string();
    match std::path::Path::new(original_name)
        .extension()
        .and_then(|ext| ext.to_str())
    {
        Some(ext) => format!("{}.{}", stem, ext.to_lowercase()),
        None => stem,
    }
}
