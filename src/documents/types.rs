use serde::{Deserialize, Serialize};

/// A document record, including sharing and lease state. The lease fields
/// (`locked_by`, `lock_expires_at`) are cleared lazily: an expired lease is
/// treated as absent everywhere even while the fields still hold values.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub id: String,
    pub title: String,
    pub content: String,
    pub owner_id: String,
    pub editors: Vec<String>,
    pub view_public: bool,
    pub public_token: Option<String>,
    pub locked_by: Option<String>,
    pub lock_expires_at: Option<i64>,
    pub deleted_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Input for updating a document; absent fields are left untouched
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateDocumentInput {
    pub title: Option<String>,
    pub content: Option<String>,
}

/// Read-only projection served through a public link
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicDocument {
    pub title: String,
    pub content: String,
    pub updated_at: i64,
}

/// Outcome of a lease-guarded field update
#[derive(Debug)]
pub enum GuardedUpdate {
    /// Fields applied (or nothing to apply); holds the current row
    Applied(Document),
    /// The caller does not hold an unexpired lease; carries the lease state
    /// observed inside the same guard
    LockMissed {
        locked_by: Option<String>,
        lock_expires_at: Option<i64>,
    },
    /// No active document with this id
    Missing,
}

/// Outcome of an editor-set mutation
#[derive(Debug)]
pub enum EditorChange {
    /// The resulting editor set (unchanged for no-op adds/removes)
    Applied(Vec<String>),
    /// No active document with this id owned by the caller
    Missing,
}
