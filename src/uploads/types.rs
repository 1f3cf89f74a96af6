use serde::{Deserialize, Serialize};

/// MIME types accepted for upload references (images only)
pub const ALLOWED_MIME_TYPES: &[&str] =
    &["image/jpeg", "image/png", "image/webp", "image/gif"];

/// Maximum accepted blob size (5 MiB)
pub const MAX_UPLOAD_BYTES: i64 = 5 * 1024 * 1024;

/// An access-controlled reference to a blob stored elsewhere. The core never
/// sees the bytes; it tracks ownership and soft-delete state only.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Upload {
    pub id: String,
    pub owner_id: String,
    pub original_name: String,
    pub filename: String,
    pub mime_type: String,
    pub size: i64,
    pub url: String,
    pub deleted_at: Option<i64>,
    pub created_at: i64,
}

/// Input describing a blob handed over by the storage collaborator
#[derive(Debug, Clone, Deserialize)]
pub struct UploadInput {
    pub original_name: String,
    pub mime_type: String,
    pub size: i64,
}
