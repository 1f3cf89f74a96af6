//! Core of a collaborative document drive: identity, documents with
//! soft-delete and public-link sharing, upload references, and a TTL-lease
//! lock manager enforcing single-writer editing over a single SQLite store.
//!
//! HTTP routing, session tokens, and blob storage are external
//! collaborators; they call in through [`Service`] with an opaque,
//! already-authenticated caller id.

pub mod access;
pub mod database;
pub mod documents;
pub mod error;
pub mod lock;
pub mod service;
pub mod share;
pub mod uploads;
pub mod users;

pub use database::{Database, DbError};
pub use documents::{Document, PublicDocument, UpdateDocumentInput};
pub use error::{ErrorBody, ServiceError};
pub use lock::{LockInfo, LOCK_TTL_MS};
pub use service::Service;
pub use uploads::{Upload, UploadInput};
pub use users::User;
