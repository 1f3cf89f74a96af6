//! Access policy: pure decisions over a document snapshot. No side effects;
//! the lease (see `lock`) further restricts who may write *concurrently*.

use crate::documents::Document;

/// True iff the user owns the document
pub fn is_owner(doc: &Document, user_id: &str) -> bool {
    doc.owner_id == user_id
}

/// Owner and editors are write-eligible. The owner has implicit access and
/// is never listed in `editors`.
pub fn can_write(doc: &Document, user_id: &str) -> bool {
    is_owner(doc, user_id) || doc.editors.iter().any(|e| e == user_id)
}

/// There is no separate read-only share tier: readers are the write-eligible
/// set. Unauthenticated reads go through the public-token path instead.
pub fn can_read(doc: &Document, user_id: &str) -> bool {
    can_write(doc, user_id)
}
