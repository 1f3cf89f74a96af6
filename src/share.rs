//! Public-link sharing. A token is an unguessable opaque string granting
//! read-only access without authentication. It is generated once per
//! enablement span: repeated enables return the same token, and disabling
//! (or trashing) clears it so a later re-enable issues a fresh one.

use crate::documents::PublicDocument;
use crate::error::ServiceError;
use crate::service::Service;
use tracing::debug;

impl Service {
    /// Turn sharing on for a document the caller owns and return the public
    /// token. Idempotent: a second enable returns the same token.
    pub fn enable_public_link(&self, user_id: &str, doc_id: &str) -> Result<String, ServiceError> {
        let candidate = generate_token();
        let now = chrono::Utc::now().timestamp_millis();

        match self
            .db
            .enable_public_link(doc_id, user_id, &candidate, now)?
        {
            Some(token) => {
                debug!(doc = doc_id, "public link enabled");
                Ok(token)
            }
            None => Err(ServiceError::NotFound),
        }
    }

    /// Turn sharing off and forget the token. Idempotent when already off.
    pub fn disable_public_link(&self, user_id: &str, doc_id: &str) -> Result<(), ServiceError> {
        let now = chrono::Utc::now().timestamp_millis();

        if self.db.disable_public_link(doc_id, user_id, now)? {
            debug!(doc = doc_id, "public link disabled");
            Ok(())
        } else {
            Err(ServiceError::NotFound)
        }
    }

    /// Unauthenticated read-only fetch by token. Matches only non-trashed
    /// documents with sharing currently enabled; never mutates, never
    /// touches the lease.
    pub fn get_public_document(&self, token: &str) -> Result<PublicDocument, ServiceError> {
        self.db
            .get_document_by_token(token)?
            .ok_or(ServiceError::NotFound)
    }
}

/// Opaque token for public links: 64 hex chars derived from fresh randomness
fn generate_token() -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(uuid::Uuid::new_v4().as_bytes());
    hasher.update(chrono::Utc::now().timestamp_millis().to_le_bytes());
    format!("{:x}", hasher.finalize())
}
