//! Lease-based edit locking. A document is writable by exactly one holder at
//! a time; the lease expires after `LOCK_TTL_MS` unless renewed and is
//! evaluated lazily — expired fields mean "unlocked" everywhere without any
//! background sweep. Every transition is a single conditional UPDATE keyed
//! on the current holder/expiry, so two callers can never both observe an
//! unlocked document and both acquire it.

use crate::access;
use crate::database::{Database, DbError};
use crate::documents::Document;
use crate::error::ServiceError;
use crate::service::Service;
use serde::Serialize;
use tracing::debug;

/// Lease duration. Renewal heartbeats should run well under this (a quarter
/// of it tolerates a few missed ticks).
pub const LOCK_TTL_MS: i64 = 60 * 1000;

/// Lease state returned to lock callers
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LockInfo {
    pub locked_by: String,
    pub lock_expires_at: i64,
}

/// True iff an unexpired lease is present
pub fn lock_is_active(doc: &Document, now: i64) -> bool {
    match (&doc.locked_by, doc.lock_expires_at) {
        (Some(_), Some(expires_at)) => expires_at > now,
        _ => false,
    }
}

/// Outcome of a conditional lock transition
#[derive(Debug)]
pub enum LockTxn {
    /// The transition applied; the new lease deadline (None after a release)
    Applied { lock_expires_at: Option<i64> },
    /// The row exists but the condition did not hold; carries the lease
    /// fields observed inside the same guard
    Denied {
        locked_by: Option<String>,
        lock_expires_at: Option<i64>,
    },
    /// No active document with this id
    Missing,
}

impl Database {
    /// Acquire or refresh: succeeds when the document is unlocked, the lease
    /// has expired, or the caller already holds it (re-entrant refresh).
    pub fn try_acquire_lock(
        &self,
        id: &str,
        user_id: &str,
        now: i64,
    ) -> Result<LockTxn, DbError> {
        let conn = self.conn.lock().map_err(|_| DbError::Lock)?;
        let expires_at = now + LOCK_TTL_MS;

        let affected = conn.execute(
            "UPDATE documents SET locked_by = ?1, lock_expires_at = ?2
             WHERE id = ?3 AND deleted_at IS NULL
               AND (locked_by IS NULL OR locked_by = ?1 OR lock_expires_at <= ?4)",
            rusqlite::params![user_id, expires_at, id, now],
        )?;

        if affected == 1 {
            return Ok(LockTxn::Applied {
                lock_expires_at: Some(expires_at),
            });
        }

        fetch_lease(&conn, id)
    }

    /// Extend the caller's unexpired lease without changing the holder
    pub fn try_renew_lock(&self, id: &str, user_id: &str, now: i64) -> Result<LockTxn, DbError> {
        let conn = self.conn.lock().map_err(|_| DbError::Lock)?;
        let expires_at = now + LOCK_TTL_MS;

        let affected = conn.execute(
            "UPDATE documents SET lock_expires_at = ?1
             WHERE id = ?2 AND deleted_at IS NULL
               AND locked_by = ?3 AND lock_expires_at > ?4",
            rusqlite::params![expires_at, id, user_id, now],
        )?;

        if affected == 1 {
            return Ok(LockTxn::Applied {
                lock_expires_at: Some(expires_at),
            });
        }

        fetch_lease(&conn, id)
    }

    /// Clear the lease while the caller is the recorded holder, expired or
    /// not. Once cleared, a second release no longer matches.
    pub fn try_release_lock(&self, id: &str, user_id: &str) -> Result<LockTxn, DbError> {
        let conn = self.conn.lock().map_err(|_| DbError::Lock)?;

        let affected = conn.execute(
            "UPDATE documents SET locked_by = NULL, lock_expires_at = NULL
             WHERE id = ?1 AND deleted_at IS NULL AND locked_by = ?2",
            rusqlite::params![id, user_id],
        )?;

        if affected == 1 {
            return Ok(LockTxn::Applied {
                lock_expires_at: None,
            });
        }

        fetch_lease(&conn, id)
    }

    /// Housekeeping only: clear lapsed lease fields in bulk. Correctness
    /// never depends on this running.
    pub fn clear_expired_locks(&self, now: i64) -> Result<u64, DbError> {
        let conn = self.conn.lock().map_err(|_| DbError::Lock)?;

        let cleared = conn.execute(
            "UPDATE documents SET locked_by = NULL, lock_expires_at = NULL
             WHERE locked_by IS NOT NULL AND lock_expires_at <= ?1",
            rusqlite::params![now],
        )?;

        Ok(cleared as u64)
    }
}

fn fetch_lease(conn: &rusqlite::Connection, id: &str) -> Result<LockTxn, DbError> {
    let mut stmt = conn.prepare(
        "SELECT locked_by, lock_expires_at FROM documents
         WHERE id = ?1 AND deleted_at IS NULL",
    )?;
    let mut rows = stmt.query([id])?;

    if let Some(row) = rows.next()? {
        Ok(LockTxn::Denied {
            locked_by: row.get(0)?,
            lock_expires_at: row.get(1)?,
        })
    } else {
        Ok(LockTxn::Missing)
    }
}

impl Service {
    /// Acquire the edit lease. Re-entrant for the current holder (refreshes
    /// the expiry); contention fails immediately with the holder and expiry
    /// so the caller can retry later.
    pub fn acquire_lock(&self, user_id: &str, doc_id: &str) -> Result<LockInfo, ServiceError> {
        let doc = self
            .db
            .get_active_document(doc_id)?
            .ok_or(ServiceError::NotFound)?;
        if !access::can_write(&doc, user_id) {
            return Err(ServiceError::Forbidden);
        }

        let now = chrono::Utc::now().timestamp_millis();
        match self.db.try_acquire_lock(doc_id, user_id, now)? {
            LockTxn::Applied { lock_expires_at } => {
                debug!(doc = doc_id, user = user_id, "lock acquired");
                Ok(LockInfo {
                    locked_by: user_id.to_string(),
                    lock_expires_at: lock_expires_at.unwrap_or(now + LOCK_TTL_MS),
                })
            }
            LockTxn::Denied {
                locked_by,
                lock_expires_at,
            } => Err(ServiceError::LockHeld {
                locked_by: locked_by.unwrap_or_default(),
                lock_expires_at: lock_expires_at.unwrap_or_default(),
            }),
            LockTxn::Missing => Err(ServiceError::NotFound),
        }
    }

    /// Heartbeat renewal; only valid while the caller's lease is unexpired
    pub fn renew_lock(&self, user_id: &str, doc_id: &str) -> Result<LockInfo, ServiceError> {
        let now = chrono::Utc::now().timestamp_millis();
        match self.db.try_renew_lock(doc_id, user_id, now)? {
            LockTxn::Applied { lock_expires_at } => Ok(LockInfo {
                locked_by: user_id.to_string(),
                lock_expires_at: lock_expires_at.unwrap_or(now + LOCK_TTL_MS),
            }),
            LockTxn::Denied { .. } => Err(ServiceError::NoActiveLock),
            LockTxn::Missing => Err(ServiceError::NotFound),
        }
    }

    /// Give the lease up. Succeeds for the recorded holder even after
    /// expiry; anyone else gets `NotLockHolder`.
    pub fn release_lock(&self, user_id: &str, doc_id: &str) -> Result<(), ServiceError> {
        match self.db.try_release_lock(doc_id, user_id)? {
            LockTxn::Applied { .. } => {
                debug!(doc = doc_id, user = user_id, "lock released");
                Ok(())
            }
            LockTxn::Denied { .. } => Err(ServiceError::NotLockHolder),
            LockTxn::Missing => Err(ServiceError::NotFound),
        }
    }

    /// Optional housekeeping sweep over lapsed lease fields
    pub fn sweep_expired_locks(&self) -> Result<u64, ServiceError> {
        let now = chrono::Utc::now().timestamp_millis();
        Ok(self.db.clear_expired_locks(now)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn setup() -> (Service, String) {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let svc = Service::new(db);
        let owner = svc
            .register("owner@test.com", "secret1")
            .unwrap()
            .id;
        (svc, owner)
    }

    fn add_editor_user(svc: &Service, doc_id: &str, owner: &str, email: &str) -> String {
        let user = svc.register(email, "secret1").unwrap();
        svc.add_editor(owner, doc_id, email).unwrap();
        user.id
    }

    fn backdate_lock(svc: &Service, doc_id: &str, expires_at: i64) {
        let conn = svc.db.conn.lock().unwrap();
        conn.execute(
            "UPDATE documents SET lock_expires_at = ?1 WHERE id = ?2",
            rusqlite::params![expires_at, doc_id],
        )
        .unwrap();
    }

    #[test]
    fn test_acquire_is_exclusive_and_leaves_state_unchanged() {
        let (svc, owner) = setup();
        let doc = svc.create_document(&owner, "Notes").unwrap();
        let editor = add_editor_user(&svc, &doc.id, &owner, "editor@test.com");

        let lease = svc.acquire_lock(&owner, &doc.id).unwrap();
        assert_eq!(lease.locked_by, owner);

        match svc.acquire_lock(&editor, &doc.id) {
            Err(ServiceError::LockHeld {
                locked_by,
                lock_expires_at,
            }) => {
                assert_eq!(locked_by, owner);
                assert_eq!(lock_expires_at, lease.lock_expires_at);
            }
            other => panic!("expected LockHeld, got {:?}", other),
        }

        // Contention must not disturb the recorded lease
        let current = svc.db.get_active_document(&doc.id).unwrap().unwrap();
        assert_eq!(current.locked_by.as_deref(), Some(owner.as_str()));
        assert_eq!(current.lock_expires_at, Some(lease.lock_expires_at));
    }

    #[test]
    fn test_reentrant_acquire_refreshes_expiry() {
        let (svc, owner) = setup();
        let doc = svc.create_document(&owner, "Notes").unwrap();

        let first = svc.acquire_lock(&owner, &doc.id).unwrap();
        backdate_lock(&svc, &doc.id, first.lock_expires_at - 30_000);

        let second = svc.acquire_lock(&owner, &doc.id).unwrap();
        assert_eq!(second.locked_by, owner);
        assert!(second.lock_expires_at > first.lock_expires_at - 30_000);
    }

    #[test]
    fn test_release_frees_the_lease() {
        let (svc, owner) = setup();
        let doc = svc.create_document(&owner, "Notes").unwrap();
        let editor = add_editor_user(&svc, &doc.id, &owner, "editor@test.com");

        svc.acquire_lock(&owner, &doc.id).unwrap();
        svc.release_lock(&owner, &doc.id).unwrap();

        let lease = svc.acquire_lock(&editor, &doc.id).unwrap();
        assert_eq!(lease.locked_by, editor);
    }

    #[test]
    fn test_expired_lease_is_reclaimable_without_release() {
        let (svc, owner) = setup();
        let doc = svc.create_document(&owner, "Notes").unwrap();
        let editor = add_editor_user(&svc, &doc.id, &owner, "editor@test.com");

        svc.acquire_lock(&owner, &doc.id).unwrap();
        let past = chrono::Utc::now().timestamp_millis() - 1_000;
        backdate_lock(&svc, &doc.id, past);

        let lease = svc.acquire_lock(&editor, &doc.id).unwrap();
        assert_eq!(lease.locked_by, editor);
    }

    #[test]
    fn test_renew_requires_unexpired_lease() {
        let (svc, owner) = setup();
        let doc = svc.create_document(&owner, "Notes").unwrap();

        // Never locked
        match svc.renew_lock(&owner, &doc.id) {
            Err(ServiceError::NoActiveLock) => {}
            other => panic!("expected NoActiveLock, got {:?}", other),
        }

        let lease = svc.acquire_lock(&owner, &doc.id).unwrap();
        let renewed = svc.renew_lock(&owner, &doc.id).unwrap();
        assert!(renewed.lock_expires_at >= lease.lock_expires_at);

        // Lapsed lease cannot be renewed
        backdate_lock(&svc, &doc.id, chrono::Utc::now().timestamp_millis() - 1);
        match svc.renew_lock(&owner, &doc.id) {
            Err(ServiceError::NoActiveLock) => {}
            other => panic!("expected NoActiveLock, got {:?}", other),
        }
    }

    #[test]
    fn test_release_by_non_holder_fails() {
        let (svc, owner) = setup();
        let doc = svc.create_document(&owner, "Notes").unwrap();
        let editor = add_editor_user(&svc, &doc.id, &owner, "editor@test.com");

        svc.acquire_lock(&owner, &doc.id).unwrap();
        match svc.release_lock(&editor, &doc.id) {
            Err(ServiceError::NotLockHolder) => {}
            other => panic!("expected NotLockHolder, got {:?}", other),
        }

        // A second release after the fields were cleared also fails
        svc.release_lock(&owner, &doc.id).unwrap();
        match svc.release_lock(&owner, &doc.id) {
            Err(ServiceError::NotLockHolder) => {}
            other => panic!("expected NotLockHolder, got {:?}", other),
        }
    }

    #[test]
    fn test_release_works_for_holder_after_expiry() {
        let (svc, owner) = setup();
        let doc = svc.create_document(&owner, "Notes").unwrap();

        svc.acquire_lock(&owner, &doc.id).unwrap();
        backdate_lock(&svc, &doc.id, chrono::Utc::now().timestamp_millis() - 1);

        svc.release_lock(&owner, &doc.id).unwrap();
        let current = svc.db.get_active_document(&doc.id).unwrap().unwrap();
        assert!(current.locked_by.is_none());
        assert!(current.lock_expires_at.is_none());
    }

    #[test]
    fn test_acquire_requires_write_eligibility() {
        let (svc, owner) = setup();
        let doc = svc.create_document(&owner, "Notes").unwrap();
        let stranger = svc.register("other@test.com", "secret1").unwrap();

        match svc.acquire_lock(&stranger.id, &doc.id) {
            Err(ServiceError::Forbidden) => {}
            other => panic!("expected Forbidden, got {:?}", other),
        }
    }

    #[test]
    fn test_lock_ops_on_trashed_doc_report_not_found() {
        let (svc, owner) = setup();
        let doc = svc.create_document(&owner, "Notes").unwrap();

        svc.acquire_lock(&owner, &doc.id).unwrap();
        svc.delete_document(&owner, &doc.id).unwrap();

        match svc.acquire_lock(&owner, &doc.id) {
            Err(ServiceError::NotFound) => {}
            other => panic!("expected NotFound, got {:?}", other),
        }
        match svc.renew_lock(&owner, &doc.id) {
            Err(ServiceError::NotFound) => {}
            other => panic!("expected NotFound, got {:?}", other),
        }
        match svc.release_lock(&owner, &doc.id) {
            Err(ServiceError::NotFound) => {}
            other => panic!("expected NotFound, got {:?}", other),
        }
    }

    #[test]
    fn test_sweep_clears_only_lapsed_fields() {
        let (svc, owner) = setup();
        let live = svc.create_document(&owner, "Live").unwrap();
        let stale = svc.create_document(&owner, "Stale").unwrap();

        svc.acquire_lock(&owner, &live.id).unwrap();
        svc.acquire_lock(&owner, &stale.id).unwrap();
        backdate_lock(&svc, &stale.id, chrono::Utc::now().timestamp_millis() - 1);

        assert_eq!(svc.sweep_expired_locks().unwrap(), 1);
        let live_doc = svc.db.get_active_document(&live.id).unwrap().unwrap();
        assert!(live_doc.locked_by.is_some());
        let stale_doc = svc.db.get_active_document(&stale.id).unwrap().unwrap();
        assert!(stale_doc.locked_by.is_none());
    }

    #[test]
    fn test_lock_is_active_evaluates_lazily() {
        let (svc, owner) = setup();
        let doc = svc.create_document(&owner, "Notes").unwrap();
        let lease = svc.acquire_lock(&owner, &doc.id).unwrap();

        let snapshot = svc.db.get_active_document(&doc.id).unwrap().unwrap();
        assert!(lock_is_active(&snapshot, lease.lock_expires_at - 1));
        assert!(!lock_is_active(&snapshot, lease.lock_expires_at));
        assert!(!lock_is_active(&snapshot, lease.lock_expires_at + 1));
    }
}
