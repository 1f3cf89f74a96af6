use crate::database::DbError;
use serde::Serialize;
use thiserror::Error;

/// Caller-facing error taxonomy. The lock family (`LockHeld`, `LockRequired`,
/// `NoActiveLock`, `NotLockHolder`) is recoverable: callers are expected to
/// retry or back off. `NotFound` covers both "absent" and "exists but not
/// yours" so existence never leaks through scoping.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("invalid email or password")]
    Unauthorized,
    #[error("no permission to edit this document")]
    Forbidden,
    #[error("not found")]
    NotFound,
    #[error("email already registered")]
    Conflict,
    #[error("owner already has edit access")]
    AlreadyOwner,
    #[error("document is currently being edited by another user")]
    LockHeld {
        locked_by: String,
        lock_expires_at: i64,
    },
    #[error("you must acquire the lock before editing")]
    LockRequired {
        locked_by: Option<String>,
        lock_expires_at: Option<i64>,
    },
    #[error("you do not hold an active lock")]
    NoActiveLock,
    #[error("you do not hold the lock")]
    NotLockHolder,
    #[error("storage error: {0}")]
    Storage(#[from] DbError),
}

impl ServiceError {
    pub fn kind(&self) -> &'static str {
        match self {
            ServiceError::InvalidInput(_) => "invalid_input",
            ServiceError::Unauthorized => "unauthorized",
            ServiceError::Forbidden => "forbidden",
            ServiceError::NotFound => "not_found",
            ServiceError::Conflict => "conflict",
            ServiceError::AlreadyOwner => "already_owner",
            ServiceError::LockHeld { .. } => "lock_held",
            ServiceError::LockRequired { .. } => "lock_required",
            ServiceError::NoActiveLock => "no_active_lock",
            ServiceError::NotLockHolder => "not_lock_holder",
            ServiceError::Storage(_) => "storage",
        }
    }
}

/// JSON body for a failed request. The lock family carries the current
/// holder and expiry so the caller can decide whether to wait or contend.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub kind: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locked_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lock_expires_at: Option<i64>,
}

impl From<&ServiceError> for ErrorBody {
    fn from(err: &ServiceError) -> Self {
        let (locked_by, lock_expires_at) = match err {
            ServiceError::LockHeld {
                locked_by,
                lock_expires_at,
            } => (Some(locked_by.clone()), Some(*lock_expires_at)),
            ServiceError::LockRequired {
                locked_by,
                lock_expires_at,
            } => (locked_by.clone(), *lock_expires_at),
            _ => (None, None),
        };

        ErrorBody {
            kind: err.kind(),
            message: err.to_string(),
            locked_by,
            lock_expires_at,
        }
    }
}
