use rusqlite::Connection;
use std::path::Path;
use std::sync::Mutex;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("database mutex poisoned")]
    Lock,
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Shared handle to the SQLite store. All domain modules extend this type
/// with their own `impl Database` blocks; every multi-step read-modify-write
/// runs under a single `conn` guard so it is atomic with respect to
/// concurrent callers.
pub struct Database {
    pub(crate) conn: Mutex<Connection>,
}

impl Database {
    /// Open (or create) a database file and initialize the schema
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, DbError> {
        let conn = Connection::open(path)?;
        let db = Database {
            conn: Mutex::new(conn),
        };
        db.init_schema()?;
        Ok(db)
    }

    /// Open an in-memory database (tests, embedded callers)
    pub fn open_in_memory() -> Result<Self, DbError> {
        let conn = Connection::open_in_memory()?;
        let db = Database {
            conn: Mutex::new(conn),
        };
        db.init_schema()?;
        Ok(db)
    }

    fn init_schema(&self) -> Result<(), DbError> {
        self.create_users_table()?;
        self.create_documents_table()?;
        self.create_uploads_table()?;
        Ok(())
    }
}
