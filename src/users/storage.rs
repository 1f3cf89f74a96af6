use super::types::User;
use crate::database::{Database, DbError};

impl Database {
    /// Create the users table
    pub fn create_users_table(&self) -> Result<(), DbError> {
        let conn = self.conn.lock().map_err(|_| DbError::Lock)?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                email TEXT NOT NULL UNIQUE,
                password_hash TEXT NOT NULL,
                created_at INTEGER NOT NULL
            )",
            [],
        )?;

        Ok(())
    }

    /// Insert a new user. Returns None when the email is already registered;
    /// the existence check and the insert run under one guard.
    pub fn create_user(&self, email: &str, password_hash: &str) -> Result<Option<User>, DbError> {
        let conn = self.conn.lock().map_err(|_| DbError::Lock)?;

        let exists = conn
            .prepare("SELECT 1 FROM users WHERE email = ?1")?
            .exists([email])?;
        if exists {
            return Ok(None);
        }

        let id = uuid::Uuid::new_v4().to_string();
        let now = chrono::Utc::now().timestamp_millis();

        conn.execute(
            "INSERT INTO users (id, email, password_hash, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![id, email, password_hash, now],
        )?;

        Ok(Some(User {
            id,
            email: email.to_string(),
            password_hash: password_hash.to_string(),
            created_at: now,
        }))
    }

    /// Look up a user by normalized email
    pub fn find_user_by_email(&self, email: &str) -> Result<Option<User>, DbError> {
        let conn = self.conn.lock().map_err(|_| DbError::Lock)?;

        let mut stmt = conn.prepare(
            "SELECT id, email, password_hash, created_at
             FROM users WHERE email = ?1",
        )?;

        let mut rows = stmt.query([email])?;

        if let Some(row) = rows.next()? {
            Ok(Some(User {
                id: row.get(0)?,
                email: row.get(1)?,
                password_hash: row.get(2)?,
                created_at: row.get(3)?,
            }))
        } else {
            Ok(None)
        }
    }

    /// Look up a user by id
    pub fn get_user(&self, id: &str) -> Result<Option<User>, DbError> {
        let conn = self.conn.lock().map_err(|_| DbError::Lock)?;

        let mut stmt = conn.prepare(
            "SELECT id, email, password_hash, created_at
             FROM users WHERE id = ?1",
        )?;

        let mut rows = stmt.query([id])?;

        if let Some(row) = rows.next()? {
            Ok(Some(User {
                id: row.get(0)?,
                email: row.get(1)?,
                password_hash: row.get(2)?,
                created_at: row.get(3)?,
            }))
        } else {
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::database::Database;

    #[test]
    fn test_create_and_find_user() {
        let db = Database::open_in_memory().unwrap();

        let user = db.create_user("a@b.com", "salt$hash").unwrap().unwrap();
        assert_eq!(user.email, "a@b.com");

        let found = db.find_user_by_email("a@b.com").unwrap().unwrap();
        assert_eq!(found.id, user.id);

        let by_id = db.get_user(&user.id).unwrap().unwrap();
        assert_eq!(by_id.email, "a@b.com");
    }

    #[test]
    fn test_duplicate_email_returns_none() {
        let db = Database::open_in_memory().unwrap();

        db.create_user("a@b.com", "h1").unwrap().unwrap();
        assert!(db.create_user("a@b.com", "h2").unwrap().is_none());
    }

    #[test]
    fn test_unknown_email_is_absent() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.find_user_by_email("nobody@b.com").unwrap().is_none());
    }
}
