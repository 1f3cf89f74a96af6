use serde::Serialize;

/// A registered user. The credential hash never serializes.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub created_at: i64,
}

/// Lowercase + trim, applied everywhere an email enters the system
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Hash a password with a fresh random salt; stored as "salt$hex"
pub fn hash_password(password: &str) -> String {
    let salt = uuid::Uuid::new_v4().simple().to_string();
    let digest = hash_with_salt(&salt, password);
    format!("{}${}", salt, digest)
}

/// Check a password against a stored "salt$hex" hash
pub fn verify_password(password: &str, stored: &str) -> bool {
    match stored.split_once('$') {
        Some((salt, digest)) => hash_with_salt(salt, password) == digest,
        None => false,
    }
}

fn hash_with_salt(salt: &str, password: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    format!("{:x}", hasher.finalize())
}
