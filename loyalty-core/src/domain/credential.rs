//! Credential domain model

use chrono::{DateTime, SubsecRound, Utc};

/// A registered login and its password hash.
///
/// Deliberately not `Serialize`: the hash never leaves the store boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub login: String,
    /// `base64(salt)$base64(argon2id(password, salt))`
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

impl Credential {
    pub fn new(login: impl Into<String>, password_hash: impl Into<String>) -> Self {
        Self {
            login: login.into(),
            password_hash: password_hash.into(),
            created_at: Utc::now().trunc_subsecs(6),
        }
    }
}
