//! Credential service - login registration and password checks
//!
//! Passwords are hashed with Argon2id and a random 16-byte salt. The stored
//! form is `base64(salt)$base64(hash)`.

use std::sync::Arc;

use base64::Engine;
use rand::RngCore;
use serde::Serialize;
use tracing::info;

use crate::domain::result::{Error, Result};
use crate::domain::Credential;
use crate::ports::LedgerStore;

const SALT_LEN: usize = 16;
const HASH_LEN: usize = 32;
const MEMORY_COST: u32 = 19456; // 19 MiB
const TIME_COST: u32 = 2;
const PARALLELISM: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RegisterOutcome {
    Registered,
    LoginTaken,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialCheck {
    Valid,
    WrongPassword,
    UnknownUser,
}

pub struct CredentialService {
    store: Arc<dyn LedgerStore>,
}

impl CredentialService {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// Register a new login
    pub async fn register(&self, login: &str, password: &str) -> Result<RegisterOutcome> {
        let login = check_input(login, password)?;

        let mut salt = [0u8; SALT_LEN];
        rand::thread_rng().fill_bytes(&mut salt);
        let hash = derive(password, &salt)?;

        let engine = base64::engine::general_purpose::STANDARD;
        let encoded = format!("{}${}", engine.encode(salt), engine.encode(hash));

        if self.store.insert_credential(&Credential::new(login, encoded)).await? {
            info!(login, "Registered login");
            Ok(RegisterOutcome::Registered)
        } else {
            Ok(RegisterOutcome::LoginTaken)
        }
    }

    /// Check a login and password pair
    pub async fn verify(&self, login: &str, password: &str) -> Result<CredentialCheck> {
        let login = check_input(login, password)?;

        let Some(credential) = self.store.get_credential(login).await? else {
            return Ok(CredentialCheck::UnknownUser);
        };

        let (salt, expected) = decode(&credential.password_hash)?;
        let actual = derive(password, &salt)?;
        if constant_time_eq(&actual, &expected) {
            Ok(CredentialCheck::Valid)
        } else {
            Ok(CredentialCheck::WrongPassword)
        }
    }
}

/// Returns the trimmed login. Passwords are taken as given.
fn check_input<'a>(login: &'a str, password: &str) -> Result<&'a str> {
    let login = login.trim();
    if login.is_empty() {
        return Err(Error::validation("login must not be empty"));
    }
    if password.is_empty() {
        return Err(Error::validation("password must not be empty"));
    }
    Ok(login)
}

fn derive(password: &str, salt: &[u8]) -> Result<Vec<u8>> {
    let params = argon2::Params::new(MEMORY_COST, TIME_COST, PARALLELISM, Some(HASH_LEN))
        .map_err(|e| Error::Config(format!("argon2 parameters: {e}")))?;
    let argon2 = argon2::Argon2::new(argon2::Algorithm::Argon2id, argon2::Version::V0x13, params);

    let mut hash = vec![0u8; HASH_LEN];
    argon2
        .hash_password_into(password.as_bytes(), salt, &mut hash)
        .map_err(|e| Error::validation(format!("password hashing failed: {e}")))?;
    Ok(hash)
}

fn decode(stored: &str) -> Result<(Vec<u8>, Vec<u8>)> {
    let engine = base64::engine::general_purpose::STANDARD;
    let (salt, hash) = stored
        .split_once('$')
        .ok_or_else(|| Error::store("malformed password hash"))?;
    let salt = engine
        .decode(salt)
        .map_err(|_| Error::store("malformed password salt"))?;
    let hash = engine
        .decode(hash)
        .map_err(|_| Error::store("malformed password hash"))?;
    Ok((salt, hash))
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
