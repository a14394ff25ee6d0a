//! Password hashing and access-token generation.

use argon2::{
    password_hash::{PasswordHash as PhcHash, PasswordHasher as _, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use rand::{thread_rng, RngCore};
use thiserror::Error;

use crate::domain::user::{Password, PasswordHash};

/// Bytes of entropy in an access token; rendered as twice as many hex digits.
const TOKEN_BYTES: usize = 20;

#[derive(Debug, Error)]
#[error("password hashing failed: {0}")]
pub struct HashError(String);

/// Argon2id hasher producing PHC strings.
#[derive(Debug, Clone)]
pub struct PasswordHasher {
    params: Params,
}

impl Default for PasswordHasher {
    fn default() -> Self { Self { params: Params::default() } }
}

impl PasswordHasher {
    pub fn new(memory_kib: u32, iterations: u32, parallelism: u32) -> Result<Self, HashError> {
        let params = Params::new(memory_kib, iterations, parallelism, None).map_err(|e| HashError(e.to_string()))?;
        Ok(Self { params })
    }

    pub fn hash(&self, password: &Password) -> Result<PasswordHash, HashError> {
        let salt = SaltString::generate(&mut thread_rng());
        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone());
        let hash = argon2
            .hash_password(password.expose().as_bytes(), &salt)
            .map_err(|e| HashError(e.to_string()))?;
        Ok(PasswordHash(hash.to_string()))
    }

    /// Runs [`hash`](Self::hash) on the blocking pool so Argon2 never stalls a runtime worker.
    pub async fn hash_blocking(&self, password: Password) -> Result<PasswordHash, HashError> {
        let hasher = self.clone();
        tokio::task::spawn_blocking(move || hasher.hash(&password))
            .await
            .map_err(|e| HashError(e.to_string()))?
    }

    /// Parameters are read back from the encoded hash, so any hasher verifies any hash.
    pub fn verify(&self, password: &str, hash: &PasswordHash) -> bool {
        let Ok(parsed) = PhcHash::new(hash.as_str()) else { return false };
        Argon2::default().verify_password(password.as_bytes(), &parsed).is_ok()
    }
}

/// A fresh random access token of 40 lowercase hex digits.
pub fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}
