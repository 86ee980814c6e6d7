use argon2::password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use password_hash::errors::Error as HashError;

use crate::TurnstileError;

/// Hashes a plaintext password with argon2id and a fresh random salt.
pub fn hash_password(password: &str) -> Result<String, TurnstileError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| TurnstileError::UserStore(e.to_string()))
}

/// Verifies a plaintext password against a stored argon2 hash in
/// constant time. Never short-circuits on a malformed hash by panicking.
pub fn verify_password(password: &str, hash: &str) -> Result<bool, TurnstileError> {
    let parsed = PasswordHash::new(hash).map_err(|e| TurnstileError::UserStore(e.to_string()))?;
    match Argon2::default().verify_password(password.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(HashError::Password) => Ok(false),
        Err(e) => Err(TurnstileError::UserStore(e.to_string())),
    }
}
