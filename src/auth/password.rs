use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;

use crate::error::{AppError, AppResult};

/// Hashes `plain` into an Argon2id PHC string. Runs on the blocking pool.
pub async fn hash_password(plain: &str) -> AppResult<String> {
    let plain = plain.to_owned();
    tokio::task::spawn_blocking(move || {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(plain.as_bytes(), &salt)
            .map(|h| h.to_string())
            .map_err(|e| AppError::Internal(anyhow::anyhow!("password hashing failed: {}", e)))
    })
    .await
    .map_err(|e| AppError::Internal(anyhow::anyhow!("password hashing task failed: {}", e)))?
}

/// Returns `false` for a wrong password and for an unparseable stored hash.
pub async fn verify_password(plain: &str, hash: &str) -> AppResult<bool> {
    let plain = plain.to_owned();
    let hash = hash.to_owned();
    tokio::task::spawn_blocking(move || match PasswordHash::new(&hash) {
        Ok(parsed) => Argon2::default().verify_password(plain.as_bytes(), &parsed).is_ok(),
        Err(e) => {
            tracing::warn!("Stored password hash is not a valid PHC string: {}", e);
            false
        }
    })
    .await
    .map_err(|e| AppError::Internal(anyhow::anyhow!("password verification task failed: {}", e)))
}
