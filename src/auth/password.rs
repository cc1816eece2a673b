// Password hashing on the blocking pool

use bcrypt::{hash, verify};

#[derive(Debug, thiserror::Error)]
pub enum PasswordError {
    #[error("bcrypt error: {0}")]
    Bcrypt(#[from] bcrypt::BcryptError),

    #[error("hashing task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Hash a password with bcrypt. CPU-heavy, so it runs off the async workers.
pub async fn hash_password(password: &str, cost: u32) -> Result<String, PasswordError> {
    let password = password.to_string();
    let hashed = tokio::task::spawn_blocking(move || hash(password, cost)).await??;
    Ok(hashed)
}

/// `Ok(false)` on mismatch; `Err` only when the hash itself is unusable
pub async fn verify_password(password: &str, hash: &str) -> Result<bool, PasswordError> {
    let password = password.to_string();
    let hash = hash.to_string();
    let matches = tokio::task::spawn_blocking(move || verify(password, &hash)).await??;
    Ok(matches)
}
