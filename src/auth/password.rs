use crate::error::TollgateError;
use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use std::sync::LazyLock;

/// Verified against when the login identifier matches no user, so that the
/// response time does not reveal whether an account exists.
static DUMMY_HASH: LazyLock<Option<String>> =
    LazyLock::new(|| hash_password_blocking("tollgate-dummy-password").ok());

fn hash_password_blocking(plain: &str) -> Result<String, TollgateError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(plain.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| TollgateError::UnexpectedError(format!("password hashing failed: {e}")))
}

fn verify_password_blocking(plain: &str, phc: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(phc) else {
        return false;
    };
    Argon2::default()
        .verify_password(plain.as_bytes(), &parsed)
        .is_ok()
}

/// Hash a password with Argon2id into a PHC string (salt embedded).
pub async fn hash_password(plain: &str) -> Result<String, TollgateError> {
    let plain = plain.to_owned();
    tokio::task::spawn_blocking(move || hash_password_blocking(&plain))
        .await
        .map_err(|e| TollgateError::UnexpectedError(format!("hash task failed: {e}")))?
}

/// Verify a password against a stored PHC string. Malformed hashes never match.
pub async fn verify_password(plain: &str, phc: &str) -> bool {
    let plain = plain.to_owned();
    let phc = phc.to_owned();
    tokio::task::spawn_blocking(move || verify_password_blocking(&plain, &phc))
        .await
        .unwrap_or(false)
}

/// Burn one verification against the dummy hash and report failure.
pub async fn verify_password_or_dummy(plain: &str, phc: Option<&str>) -> bool {
    match phc {
        Some(phc) => verify_password(plain, phc).await,
        None => {
            if let Some(dummy) = DUMMY_HASH.as_deref() {
                let _ = verify_password(plain, dummy).await;
            }
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn hash_then_verify() {
        let phc = hash_password("correct horse").await.unwrap();
        assert!(phc.starts_with("$argon2id$"));
        assert!(verify_password("correct horse", &phc).await);
        assert!(!verify_password("battery staple", &phc).await);
    }

    #[tokio::test]
    async fn same_password_gets_distinct_salts() {
        let a = hash_password("pw-123456").await.unwrap();
        let b = hash_password("pw-123456").await.unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn garbage_hash_never_verifies() {
        assert!(!verify_password("anything", "not-a-phc-string").await);
        assert!(!verify_password_or_dummy("anything", None).await);
    }
}
