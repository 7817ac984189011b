use anyhow::{Result, anyhow};
use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};

pub const MIN_PASSWORD_LEN: usize = 8;

pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|err| anyhow!("failed to hash password: {err}"))?;

    Ok(hash.to_string())
}

/// `false` for a wrong password and for a stored hash that does not parse.
pub fn verify_password(password: &str, stored_hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(stored_hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

/// Runs the hash on the blocking pool.
pub async fn hash_password_blocking(password: String) -> Result<String> {
    tokio::task::spawn_blocking(move || hash_password(&password)).await?
}

pub async fn verify_password_blocking(password: String, stored_hash: String) -> Result<bool> {
    let verified =
        tokio::task::spawn_blocking(move || verify_password(&password, &stored_hash)).await?;
    Ok(verified)
}

pub fn validate_new_password(password: &str) -> Result<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        anyhow::bail!("password must be at least {MIN_PASSWORD_LEN} characters");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_verifies_only_the_original_password() {
        let hash = hash_password("s3cure-passphrase").unwrap();

        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("s3cure-passphrase", &hash));
        assert!(!verify_password("wrong-passphrase", &hash));
        assert!(!verify_password("s3cure-passphrase", "not-a-hash"));
    }

    #[test]
    fn short_passwords_are_rejected() {
        assert!(validate_new_password("short").is_err());
        assert!(validate_new_password("long-enough").is_ok());
    }

    #[tokio::test]
    async fn blocking_helpers_round_trip() {
        let hash = hash_password_blocking("another-passphrase".to_string())
            .await
            .unwrap();
        assert!(
            verify_password_blocking("another-passphrase".to_string(), hash)
                .await
                .unwrap()
        );
    }
}
