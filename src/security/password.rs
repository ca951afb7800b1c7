use anyhow::{Context, Result};
use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use std::sync::OnceLock;
use tokio::task;

use crate::config::SecurityConfig;

pub const MIN_PASSWORD_LENGTH: usize = 10;

const COMMON_PASSWORDS: &[&str] = &[
    "password",
    "password123",
    "admin123",
    "qwerty123",
    "letmein123",
    "welcome123",
];

/// Returns the first policy violation, or `None` when the password is acceptable.
///
/// The same policy applies at setup, password change and reset.
#[must_use]
pub fn check_strength(password: &str) -> Option<&'static str> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Some("Password must be at least 10 characters long");
    }
    if !password.chars().any(|c| c.is_ascii_uppercase()) {
        return Some("Password must include an uppercase letter");
    }
    if !password.chars().any(|c| c.is_ascii_lowercase()) {
        return Some("Password must include a lowercase letter");
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Some("Password must include a number");
    }
    if password.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Some("Password must include a special character");
    }
    let lowered = password.to_lowercase();
    if COMMON_PASSWORDS.contains(&lowered.as_str()) {
        return Some("Password is too common");
    }
    None
}

fn hasher(config: &SecurityConfig) -> Result<Argon2<'static>> {
    let params = Params::new(
        config.argon2_memory_cost_kib,
        config.argon2_time_cost,
        config.argon2_parallelism,
        None,
    )
    .map_err(|e| anyhow::anyhow!("Invalid Argon2 params: {e}"))?;

    Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
}

/// Hash a password using Argon2id with the configured cost parameters.
pub fn hash_password(password: &str, config: &SecurityConfig) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);

    let hash = hasher(config)?
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Failed to hash password: {e}"))?;

    Ok(hash.to_string())
}

/// Verification reads its parameters from the PHC string, so hashes made under
/// older cost settings keep verifying.
pub fn verify_password(password: &str, password_hash: &str) -> Result<bool> {
    let parsed_hash = PasswordHash::new(password_hash)
        .map_err(|e| anyhow::anyhow!("Invalid password hash format: {e}"))?;

    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

/// Hashing is CPU-bound; keep it off the async workers.
pub async fn hash_password_blocking(password: &str, config: &SecurityConfig) -> Result<String> {
    let password = password.to_string();
    let config = config.clone();
    task::spawn_blocking(move || hash_password(&password, &config))
        .await
        .context("Password hashing task panicked")?
}

pub async fn verify_password_blocking(password: &str, password_hash: &str) -> Result<bool> {
    let password = password.to_string();
    let password_hash = password_hash.to_string();
    task::spawn_blocking(move || verify_password(&password, &password_hash))
        .await
        .context("Password verification task panicked")?
}

static DUMMY_HASH: OnceLock<String> = OnceLock::new();

/// Burns one verification against a throwaway hash so that unknown or locked
/// accounts cost the same as a real password check.
pub async fn equalize_timing(password: &str, config: &SecurityConfig) {
    let hash = if let Some(hash) = DUMMY_HASH.get() {
        hash.clone()
    } else {
        match hash_password_blocking(&super::secret::random_hex(16), config).await {
            Ok(hash) => DUMMY_HASH.get_or_init(|| hash).clone(),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to prepare timing-equalization hash");
                return;
            }
        }
    };

    let _ = verify_password_blocking(password, &hash).await;
}
