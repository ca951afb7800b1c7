use rand::Rng;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Bytes of entropy in a password reset code.
pub const RESET_CODE_BYTES: usize = 24;

/// Bytes of entropy in a CSRF double-submit token.
pub const CSRF_TOKEN_BYTES: usize = 24;

/// Bytes of entropy in the unusable password assigned to admin-created users.
pub const PLACEHOLDER_PASSWORD_BYTES: usize = 48;

/// Random lowercase hex string carrying `bytes` bytes of entropy.
#[must_use]
pub fn random_hex(bytes: usize) -> String {
    let mut rng = rand::rng();
    let mut buf = vec![0u8; bytes];
    rng.fill(buf.as_mut_slice());
    hex::encode(buf)
}

#[must_use]
pub fn new_session_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// SHA-256 hex digest. Refresh tokens and reset codes are stored only in this form.
#[must_use]
pub fn sha256_hex(value: &str) -> String {
    hex::encode(Sha256::digest(value.as_bytes()))
}

/// Constant-time string comparison. Empty expected values never match.
#[must_use]
pub fn constant_time_eq(expected: &str, actual: &str) -> bool {
    if expected.is_empty() || expected.len() != actual.len() {
        return false;
    }
    expected.as_bytes().ct_eq(actual.as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_hex_length_and_uniqueness() {
        let a = random_hex(RESET_CODE_BYTES);
        let b = random_hex(RESET_CODE_BYTES);
        assert_eq!(a.len(), 48);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
        assert_eq!(random_hex(PLACEHOLDER_PASSWORD_BYTES).len(), 96);
    }

    #[test]
    fn sha256_known_vector() {
        assert_eq!(
            sha256_hex("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn constant_time_comparison() {
        assert!(constant_time_eq("token-value", "token-value"));
        assert!(!constant_time_eq("token-value", "token-valuf"));
        assert!(!constant_time_eq("token-value", "token"));
        assert!(!constant_time_eq("", ""));
    }
}
