//! Server-side hashing of credential tokens
//!
//! Clients send a fixed-length token (a hex digest of the password). The
//! server never stores that token: it keeps an argon2 PHC string with a
//! random salt and verifies later tokens against it.

use argon2::password_hash::SaltString;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use rand::Rng;
use std::fmt;

#[derive(Debug, Clone)]
pub struct HashError(String);

impl fmt::Display for HashError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "credential hashing failed: {}", self.0)
    }
}

impl std::error::Error for HashError {}

fn salt() -> Result<SaltString, HashError> {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill(&mut bytes);
    SaltString::encode_b64(&bytes).map_err(|e| HashError(e.to_string()))
}

pub fn hash(token: &str) -> Result<String, HashError> {
    Argon2::default()
        .hash_password(token.as_bytes(), &salt()?)
        .map(|h| h.to_string())
        .map_err(|e| HashError(e.to_string()))
}

pub fn verify(token: &str, hashword: &str) -> bool {
    PasswordHash::new(hashword)
        .ok()
        .as_ref()
        .map(|hash| {
            Argon2::default()
                .verify_password(token.as_bytes(), hash)
                .is_ok()
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_verifies_only_same_token() {
        let token = "f".repeat(128);
        let hashword = hash(&token).unwrap();

        assert!(hashword.starts_with("$argon2"));
        assert!(verify(&token, &hashword));
        assert!(!verify(&"e".repeat(128), &hashword));
    }

    #[test]
    fn test_salts_differ() {
        let token = "a".repeat(128);
        assert_ne!(hash(&token).unwrap(), hash(&token).unwrap());
    }

    #[test]
    fn test_garbage_hash_never_verifies() {
        assert!(!verify("anything", "not a phc string"));
    }
}
