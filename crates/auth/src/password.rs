//! Password hashing and verification using Argon2id.
//!
//! Stored hashes are PHC strings, so salt and cost parameters travel with the hash
//! and old hashes keep verifying after the configured cost changes.

use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{
        PasswordHash, PasswordHasher as PhcHasher, PasswordVerifier, SaltString,
        rand_core::OsRng,
    },
};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PasswordError {
    #[error("invalid hasher parameters: {0}")]
    InvalidParams(String),

    #[error("failed to hash password: {0}")]
    Hash(String),
}

/// One-way salted hash/verify primitive.
pub trait PasswordHasher: Send + Sync {
    fn hash(&self, plaintext: &str) -> Result<String, PasswordError>;

    /// Never fails: a malformed stored hash simply does not verify.
    fn verify(&self, plaintext: &str, stored: &str) -> bool;
}

/// Argon2 cost parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HasherSettings {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for HasherSettings {
    fn default() -> Self {
        Self {
            memory_kib: Params::DEFAULT_M_COST,
            iterations: Params::DEFAULT_T_COST,
            parallelism: Params::DEFAULT_P_COST,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Argon2Hasher {
    params: Params,
}

impl Argon2Hasher {
    pub fn new(settings: HasherSettings) -> Result<Self, PasswordError> {
        let params = Params::new(
            settings.memory_kib,
            settings.iterations,
            settings.parallelism,
            None,
        )
        .map_err(|e| PasswordError::InvalidParams(e.to_string()))?;
        Ok(Self { params })
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }
}

impl PasswordHasher for Argon2Hasher {
    fn hash(&self, plaintext: &str) -> Result<String, PasswordError> {
        let salt = SaltString::generate(&mut OsRng);
        self.argon2()
            .hash_password(plaintext.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| PasswordError::Hash(e.to_string()))
    }

    fn verify(&self, plaintext: &str, stored: &str) -> bool {
        let parsed = match PasswordHash::new(stored) {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!(error = %e, "stored password hash is malformed");
                return false;
            }
        };

        self.argon2()
            .verify_password(plaintext.as_bytes(), &parsed)
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hasher() -> Argon2Hasher {
        Argon2Hasher::new(HasherSettings {
            memory_kib: 1024,
            iterations: 1,
            parallelism: 1,
        })
        .unwrap()
    }

    #[test]
    fn hash_and_verify() {
        let hasher = hasher();
        let hash = hasher.hash("correct-horse-battery-staple").unwrap();

        assert!(hash.starts_with("$argon2id$"));
        assert!(hasher.verify("correct-horse-battery-staple", &hash));
        assert!(!hasher.verify("wrong-password", &hash));
    }

    #[test]
    fn same_password_gets_different_salts() {
        let hasher = hasher();
        let a = hasher.hash("same-password").unwrap();
        let b = hasher.hash("same-password").unwrap();

        assert_ne!(a, b);
        assert!(hasher.verify("same-password", &a));
        assert!(hasher.verify("same-password", &b));
    }

    #[test]
    fn malformed_hash_is_false_not_error() {
        let hasher = hasher();
        assert!(!hasher.verify("password", "not-a-valid-hash"));
        assert!(!hasher.verify("password", ""));
    }

    #[test]
    fn hashes_from_other_costs_still_verify() {
        let cheap = hasher();
        let hash = cheap.hash("Admin123!").unwrap();

        let other = Argon2Hasher::new(HasherSettings {
            memory_kib: 2048,
            iterations: 2,
            parallelism: 1,
        })
        .unwrap();
        assert!(other.verify("Admin123!", &hash));
    }

    #[test]
    fn rejects_impossible_params() {
        let err = Argon2Hasher::new(HasherSettings {
            memory_kib: 1,
            iterations: 0,
            parallelism: 1,
        })
        .unwrap_err();
        assert!(matches!(err, PasswordError::InvalidParams(_)));
    }
}
