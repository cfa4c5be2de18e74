//! Password hashing (treated as an opaque credential verifier by callers).

use argon2::password_hash::{PasswordHash, SaltString, rand_core::OsRng};
use argon2::{Argon2, PasswordHasher, PasswordVerifier};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CredentialError {
    /// Unknown user or wrong password; deliberately indistinguishable.
    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("password hashing failed: {0}")]
    Hashing(String),
}

/// Produces and checks stored password hashes.
pub trait PasswordScheme: Send + Sync {
    fn hash(&self, password: &str) -> Result<String, CredentialError>;

    /// `false` for a wrong password or an unparseable stored hash.
    fn verify(&self, password: &str, stored_hash: &str) -> bool;
}

/// Argon2id with default parameters, PHC string encoding.
#[derive(Debug, Default, Clone)]
pub struct Argon2Scheme {
    argon2: Argon2<'static>,
}

impl Argon2Scheme {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PasswordScheme for Argon2Scheme {
    fn hash(&self, password: &str) -> Result<String, CredentialError> {
        let salt = SaltString::generate(&mut OsRng);
        self.argon2
            .hash_password(password.as_bytes(), &salt)
            .map(|h| h.to_string())
            .map_err(|e| CredentialError::Hashing(e.to_string()))
    }

    fn verify(&self, password: &str, stored_hash: &str) -> bool {
        match PasswordHash::new(stored_hash) {
            Ok(parsed) => self.argon2.verify_password(password.as_bytes(), &parsed).is_ok(),
            Err(e) => {
                tracing::warn!(error = %e, "stored password hash is not a valid PHC string");
                false
            }
        }
    }
}
