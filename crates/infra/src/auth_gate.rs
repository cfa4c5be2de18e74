//! Credential verification and bearer-token issuance.
//!
//! Built once at startup; the signing key lives inside the shared
//! [`Hs256TokenService`] and is never re-read per request.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::instrument;

use stockroom_auth::{
    CredentialError, Hs256TokenService, IssuedToken, PasswordScheme, Principal, Role, TokenError, TokenValidator,
    UserAccount,
};

use crate::store::{StoreError, UserStore};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error(transparent)]
    Credentials(#[from] CredentialError),

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Default accounts created on first start when seeding is enabled.
pub const DEFAULT_USERS: [(&str, &str, Role); 2] =
    [("admin", "admin123", Role::ADMIN), ("user", "user123", Role::USER)];

#[derive(Clone)]
pub struct AuthGate {
    users: Arc<dyn UserStore>,
    passwords: Arc<dyn PasswordScheme>,
    tokens: Arc<Hs256TokenService>,
}

impl AuthGate {
    pub fn new(users: Arc<dyn UserStore>, passwords: Arc<dyn PasswordScheme>, tokens: Arc<Hs256TokenService>) -> Self {
        Self {
            users,
            passwords,
            tokens,
        }
    }

    /// Check a username/password pair and issue a token.
    ///
    /// Unknown users and wrong passwords are indistinguishable to the caller.
    #[instrument(skip(self, password), err)]
    pub async fn authenticate(
        &self,
        username: &str,
        password: &str,
        now: DateTime<Utc>,
    ) -> Result<(IssuedToken, Principal), AuthError> {
        let Some(account) = self.users.find_user(username).await? else {
            return Err(CredentialError::InvalidCredentials.into());
        };

        let passwords = self.passwords.clone();
        let password = password.to_string();
        let stored_hash = account.password_hash.clone();
        let verified = tokio::task::spawn_blocking(move || passwords.verify(&password, &stored_hash))
            .await
            .map_err(|e| CredentialError::Hashing(e.to_string()))?;

        if !verified {
            return Err(CredentialError::InvalidCredentials.into());
        }

        let principal = account.principal();
        let token = self.tokens.issue(&principal, now)?;
        tracing::info!(username = %principal.username, role = %principal.role, "login succeeded");
        Ok((token, principal))
    }

    /// Verify a bearer token and return the identity it carries.
    pub fn verify(&self, token: &str, now: DateTime<Utc>) -> Result<Principal, AuthError> {
        Ok(self.tokens.validate(token, now)?.principal())
    }

    /// Create the default accounts if the user table is empty.
    ///
    /// Returns the number of accounts created.
    pub async fn seed_default_users(&self) -> Result<usize, AuthError> {
        if self.users.count_users().await? > 0 {
            return Ok(0);
        }

        let mut created = 0;
        for (username, password, role) in DEFAULT_USERS {
            let passwords = self.passwords.clone();
            let hash = tokio::task::spawn_blocking(move || passwords.hash(password))
                .await
                .map_err(|e| CredentialError::Hashing(e.to_string()))??;
            self.users.insert_user(username, &hash, role).await?;
            created += 1;
        }

        tracing::warn!(created, "seeded default user accounts; change their passwords");
        Ok(created)
    }

    /// Delete every account and recreate the default ones.
    pub async fn reset_default_users(&self) -> Result<usize, AuthError> {
        let removed = self.users.delete_all_users().await?;
        tracing::warn!(removed, "deleted all user accounts");
        self.seed_default_users().await
    }

    /// All accounts, ordered by id. Password hashes are never serialized.
    pub async fn list_users(&self) -> Result<Vec<UserAccount>, AuthError> {
        Ok(self.users.list_users().await?)
    }
}
