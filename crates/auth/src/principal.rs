use serde::{Deserialize, Serialize};

use stockroom_core::UserId;

use crate::Role;

/// Identity of an authenticated caller, as carried by a verified token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub username: String,
    pub role: Role,
}

impl Principal {
    pub fn new(username: impl Into<String>, role: Role) -> Self {
        Self {
            username: username.into(),
            role,
        }
    }
}

/// Stored user account. The password hash never leaves the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserAccount {
    pub id: UserId,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: Role,
}

impl UserAccount {
    pub fn principal(&self) -> Principal {
        Principal::new(self.username.clone(), self.role.clone())
    }
}
