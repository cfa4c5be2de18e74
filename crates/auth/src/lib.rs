//! `stockroom-auth` — authentication/authorization boundary.
//!
//! Token issuance and verification, password hashing, and the role policy.
//! This crate is intentionally decoupled from HTTP and storage.

pub mod authorize;
pub mod claims;
pub mod password;
pub mod permissions;
pub mod principal;
pub mod roles;
pub mod token;

pub use authorize::{AuthzError, authorize, permissions_for};
pub use claims::{TokenClaims, TokenValidationError, validate_claims};
pub use password::{Argon2Scheme, CredentialError, PasswordScheme};
pub use permissions::Permission;
pub use principal::{Principal, UserAccount};
pub use roles::Role;
pub use token::{Hs256TokenService, IssuedToken, TokenError, TokenValidator};
