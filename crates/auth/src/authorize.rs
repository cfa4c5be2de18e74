use thiserror::Error;

use crate::{Permission, Principal, Role};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("forbidden: role '{role}' lacks permission '{permission}'")]
    Forbidden { role: String, permission: String },
}

/// Role → permission policy.
///
/// `admin` holds the wildcard. `user` can read everything and record or
/// reverse sales; catalogue and expense mutations are admin-only.
pub fn permissions_for(role: &Role) -> Vec<Permission> {
    if role.is_admin() {
        return vec![Permission::WILDCARD];
    }
    if role == &Role::USER {
        return vec![
            Permission::ITEMS_READ,
            Permission::SALES_READ,
            Permission::SALES_CREATE,
            Permission::SALES_DELETE,
            Permission::CHARGES_READ,
            Permission::EXPENSE_ITEMS_READ,
            Permission::REPORTS_READ,
        ];
    }
    Vec::new()
}

/// Authorize a principal for a single permission.
///
/// - No IO
/// - No panics
/// - No business logic (pure policy check)
pub fn authorize(principal: &Principal, required: &Permission) -> Result<(), AuthzError> {
    let granted = permissions_for(&principal.role)
        .iter()
        .any(|p| p.is_wildcard() || p == required);

    if granted {
        Ok(())
    } else {
        Err(AuthzError::Forbidden {
            role: principal.role.to_string(),
            permission: required.to_string(),
        })
    }
}
