use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Permission identifier.
///
/// Permissions are opaque strings (e.g. "sales.create"). The wildcard `"*"`
/// grants everything.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permission(Cow<'static, str>);

impl Permission {
    pub const WILDCARD: Permission = Permission(Cow::Borrowed("*"));

    pub const ITEMS_READ: Permission = Permission(Cow::Borrowed("items.read"));
    pub const ITEMS_WRITE: Permission = Permission(Cow::Borrowed("items.write"));
    pub const SALES_READ: Permission = Permission(Cow::Borrowed("sales.read"));
    pub const SALES_CREATE: Permission = Permission(Cow::Borrowed("sales.create"));
    pub const SALES_DELETE: Permission = Permission(Cow::Borrowed("sales.delete"));
    pub const CHARGES_READ: Permission = Permission(Cow::Borrowed("charges.read"));
    pub const CHARGES_WRITE: Permission = Permission(Cow::Borrowed("charges.write"));
    pub const EXPENSE_ITEMS_READ: Permission = Permission(Cow::Borrowed("expense_items.read"));
    pub const EXPENSE_ITEMS_WRITE: Permission = Permission(Cow::Borrowed("expense_items.write"));
    pub const REPORTS_READ: Permission = Permission(Cow::Borrowed("reports.read"));

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_wildcard(&self) -> bool {
        self.as_str() == "*"
    }
}

impl core::fmt::Display for Permission {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}
