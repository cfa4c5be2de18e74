use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockroom_core::{ChargeId, DomainError, DomainResult, Entity, ExpenseItemId, Money};

/// Expense category ("expense item") that charges are booked against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpenseItem {
    pub id: ExpenseItemId,
    pub name: String,
}

impl Entity for ExpenseItem {
    type Id = ExpenseItemId;

    fn id(&self) -> ExpenseItemId {
        self.id
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ExpenseItemDraft {
    pub name: String,
}

impl ExpenseItemDraft {
    pub fn validate(&self) -> DomainResult<()> {
        if self.name.trim().is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }
        Ok(())
    }
}

/// A recorded expense.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChargeRecord {
    pub id: ChargeId,
    pub expense_item_id: ExpenseItemId,
    pub amount: Money,
    pub charge_date: DateTime<Utc>,
}

impl Entity for ChargeRecord {
    type Id = ChargeId;

    fn id(&self) -> ChargeId {
        self.id
    }
}

/// A charge to be booked now.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NewCharge {
    pub expense_item_id: ExpenseItemId,
    pub amount: Money,
}

impl NewCharge {
    pub fn into_record(self, id: ChargeId, charge_date: DateTime<Utc>) -> ChargeRecord {
        ChargeRecord {
            id,
            expense_item_id: self.expense_item_id,
            amount: self.amount,
            charge_date,
        }
    }
}
