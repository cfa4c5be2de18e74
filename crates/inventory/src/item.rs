use serde::{Deserialize, Serialize};

use stockroom_core::{DomainError, DomainResult, Entity, ItemId, Money};

/// A tracked SKU: on-hand quantity and unit price.
///
/// `quantity` is never negative for a value obtained through [`StockItem::new`];
/// the storage layer is expected to uphold the same invariant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockItem {
    id: ItemId,
    name: String,
    quantity: i64,
    /// Unit price, serialized as `amount` for wire compatibility.
    #[serde(rename = "amount")]
    unit_amount: Money,
}

impl StockItem {
    pub fn new(id: ItemId, name: impl Into<String>, quantity: i64, unit_amount: Money) -> DomainResult<Self> {
        if quantity < 0 {
            return Err(DomainError::invariant("stock quantity cannot be negative"));
        }
        Ok(Self {
            id,
            name: name.into(),
            quantity,
            unit_amount,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn quantity(&self) -> i64 {
        self.quantity
    }

    pub fn unit_amount(&self) -> Money {
        self.unit_amount
    }

    /// Whether `quantity` units can leave stock without going negative.
    pub fn can_supply(&self, quantity: i64) -> bool {
        quantity >= 0 && quantity <= self.quantity
    }

    /// Remove `quantity` units from stock.
    pub fn withdraw(&mut self, quantity: i64) -> DomainResult<()> {
        if quantity <= 0 {
            return Err(DomainError::validation("quantity must be positive"));
        }
        if !self.can_supply(quantity) {
            return Err(DomainError::invariant("stock cannot go negative"));
        }
        self.quantity -= quantity;
        Ok(())
    }

    /// Return `quantity` units to stock. There is no upper bound.
    pub fn restore(&mut self, quantity: i64) -> DomainResult<()> {
        if quantity <= 0 {
            return Err(DomainError::validation("quantity must be positive"));
        }
        self.quantity = self
            .quantity
            .checked_add(quantity)
            .ok_or_else(|| DomainError::invariant("stock quantity overflow"))?;
        Ok(())
    }
}

impl Entity for StockItem {
    type Id = ItemId;

    fn id(&self) -> ItemId {
        self.id
    }
}

/// Administrative create/update payload for a stock item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockItemDraft {
    pub name: String,
    pub quantity: i64,
    pub amount: Money,
}

impl StockItemDraft {
    pub fn validate(&self) -> DomainResult<()> {
        if self.name.trim().is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }
        if self.quantity < 0 {
            return Err(DomainError::validation("quantity cannot be negative"));
        }
        Ok(())
    }

    /// Materialize the draft as a stock item with the given identity.
    pub fn into_item(self, id: ItemId) -> DomainResult<StockItem> {
        self.validate()?;
        StockItem::new(id, self.name.trim(), self.quantity, self.amount)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    fn item(quantity: i64) -> StockItem {
        StockItem::new(ItemId::new(1), "Widget", quantity, Money::new(dec!(2.50)).unwrap()).unwrap()
    }

    #[test]
    fn rejects_negative_quantity() {
        let err = StockItem::new(ItemId::new(1), "Widget", -1, Money::ZERO).unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn withdraw_reduces_stock() {
        let mut it = item(10);
        it.withdraw(4).unwrap();
        assert_eq!(it.quantity(), 6);
    }

    #[test]
    fn withdraw_refuses_to_oversell() {
        let mut it = item(6);
        let err = it.withdraw(7).unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
        assert_eq!(it.quantity(), 6);
    }

    #[test]
    fn draft_validation() {
        let draft = StockItemDraft {
            name: "  ".to_string(),
            quantity: 1,
            amount: Money::ZERO,
        };
        assert!(draft.validate().is_err());

        let draft = StockItemDraft {
            name: "Bolt".to_string(),
            quantity: -2,
            amount: Money::ZERO,
        };
        assert!(draft.validate().is_err());
    }

    #[test]
    fn serializes_unit_price_as_amount() {
        let json = serde_json::to_value(item(3)).unwrap();
        assert_eq!(json["id"], 1);
        assert_eq!(json["quantity"], 3);
        assert_eq!(json["amount"], 2.5);
    }

    proptest! {
        #[test]
        fn stock_never_negative(start in 0i64..1_000, ops in proptest::collection::vec(-50i64..50, 0..64)) {
            let mut it = item(start);
            for delta in ops {
                let _ = if delta >= 0 { it.restore(delta) } else { it.withdraw(-delta) };
                prop_assert!(it.quantity() >= 0);
            }
        }
    }
}
