use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockroom_core::{Entity, ItemId, Money, SaleId};

use crate::error::SaleError;

/// A validated request to sell `quantity` units of `item_id`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct SaleRequest {
    item_id: ItemId,
    quantity: i64,
}

impl SaleRequest {
    pub fn new(item_id: ItemId, quantity: i64) -> Result<Self, SaleError> {
        if quantity <= 0 {
            return Err(SaleError::InvalidQuantity(quantity));
        }
        Ok(Self { item_id, quantity })
    }

    pub fn item_id(&self) -> ItemId {
        self.item_id
    }

    pub fn quantity(&self) -> i64 {
        self.quantity
    }
}

/// A sale that has been decided but not yet persisted (no id yet).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSale {
    pub item_id: ItemId,
    pub quantity: i64,
    pub amount: Money,
    pub sale_date: DateTime<Utc>,
}

impl NewSale {
    pub fn with_id(self, id: SaleId) -> SaleRecord {
        SaleRecord {
            id,
            item_id: self.item_id,
            quantity: self.quantity,
            amount: self.amount,
            sale_date: self.sale_date,
        }
    }
}

/// A persisted sale. Never mutated after creation; deleting it reverses its
/// stock effect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleRecord {
    pub id: SaleId,
    #[serde(rename = "warehouse_id")]
    pub item_id: ItemId,
    pub quantity: i64,
    /// `quantity × unit price` at the time of sale; later price changes never alter it.
    pub amount: Money,
    pub sale_date: DateTime<Utc>,
}

impl Entity for SaleRecord {
    type Id = SaleId;

    fn id(&self) -> SaleId {
        self.id
    }
}
