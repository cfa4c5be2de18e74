//! Pure decision logic for sale creation and reversal.

use chrono::{DateTime, Utc};

use stockroom_core::{Entity, ItemId};
use stockroom_inventory::StockItem;

use crate::error::SaleError;
use crate::sale::{NewSale, SaleRecord, SaleRequest};

/// Decide the sale to record against a stock item that is held under lock.
///
/// The amount is priced from the item's unit amount as read under the lock.
pub fn plan_sale(item: &StockItem, request: &SaleRequest, now: DateTime<Utc>) -> Result<NewSale, SaleError> {
    if item.id() != request.item_id() {
        return Err(SaleError::item_not_found());
    }
    if !item.can_supply(request.quantity()) {
        return Err(SaleError::InsufficientStock {
            item_id: item.id(),
            requested: request.quantity(),
            available: item.quantity(),
        });
    }

    let amount = item
        .unit_amount()
        .times(request.quantity())
        .map_err(|e| SaleError::storage(e.to_string()))?;

    Ok(NewSale {
        item_id: item.id(),
        quantity: request.quantity(),
        amount,
        sale_date: now,
    })
}

/// Stock restoration implied by deleting a sale.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct StockReversal {
    pub item_id: ItemId,
    pub quantity: i64,
}

impl StockReversal {
    /// Signed delta to apply to the item's quantity.
    pub fn delta(&self) -> i64 {
        self.quantity
    }
}

pub fn plan_reversal(sale: &SaleRecord) -> StockReversal {
    StockReversal {
        item_id: sale.item_id,
        quantity: sale.quantity,
    }
}
