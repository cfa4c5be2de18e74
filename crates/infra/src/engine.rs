//! Stock-adjusting transaction engine.
//!
//! Creates and reverses sales so that the sale ledger and the stock ledger
//! never diverge:
//!
//! ```text
//! CreateSale(item, qty)                DeleteSale(sale)
//!   ↓                                    ↓
//! 1. validate qty > 0                  1. begin unit of work
//! 2. begin unit of work                2. lock + read sale row
//! 3. lock + read item row              3. lock + read item row
//! 4. plan (stock check, amount)        4. delete sale row
//! 5. insert sale row                   5. restore item quantity
//! 6. decrement item quantity           6. commit
//! 7. commit
//! ```
//!
//! Any failure after `begin` rolls the whole unit of work back. Each unit of
//! work runs on its own spawned task: if the caller is dropped (client
//! disconnect) the unit of work still runs to commit or rollback, the caller
//! just stops waiting for the result.
//!
//! Concurrent operations on the same item are serialized by the item row
//! lock, first lock-holder wins and the others wait (bounded by the store's
//! lock timeout). Operations on different items never block each other.
//!
//! The engine is identity-agnostic: authorization happens in the caller.

use std::sync::Arc;

use chrono::Utc;
use tracing::{Instrument, Level, Span, instrument};

use stockroom_core::{Entity, ItemId, SaleId};
use stockroom_sales::{FailureCause, SaleError, SaleRecord, SaleRequest, plan_reversal, plan_sale};

use crate::store::{LedgerStore, StoreError, UnitOfWork};

/// Map storage failures to the sale error taxonomy.
///
/// - `NotFound` stays `NotFound`
/// - lock timeouts and every other storage failure become `TransactionFailure`
pub fn map_store_error(err: StoreError) -> SaleError {
    match err {
        StoreError::NotFound(what) => SaleError::NotFound(what),
        StoreError::LockTimeout => SaleError::TransactionFailure(FailureCause::LockTimeout),
        StoreError::Conflict(msg) | StoreError::Backend(msg) => SaleError::storage(msg),
    }
}

/// Atomic sale creation and reversal over an injected [`LedgerStore`].
#[derive(Clone)]
pub struct TransactionEngine {
    store: Arc<dyn LedgerStore>,
}

impl TransactionEngine {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// Record a sale of `quantity` units of `item_id` at the item's current
    /// unit amount.
    ///
    /// Errors: `InvalidQuantity`, `NotFound`, `InsufficientStock`,
    /// `TransactionFailure`. None are retried here.
    #[instrument(skip(self), fields(sale_id = tracing::field::Empty), err(level = "info", Display))]
    pub async fn create_sale(&self, item_id: ItemId, quantity: i64) -> Result<SaleRecord, SaleError> {
        let request = SaleRequest::new(item_id, quantity)?;
        let store = self.store.clone();

        let task = tokio::spawn(
            async move {
                let mut uow = store.begin().await.map_err(map_store_error)?;
                let staged = stage_sale(uow.as_mut(), request).await;
                finish(uow, staged).await
            }
            .instrument(Span::current()),
        );

        let sale = join(task).await?;
        Span::current().record("sale_id", sale.id().get());
        Ok(sale)
    }

    /// Delete a sale and restore its quantity to the referenced item.
    ///
    /// Errors: `NotFound` (sale, or its item), `TransactionFailure`.
    #[instrument(skip(self), err(level = "info", Display))]
    pub async fn delete_sale(&self, sale_id: SaleId) -> Result<(), SaleError> {
        let store = self.store.clone();

        let task = tokio::spawn(
            async move {
                let mut uow = store.begin().await.map_err(map_store_error)?;
                let staged = stage_reversal(uow.as_mut(), sale_id).await;
                finish(uow, staged).await
            }
            .instrument(Span::current()),
        );

        join(task).await.map(|_| ())
    }
}

/// Commit a successfully staged unit of work, or roll it back.
async fn finish<T>(uow: Box<dyn UnitOfWork>, staged: Result<T, SaleError>) -> Result<T, SaleError> {
    match staged {
        Ok(value) => {
            uow.commit().await.map_err(|e| {
                tracing::warn!(error = %e, "commit failed; unit of work rolled back");
                map_store_error(e)
            })?;
            tracing::info!("unit of work committed");
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = uow.rollback().await {
                // The backend discards the unit of work on drop regardless.
                tracing::warn!(error = %rollback_err, "rollback failed");
            }
            if abort_level(&err) == Level::WARN {
                tracing::warn!(error = %err, "unit of work aborted");
            } else {
                tracing::info!(error = %err, "unit of work rejected");
            }
            Err(err)
        }
    }
}

/// Client-input rejections are routine; only server-side faults warn.
fn abort_level(err: &SaleError) -> Level {
    if err.is_client_error() {
        Level::INFO
    } else {
        Level::WARN
    }
}

async fn stage_sale(uow: &mut dyn UnitOfWork, request: SaleRequest) -> Result<SaleRecord, SaleError> {
    let item = uow
        .lock_item(request.item_id())
        .await
        .map_err(map_store_error)?
        .ok_or_else(SaleError::item_not_found)?;

    let planned = plan_sale(&item, &request, Utc::now())?;
    let sale = uow.insert_sale(planned).await.map_err(map_store_error)?;
    uow.adjust_item_quantity(item.id(), -request.quantity())
        .await
        .map_err(map_store_error)?;

    Ok(sale)
}

async fn stage_reversal(uow: &mut dyn UnitOfWork, sale_id: SaleId) -> Result<(), SaleError> {
    // Lock order: sale row, then item row.
    let sale = uow
        .lock_sale(sale_id)
        .await
        .map_err(map_store_error)?
        .ok_or_else(SaleError::sale_not_found)?;

    let reversal = plan_reversal(&sale);
    uow.lock_item(reversal.item_id)
        .await
        .map_err(map_store_error)?
        .ok_or_else(SaleError::item_not_found)?;

    uow.delete_sale(sale.id()).await.map_err(map_store_error)?;
    uow.adjust_item_quantity(reversal.item_id, reversal.delta())
        .await
        .map_err(map_store_error)?;

    Ok(())
}

async fn join<T>(task: tokio::task::JoinHandle<Result<T, SaleError>>) -> Result<T, SaleError> {
    task.await
        .map_err(|e| SaleError::storage(format!("unit of work task failed: {e}")))?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_map_onto_sale_taxonomy() {
        assert_eq!(map_store_error(StoreError::NotFound("sale")), SaleError::NotFound("sale"));
        assert_eq!(
            map_store_error(StoreError::LockTimeout),
            SaleError::TransactionFailure(FailureCause::LockTimeout)
        );
        assert!(map_store_error(StoreError::Backend("io".to_string())).is_retryable());
        assert!(map_store_error(StoreError::Conflict("check".to_string())).is_retryable());
    }

    #[test]
    fn client_input_rejections_are_not_logged_as_faults() {
        assert_eq!(abort_level(&SaleError::InvalidQuantity(0)), Level::INFO);
        assert_eq!(abort_level(&SaleError::item_not_found()), Level::INFO);
        assert_eq!(
            abort_level(&SaleError::InsufficientStock {
                item_id: ItemId::new(1),
                requested: 7,
                available: 6,
            }),
            Level::INFO
        );
        assert_eq!(abort_level(&SaleError::storage("disk full")), Level::WARN);
        assert_eq!(
            abort_level(&SaleError::TransactionFailure(FailureCause::LockTimeout)),
            Level::WARN
        );
    }
}
