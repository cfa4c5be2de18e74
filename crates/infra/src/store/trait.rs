use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use stockroom_accounting::{
    ChargeRecord, ExpenseItem, ExpenseItemDraft, ItemRevenue, NewCharge, ReportingPeriod, TopItemsQuery,
};
use stockroom_auth::{Role, UserAccount};
use stockroom_core::{ChargeId, ExpenseItemId, ItemId, Money, SaleId};
use stockroom_inventory::{StockItem, StockItemDraft};
use stockroom_sales::{NewSale, SaleRecord};

/// Storage operation error.
///
/// These are **infrastructure errors** as opposed to domain errors: the
/// engine and the API layer decide what they mean for the caller.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(&'static str),

    /// A storage constraint rejected the write (referenced row, negative
    /// stock, duplicate key).
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("lock wait timed out")]
    LockTimeout,

    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Opens atomic units of work over the stock and sale ledgers.
///
/// ## Locking contract
///
/// - `lock_item` / `lock_sale` take an exclusive row lock and **then** read the
///   row. A second unit of work locking the same row waits until the first
///   commits or rolls back, then observes its effects.
/// - Waiting is bounded by the backend's lock timeout; exceeding it yields
///   [`StoreError::LockTimeout`].
/// - Row locks are released on commit, rollback or drop.
///
/// Lock order used by the engine: sale row before item row. Callers must not
/// lock an item and then a sale in the same unit of work.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, StoreError>;
}

/// One atomic unit of work. Writes become visible only on `commit`.
///
/// Dropping an uncommitted unit of work rolls it back.
#[async_trait]
pub trait UnitOfWork: Send {
    /// Lock the item row, then read it. `None` if the item does not exist.
    async fn lock_item(&mut self, id: ItemId) -> Result<Option<StockItem>, StoreError>;

    /// Lock the sale row, then read it. `None` if the sale does not exist.
    async fn lock_sale(&mut self, id: SaleId) -> Result<Option<SaleRecord>, StoreError>;

    /// Stage a new sale row; the id is assigned here.
    async fn insert_sale(&mut self, sale: NewSale) -> Result<SaleRecord, StoreError>;

    async fn delete_sale(&mut self, id: SaleId) -> Result<(), StoreError>;

    /// Add `delta` (possibly negative) to the item's quantity. The resulting
    /// quantity must not be negative; backends reject such writes with
    /// [`StoreError::Conflict`] at the latest on commit.
    async fn adjust_item_quantity(&mut self, id: ItemId, delta: i64) -> Result<(), StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}

/// Administrative access to stock items ("warehouses" on the wire).
#[async_trait]
pub trait StockItemStore: Send + Sync {
    /// All items ordered by id.
    async fn list_items(&self) -> Result<Vec<StockItem>, StoreError>;

    async fn get_item(&self, id: ItemId) -> Result<Option<StockItem>, StoreError>;

    async fn create_item(&self, draft: StockItemDraft) -> Result<StockItem, StoreError>;

    /// Overwrite name, quantity and unit amount. Takes the item row lock, so it
    /// serializes with in-flight sales.
    async fn update_item(&self, id: ItemId, draft: StockItemDraft) -> Result<StockItem, StoreError>;

    /// Fails with [`StoreError::Conflict`] while sales reference the item.
    async fn delete_item(&self, id: ItemId) -> Result<(), StoreError>;
}

#[async_trait]
pub trait SaleStore: Send + Sync {
    /// All sales, newest first.
    async fn list_sales(&self) -> Result<Vec<SaleRecord>, StoreError>;
}

#[async_trait]
pub trait ExpenseItemStore: Send + Sync {
    async fn list_expense_items(&self) -> Result<Vec<ExpenseItem>, StoreError>;

    async fn create_expense_item(&self, draft: ExpenseItemDraft) -> Result<ExpenseItem, StoreError>;

    /// Fails with [`StoreError::Conflict`] while charges reference it.
    async fn delete_expense_item(&self, id: ExpenseItemId) -> Result<(), StoreError>;
}

#[async_trait]
pub trait ChargeStore: Send + Sync {
    /// All charges, newest first.
    async fn list_charges(&self) -> Result<Vec<ChargeRecord>, StoreError>;

    /// Book a charge at `at`. The expense item must exist.
    async fn create_charge(&self, charge: NewCharge, at: DateTime<Utc>) -> Result<ChargeRecord, StoreError>;

    async fn delete_charge(&self, id: ChargeId) -> Result<(), StoreError>;
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_user(&self, username: &str) -> Result<Option<UserAccount>, StoreError>;

    async fn count_users(&self) -> Result<u64, StoreError>;

    /// All accounts ordered by id.
    async fn list_users(&self) -> Result<Vec<UserAccount>, StoreError>;

    /// Remove every account; returns how many were removed.
    async fn delete_all_users(&self) -> Result<u64, StoreError>;

    /// Fails with [`StoreError::Conflict`] if the username is taken.
    async fn insert_user(&self, username: &str, password_hash: &str, role: Role) -> Result<UserAccount, StoreError>;
}

/// Read-only aggregates over the ledgers for reporting.
#[async_trait]
pub trait ReportSource: Send + Sync {
    /// Sum of sale amounts with `sale_date` in the period.
    async fn revenue_between(&self, period: &ReportingPeriod) -> Result<Money, StoreError>;

    /// Sum of charge amounts with `charge_date` in the period.
    async fn expenses_between(&self, period: &ReportingPeriod) -> Result<Money, StoreError>;

    /// Every item with its revenue in the period (zero if none), ranked and
    /// truncated per [`stockroom_accounting::rank_items`].
    async fn top_items(&self, query: &TopItemsQuery) -> Result<Vec<ItemRevenue>, StoreError>;
}

/// Everything a storage backend provides, as one bound.
pub trait Backend:
    LedgerStore + StockItemStore + SaleStore + ExpenseItemStore + ChargeStore + UserStore + ReportSource + 'static
{
}

impl<T> Backend for T where
    T: LedgerStore + StockItemStore + SaleStore + ExpenseItemStore + ChargeStore + UserStore + ReportSource + 'static
{
}
