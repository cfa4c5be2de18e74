//! Postgres-backed storage.
//!
//! ## Error Mapping
//!
//! SQLx errors are mapped to `StoreError` as follows:
//!
//! | PostgreSQL Error Code | StoreError | Scenario |
//! |----------------------|------------|----------|
//! | `55P03` (lock_not_available) | `LockTimeout` | `lock_timeout` elapsed while waiting for a row lock |
//! | `23503` (foreign key violation) | `Conflict` | Deleting a referenced item / expense item |
//! | `23505` (unique violation) | `Conflict` | Duplicate username |
//! | `23514` (check violation) | `Conflict` | Stock would go negative |
//! | any other | `Backend` | Network errors, pool closed, etc. |
//!
//! ## Locking
//!
//! Every unit of work is one database transaction with `SET LOCAL lock_timeout`
//! applied at `begin`. Row locks are `SELECT … FOR UPDATE`.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use tracing::instrument;

use stockroom_accounting::{
    ChargeRecord, ExpenseItem, ExpenseItemDraft, ItemRevenue, NewCharge, ReportingPeriod, TopItemsQuery,
};
use stockroom_auth::{Role, UserAccount};
use stockroom_core::{ChargeId, ExpenseItemId, ItemId, Money, SaleId, UserId};
use stockroom_inventory::{StockItem, StockItemDraft};
use stockroom_sales::{NewSale, SaleRecord};

use super::r#trait::{
    ChargeStore, ExpenseItemStore, LedgerStore, ReportSource, SaleStore, StockItemStore, StoreError, UnitOfWork,
    UserStore,
};

/// Postgres storage backend.
///
/// Uses the SQLx connection pool, which is `Send + Sync`; the store is cheap
/// to clone and share.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
    lock_timeout: Duration,
}

impl PostgresStore {
    pub fn new(pool: PgPool, lock_timeout: Duration) -> Self {
        Self { pool, lock_timeout }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[derive(Debug, FromRow)]
struct ItemRow {
    id: i64,
    name: String,
    quantity: i64,
    amount: Decimal,
}

impl TryFrom<ItemRow> for StockItem {
    type Error = StoreError;

    fn try_from(row: ItemRow) -> Result<Self, Self::Error> {
        StockItem::new(ItemId::new(row.id), row.name, row.quantity, money(row.amount)?)
            .map_err(|e| StoreError::Backend(format!("invalid stock item row {}: {e}", row.id)))
    }
}

#[derive(Debug, FromRow)]
struct SaleRow {
    id: i64,
    warehouse_id: i64,
    quantity: i64,
    amount: Decimal,
    sale_date: DateTime<Utc>,
}

impl TryFrom<SaleRow> for SaleRecord {
    type Error = StoreError;

    fn try_from(row: SaleRow) -> Result<Self, Self::Error> {
        Ok(SaleRecord {
            id: SaleId::new(row.id),
            item_id: ItemId::new(row.warehouse_id),
            quantity: row.quantity,
            amount: money(row.amount)?,
            sale_date: row.sale_date,
        })
    }
}

#[derive(Debug, FromRow)]
struct ChargeRow {
    id: i64,
    expense_item_id: i64,
    amount: Decimal,
    charge_date: DateTime<Utc>,
}

impl TryFrom<ChargeRow> for ChargeRecord {
    type Error = StoreError;

    fn try_from(row: ChargeRow) -> Result<Self, Self::Error> {
        Ok(ChargeRecord {
            id: ChargeId::new(row.id),
            expense_item_id: ExpenseItemId::new(row.expense_item_id),
            amount: money(row.amount)?,
            charge_date: row.charge_date,
        })
    }
}

#[derive(Debug, FromRow)]
struct UserRow {
    id: i64,
    username: String,
    password_hash: String,
    role: String,
}

impl From<UserRow> for UserAccount {
    fn from(row: UserRow) -> Self {
        UserAccount {
            id: UserId::new(row.id),
            username: row.username,
            password_hash: row.password_hash,
            role: Role::new(row.role),
        }
    }
}

#[derive(Debug, FromRow)]
struct ItemRevenueRow {
    id: i64,
    name: String,
    revenue: Decimal,
}

fn money(amount: Decimal) -> Result<Money, StoreError> {
    Money::new(amount).map_err(|e| StoreError::Backend(format!("invalid stored amount {amount}: {e}")))
}

fn collect<R, T>(rows: Vec<R>) -> Result<Vec<T>, StoreError>
where
    T: TryFrom<R, Error = StoreError>,
{
    rows.into_iter().map(T::try_from).collect()
}

/// Unit of work backed by one Postgres transaction.
///
/// Dropping it without `commit` rolls the transaction back (sqlx semantics).
pub struct PostgresUnitOfWork {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl LedgerStore for PostgresStore {
    #[instrument(skip(self), err)]
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, StoreError> {
        let mut tx = self.pool.begin().await.map_err(|e| map_sqlx_error("begin", e))?;

        // SET does not take bind parameters; the value is an integer we format.
        let stmt = format!("SET LOCAL lock_timeout = '{}ms'", self.lock_timeout.as_millis());
        sqlx::query(&stmt)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("begin", e))?;

        Ok(Box::new(PostgresUnitOfWork { tx }))
    }
}

#[async_trait]
impl UnitOfWork for PostgresUnitOfWork {
    async fn lock_item(&mut self, id: ItemId) -> Result<Option<StockItem>, StoreError> {
        let row = sqlx::query_as::<_, ItemRow>(
            r#"
            SELECT id, name, quantity, amount
            FROM warehouses
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(id.get())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("lock_item", e))?;

        row.map(StockItem::try_from).transpose()
    }

    async fn lock_sale(&mut self, id: SaleId) -> Result<Option<SaleRecord>, StoreError> {
        let row = sqlx::query_as::<_, SaleRow>(
            r#"
            SELECT id, warehouse_id, quantity, amount, sale_date
            FROM sales
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(id.get())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("lock_sale", e))?;

        row.map(SaleRecord::try_from).transpose()
    }

    async fn insert_sale(&mut self, sale: NewSale) -> Result<SaleRecord, StoreError> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO sales (warehouse_id, quantity, amount, sale_date)
            VALUES ($1, $2, $3, $4)
            RETURNING id
            "#,
        )
        .bind(sale.item_id.get())
        .bind(sale.quantity)
        .bind(sale.amount.amount())
        .bind(sale.sale_date)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_sale", e))?;

        Ok(sale.with_id(SaleId::new(id)))
    }

    async fn delete_sale(&mut self, id: SaleId) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM sales WHERE id = $1")
            .bind(id.get())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("delete_sale", e))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound("sale"));
        }
        Ok(())
    }

    async fn adjust_item_quantity(&mut self, id: ItemId, delta: i64) -> Result<(), StoreError> {
        // `CHECK (quantity >= 0)` turns an oversell into 23514 → Conflict.
        let result = sqlx::query("UPDATE warehouses SET quantity = quantity + $2 WHERE id = $1")
            .bind(id.get())
            .bind(delta)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("adjust_item_quantity", e))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound("stock item"));
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.commit().await.map_err(|e| map_sqlx_error("commit", e))
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.rollback().await.map_err(|e| map_sqlx_error("rollback", e))
    }
}

#[async_trait]
impl StockItemStore for PostgresStore {
    async fn list_items(&self) -> Result<Vec<StockItem>, StoreError> {
        let rows = sqlx::query_as::<_, ItemRow>("SELECT id, name, quantity, amount FROM warehouses ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_items", e))?;
        collect(rows)
    }

    async fn get_item(&self, id: ItemId) -> Result<Option<StockItem>, StoreError> {
        let row = sqlx::query_as::<_, ItemRow>("SELECT id, name, quantity, amount FROM warehouses WHERE id = $1")
            .bind(id.get())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_item", e))?;
        row.map(StockItem::try_from).transpose()
    }

    async fn create_item(&self, draft: StockItemDraft) -> Result<StockItem, StoreError> {
        let row = sqlx::query_as::<_, ItemRow>(
            r#"
            INSERT INTO warehouses (name, quantity, amount)
            VALUES ($1, $2, $3)
            RETURNING id, name, quantity, amount
            "#,
        )
        .bind(draft.name.trim())
        .bind(draft.quantity)
        .bind(draft.amount.amount())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("create_item", e))?;
        row.try_into()
    }

    async fn update_item(&self, id: ItemId, draft: StockItemDraft) -> Result<StockItem, StoreError> {
        let mut tx = self.pool.begin().await.map_err(|e| map_sqlx_error("update_item", e))?;
        let stmt = format!("SET LOCAL lock_timeout = '{}ms'", self.lock_timeout.as_millis());
        sqlx::query(&stmt)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("update_item", e))?;

        let row = sqlx::query_as::<_, ItemRow>(
            r#"
            UPDATE warehouses
            SET name = $2, quantity = $3, amount = $4
            WHERE id = $1
            RETURNING id, name, quantity, amount
            "#,
        )
        .bind(id.get())
        .bind(draft.name.trim())
        .bind(draft.quantity)
        .bind(draft.amount.amount())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("update_item", e))?
        .ok_or(StoreError::NotFound("stock item"))?;

        tx.commit().await.map_err(|e| map_sqlx_error("update_item", e))?;
        row.try_into()
    }

    async fn delete_item(&self, id: ItemId) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM warehouses WHERE id = $1")
            .bind(id.get())
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete_item", e))?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound("stock item"));
        }
        Ok(())
    }
}

#[async_trait]
impl SaleStore for PostgresStore {
    async fn list_sales(&self) -> Result<Vec<SaleRecord>, StoreError> {
        let rows = sqlx::query_as::<_, SaleRow>(
            "SELECT id, warehouse_id, quantity, amount, sale_date FROM sales ORDER BY sale_date DESC, id DESC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_sales", e))?;
        collect(rows)
    }
}

#[async_trait]
impl ExpenseItemStore for PostgresStore {
    async fn list_expense_items(&self) -> Result<Vec<ExpenseItem>, StoreError> {
        let rows: Vec<(i64, String)> = sqlx::query_as("SELECT id, name FROM expense_items ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_expense_items", e))?;
        Ok(rows
            .into_iter()
            .map(|(id, name)| ExpenseItem {
                id: ExpenseItemId::new(id),
                name,
            })
            .collect())
    }

    async fn create_expense_item(&self, draft: ExpenseItemDraft) -> Result<ExpenseItem, StoreError> {
        let name = draft.name.trim().to_string();
        let id: i64 = sqlx::query_scalar("INSERT INTO expense_items (name) VALUES ($1) RETURNING id")
            .bind(&name)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("create_expense_item", e))?;
        Ok(ExpenseItem {
            id: ExpenseItemId::new(id),
            name,
        })
    }

    async fn delete_expense_item(&self, id: ExpenseItemId) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM expense_items WHERE id = $1")
            .bind(id.get())
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete_expense_item", e))?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound("expense item"));
        }
        Ok(())
    }
}

#[async_trait]
impl ChargeStore for PostgresStore {
    async fn list_charges(&self) -> Result<Vec<ChargeRecord>, StoreError> {
        let rows = sqlx::query_as::<_, ChargeRow>(
            "SELECT id, expense_item_id, amount, charge_date FROM charges ORDER BY charge_date DESC, id DESC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_charges", e))?;
        collect(rows)
    }

    async fn create_charge(&self, charge: NewCharge, at: DateTime<Utc>) -> Result<ChargeRecord, StoreError> {
        let row = sqlx::query_as::<_, ChargeRow>(
            r#"
            INSERT INTO charges (expense_item_id, amount, charge_date)
            VALUES ($1, $2, $3)
            RETURNING id, expense_item_id, amount, charge_date
            "#,
        )
        .bind(charge.expense_item_id.get())
        .bind(charge.amount.amount())
        .bind(at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match map_sqlx_error("create_charge", e) {
            // The only foreign key on charges is the expense item.
            StoreError::Conflict(_) => StoreError::NotFound("expense item"),
            other => other,
        })?;
        row.try_into()
    }

    async fn delete_charge(&self, id: ChargeId) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM charges WHERE id = $1")
            .bind(id.get())
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete_charge", e))?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound("charge"));
        }
        Ok(())
    }
}

#[async_trait]
impl UserStore for PostgresStore {
    async fn find_user(&self, username: &str) -> Result<Option<UserAccount>, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, username, password_hash, role FROM users WHERE username = $1",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_user", e))?;
        Ok(row.map(UserAccount::from))
    }

    async fn count_users(&self) -> Result<u64, StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("count_users", e))?;
        Ok(count.max(0) as u64)
    }

    async fn list_users(&self) -> Result<Vec<UserAccount>, StoreError> {
        let rows = sqlx::query_as::<_, UserRow>("SELECT id, username, password_hash, role FROM users ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_users", e))?;
        Ok(rows.into_iter().map(UserAccount::from).collect())
    }

    async fn delete_all_users(&self) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM users")
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete_all_users", e))?;
        Ok(result.rows_affected())
    }

    async fn insert_user(&self, username: &str, password_hash: &str, role: Role) -> Result<UserAccount, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            INSERT INTO users (username, password_hash, role)
            VALUES ($1, $2, $3)
            RETURNING id, username, password_hash, role
            "#,
        )
        .bind(username)
        .bind(password_hash)
        .bind(role.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_user", e))?;
        Ok(row.into())
    }
}

#[async_trait]
impl ReportSource for PostgresStore {
    #[instrument(skip(self), err)]
    async fn revenue_between(&self, period: &ReportingPeriod) -> Result<Money, StoreError> {
        let total: Decimal = sqlx::query_scalar(
            "SELECT COALESCE(SUM(amount), 0) FROM sales WHERE sale_date >= $1 AND sale_date < $2",
        )
        .bind(period.start())
        .bind(period.end())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("revenue_between", e))?;
        money(total)
    }

    #[instrument(skip(self), err)]
    async fn expenses_between(&self, period: &ReportingPeriod) -> Result<Money, StoreError> {
        let total: Decimal = sqlx::query_scalar(
            "SELECT COALESCE(SUM(amount), 0) FROM charges WHERE charge_date >= $1 AND charge_date < $2",
        )
        .bind(period.start())
        .bind(period.end())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("expenses_between", e))?;
        money(total)
    }

    #[instrument(skip(self), err)]
    async fn top_items(&self, query: &TopItemsQuery) -> Result<Vec<ItemRevenue>, StoreError> {
        let rows = sqlx::query_as::<_, ItemRevenueRow>(
            r#"
            SELECT w.id, w.name, COALESCE(SUM(s.amount), 0) AS revenue
            FROM warehouses w
            LEFT JOIN sales s
                ON s.warehouse_id = w.id
                AND s.sale_date >= $1
                AND s.sale_date < $2
            GROUP BY w.id, w.name
            ORDER BY revenue DESC, w.id ASC
            LIMIT $3
            "#,
        )
        .bind(query.period.start())
        .bind(query.period.end())
        .bind(query.limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("top_items", e))?;

        rows.into_iter()
            .map(|r| {
                Ok(ItemRevenue {
                    id: ItemId::new(r.id),
                    name: r.name,
                    revenue: money(r.revenue)?,
                })
            })
            .collect()
    }
}

/// Map SQLx errors to `StoreError` (see the module docs for the table).
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("55P03") => StoreError::LockTimeout,
                Some("23503") | Some("23505") | Some("23514") => StoreError::Conflict(msg),
                _ => StoreError::Backend(msg),
            }
        }
        sqlx::Error::PoolClosed => StoreError::Backend(format!("connection pool closed in {}", operation)),
        sqlx::Error::PoolTimedOut => StoreError::Backend(format!("connection pool timed out in {}", operation)),
        _ => StoreError::Backend(format!("sqlx error in {}: {}", operation, err)),
    }
}
