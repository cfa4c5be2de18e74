use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

#[cfg(test)]
use std::sync::atomic::AtomicBool;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex as RowMutex, OwnedMutexGuard};

use stockroom_accounting::{
    ChargeRecord, ExpenseItem, ExpenseItemDraft, ItemRevenue, NewCharge, ReportingPeriod, TopItemsQuery, rank_items,
};
use stockroom_auth::{Role, UserAccount};
use stockroom_core::{ChargeId, Entity, ExpenseItemId, ItemId, Money, SaleId, UserId};
use stockroom_inventory::{StockItem, StockItemDraft};
use stockroom_sales::{NewSale, SaleRecord};

use super::r#trait::{
    ChargeStore, ExpenseItemStore, LedgerStore, ReportSource, SaleStore, StockItemStore, StoreError, UnitOfWork,
    UserStore,
};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
enum RowKey {
    Item(ItemId),
    Sale(SaleId),
}

#[derive(Debug, Default)]
struct Tables {
    items: BTreeMap<ItemId, StockItem>,
    sales: BTreeMap<SaleId, SaleRecord>,
    expense_items: BTreeMap<ExpenseItemId, ExpenseItem>,
    charges: BTreeMap<ChargeId, ChargeRecord>,
    users: BTreeMap<UserId, UserAccount>,
}

#[derive(Debug)]
struct Sequences {
    item: AtomicI64,
    sale: AtomicI64,
    expense_item: AtomicI64,
    charge: AtomicI64,
    user: AtomicI64,
}

impl Default for Sequences {
    fn default() -> Self {
        Self {
            item: AtomicI64::new(1),
            sale: AtomicI64::new(1),
            expense_item: AtomicI64::new(1),
            charge: AtomicI64::new(1),
            user: AtomicI64::new(1),
        }
    }
}

fn next(seq: &AtomicI64) -> i64 {
    seq.fetch_add(1, Ordering::Relaxed)
}

#[derive(Debug)]
struct Inner {
    tables: RwLock<Tables>,
    row_locks: Mutex<HashMap<RowKey, Arc<RowMutex<()>>>>,
    seq: Sequences,
    lock_timeout: Duration,
    #[cfg(test)]
    fail_next_commit: AtomicBool,
}

/// In-memory storage backend.
///
/// Intended for tests/dev. Row locks are per-row async mutexes acquired with
/// the configured timeout; staged writes are applied under a single table
/// write lock on commit, so readers never observe a half-applied unit of work.
#[derive(Debug, Clone)]
pub struct InMemoryStore {
    inner: Arc<Inner>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

impl InMemoryStore {
    pub fn new(lock_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                tables: RwLock::new(Tables::default()),
                row_locks: Mutex::new(HashMap::new()),
                seq: Sequences::default(),
                lock_timeout,
                #[cfg(test)]
                fail_next_commit: AtomicBool::new(false),
            }),
        }
    }

    /// Make the next `commit` fail after all its staged writes were accepted.
    #[cfg(test)]
    pub(crate) fn fail_next_commit(&self) {
        self.inner.fail_next_commit.store(true, Ordering::SeqCst);
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>, StoreError> {
        self.inner
            .tables
            .read()
            .map_err(|_| StoreError::Backend("in-memory tables poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>, StoreError> {
        self.inner
            .tables
            .write()
            .map_err(|_| StoreError::Backend("in-memory tables poisoned".to_string()))
    }

    /// Number of rows with a registered lock (held or awaited).
    #[cfg(test)]
    pub(crate) fn registered_row_locks(&self) -> usize {
        self.inner.row_locks.lock().map(|locks| locks.len()).unwrap_or(0)
    }

    async fn lock_row(&self, key: RowKey) -> Result<RowGuard, StoreError> {
        let mutex = {
            let mut locks = self
                .inner
                .row_locks
                .lock()
                .map_err(|_| StoreError::Backend("row lock registry poisoned".to_string()))?;
            locks.entry(key).or_default().clone()
        };

        match tokio::time::timeout(self.inner.lock_timeout, mutex.lock_owned()).await {
            Ok(guard) => Ok(RowGuard {
                inner: self.inner.clone(),
                key,
                guard: Some(guard),
            }),
            Err(_) => {
                self.inner.prune_row_lock(key);
                Err(StoreError::LockTimeout)
            }
        }
    }
}

impl Inner {
    /// Forget the row's mutex if the registry holds the only reference.
    fn prune_row_lock(&self, key: RowKey) {
        let Ok(mut locks) = self.row_locks.lock() else {
            return;
        };
        if locks.get(&key).is_some_and(|m| Arc::strong_count(m) == 1) {
            locks.remove(&key);
        }
    }
}

/// Exclusive hold on one row.
///
/// Releasing the last holder also removes the row from the lock registry, so
/// the registry only tracks rows that are held or awaited.
struct RowGuard {
    inner: Arc<Inner>,
    key: RowKey,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for RowGuard {
    fn drop(&mut self) {
        // The owned guard keeps a reference to the mutex; release it first.
        self.guard.take();
        self.inner.prune_row_lock(self.key);
    }
}

enum Staged {
    InsertSale(SaleRecord),
    DeleteSale(SaleId),
    AdjustItem(ItemId, i64),
}

/// Unit of work over [`InMemoryStore`].
pub struct InMemoryUnitOfWork {
    store: InMemoryStore,
    held: HashSet<RowKey>,
    guards: Vec<RowGuard>,
    staged: Vec<Staged>,
}

impl InMemoryUnitOfWork {
    async fn acquire(&mut self, key: RowKey) -> Result<(), StoreError> {
        if self.held.contains(&key) {
            return Ok(());
        }
        let guard = self.store.lock_row(key).await?;
        self.guards.push(guard);
        self.held.insert(key);
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for InMemoryStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, StoreError> {
        Ok(Box::new(InMemoryUnitOfWork {
            store: self.clone(),
            held: HashSet::new(),
            guards: Vec::new(),
            staged: Vec::new(),
        }))
    }
}

#[async_trait]
impl UnitOfWork for InMemoryUnitOfWork {
    async fn lock_item(&mut self, id: ItemId) -> Result<Option<StockItem>, StoreError> {
        self.acquire(RowKey::Item(id)).await?;
        Ok(self.store.read()?.items.get(&id).cloned())
    }

    async fn lock_sale(&mut self, id: SaleId) -> Result<Option<SaleRecord>, StoreError> {
        self.acquire(RowKey::Sale(id)).await?;
        Ok(self.store.read()?.sales.get(&id).cloned())
    }

    async fn insert_sale(&mut self, sale: NewSale) -> Result<SaleRecord, StoreError> {
        let record = sale.with_id(SaleId::new(next(&self.store.inner.seq.sale)));
        self.staged.push(Staged::InsertSale(record.clone()));
        Ok(record)
    }

    async fn delete_sale(&mut self, id: SaleId) -> Result<(), StoreError> {
        self.staged.push(Staged::DeleteSale(id));
        Ok(())
    }

    async fn adjust_item_quantity(&mut self, id: ItemId, delta: i64) -> Result<(), StoreError> {
        self.staged.push(Staged::AdjustItem(id, delta));
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let this = *self;
        let mut tables = this.store.write()?;

        // Validate every staged write against scratch copies first; nothing is
        // applied unless all of them succeed.
        let mut touched: BTreeMap<ItemId, StockItem> = BTreeMap::new();
        for write in &this.staged {
            match write {
                Staged::InsertSale(sale) => {
                    if !tables.items.contains_key(&sale.item_id) {
                        return Err(StoreError::Conflict(format!(
                            "sale references missing stock item {}",
                            sale.item_id
                        )));
                    }
                }
                Staged::DeleteSale(id) => {
                    if !tables.sales.contains_key(id) {
                        return Err(StoreError::NotFound("sale"));
                    }
                }
                Staged::AdjustItem(id, delta) => {
                    let item = match touched.entry(*id) {
                        Entry::Occupied(e) => e.into_mut(),
                        Entry::Vacant(e) => {
                            e.insert(tables.items.get(id).cloned().ok_or(StoreError::NotFound("stock item"))?)
                        }
                    };
                    apply_delta(item, *delta)?;
                }
            }
        }

        #[cfg(test)]
        if this.store.inner.fail_next_commit.swap(false, Ordering::SeqCst) {
            return Err(StoreError::Backend("injected commit failure".to_string()));
        }

        for write in this.staged {
            match write {
                Staged::InsertSale(sale) => {
                    tables.sales.insert(sale.id, sale);
                }
                Staged::DeleteSale(id) => {
                    tables.sales.remove(&id);
                }
                Staged::AdjustItem(..) => {}
            }
        }
        for (id, item) in touched {
            tables.items.insert(id, item);
        }

        // Row guards in `this.guards` are released after the table lock.
        drop(tables);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        Ok(())
    }
}

fn apply_delta(item: &mut StockItem, delta: i64) -> Result<(), StoreError> {
    let result = match delta {
        d if d < 0 => item.withdraw(d.checked_neg().unwrap_or(i64::MAX)),
        d if d > 0 => item.restore(d),
        _ => Ok(()),
    };
    result.map_err(|e| StoreError::Conflict(e.to_string()))
}

#[async_trait]
impl StockItemStore for InMemoryStore {
    async fn list_items(&self) -> Result<Vec<StockItem>, StoreError> {
        Ok(self.read()?.items.values().cloned().collect())
    }

    async fn get_item(&self, id: ItemId) -> Result<Option<StockItem>, StoreError> {
        Ok(self.read()?.items.get(&id).cloned())
    }

    async fn create_item(&self, draft: StockItemDraft) -> Result<StockItem, StoreError> {
        let id = ItemId::new(next(&self.inner.seq.item));
        let item = draft.into_item(id).map_err(|e| StoreError::Conflict(e.to_string()))?;
        self.write()?.items.insert(id, item.clone());
        Ok(item)
    }

    async fn update_item(&self, id: ItemId, draft: StockItemDraft) -> Result<StockItem, StoreError> {
        let _row = self.lock_row(RowKey::Item(id)).await?;
        let mut tables = self.write()?;
        let slot = tables.items.get_mut(&id).ok_or(StoreError::NotFound("stock item"))?;
        *slot = draft.into_item(id).map_err(|e| StoreError::Conflict(e.to_string()))?;
        Ok(slot.clone())
    }

    async fn delete_item(&self, id: ItemId) -> Result<(), StoreError> {
        let _row = self.lock_row(RowKey::Item(id)).await?;
        let mut tables = self.write()?;
        if !tables.items.contains_key(&id) {
            return Err(StoreError::NotFound("stock item"));
        }
        if tables.sales.values().any(|s| s.item_id == id) {
            return Err(StoreError::Conflict(format!("stock item {id} is referenced by sales")));
        }
        tables.items.remove(&id);
        Ok(())
    }
}

#[async_trait]
impl SaleStore for InMemoryStore {
    async fn list_sales(&self) -> Result<Vec<SaleRecord>, StoreError> {
        let mut sales: Vec<SaleRecord> = self.read()?.sales.values().cloned().collect();
        sales.sort_by(|a, b| b.sale_date.cmp(&a.sale_date).then(b.id.cmp(&a.id)));
        Ok(sales)
    }
}

#[async_trait]
impl ExpenseItemStore for InMemoryStore {
    async fn list_expense_items(&self) -> Result<Vec<ExpenseItem>, StoreError> {
        Ok(self.read()?.expense_items.values().cloned().collect())
    }

    async fn create_expense_item(&self, draft: ExpenseItemDraft) -> Result<ExpenseItem, StoreError> {
        let item = ExpenseItem {
            id: ExpenseItemId::new(next(&self.inner.seq.expense_item)),
            name: draft.name.trim().to_string(),
        };
        self.write()?.expense_items.insert(item.id, item.clone());
        Ok(item)
    }

    async fn delete_expense_item(&self, id: ExpenseItemId) -> Result<(), StoreError> {
        let mut tables = self.write()?;
        if !tables.expense_items.contains_key(&id) {
            return Err(StoreError::NotFound("expense item"));
        }
        if tables.charges.values().any(|c| c.expense_item_id == id) {
            return Err(StoreError::Conflict(format!("expense item {id} is referenced by charges")));
        }
        tables.expense_items.remove(&id);
        Ok(())
    }
}

#[async_trait]
impl ChargeStore for InMemoryStore {
    async fn list_charges(&self) -> Result<Vec<ChargeRecord>, StoreError> {
        let mut charges: Vec<ChargeRecord> = self.read()?.charges.values().cloned().collect();
        charges.sort_by(|a, b| b.charge_date.cmp(&a.charge_date).then(b.id.cmp(&a.id)));
        Ok(charges)
    }

    async fn create_charge(&self, charge: NewCharge, at: DateTime<Utc>) -> Result<ChargeRecord, StoreError> {
        let mut tables = self.write()?;
        if !tables.expense_items.contains_key(&charge.expense_item_id) {
            return Err(StoreError::NotFound("expense item"));
        }
        let record = charge.into_record(ChargeId::new(next(&self.inner.seq.charge)), at);
        tables.charges.insert(record.id(), record.clone());
        Ok(record)
    }

    async fn delete_charge(&self, id: ChargeId) -> Result<(), StoreError> {
        self.write()?
            .charges
            .remove(&id)
            .map(|_| ())
            .ok_or(StoreError::NotFound("charge"))
    }
}

#[async_trait]
impl UserStore for InMemoryStore {
    async fn find_user(&self, username: &str) -> Result<Option<UserAccount>, StoreError> {
        Ok(self.read()?.users.values().find(|u| u.username == username).cloned())
    }

    async fn count_users(&self) -> Result<u64, StoreError> {
        Ok(self.read()?.users.len() as u64)
    }

    async fn list_users(&self) -> Result<Vec<UserAccount>, StoreError> {
        Ok(self.read()?.users.values().cloned().collect())
    }

    async fn delete_all_users(&self) -> Result<u64, StoreError> {
        let mut tables = self.write()?;
        let removed = tables.users.len() as u64;
        tables.users.clear();
        Ok(removed)
    }

    async fn insert_user(&self, username: &str, password_hash: &str, role: Role) -> Result<UserAccount, StoreError> {
        let mut tables = self.write()?;
        if tables.users.values().any(|u| u.username == username) {
            return Err(StoreError::Conflict(format!("username '{username}' is taken")));
        }
        let account = UserAccount {
            id: UserId::new(next(&self.inner.seq.user)),
            username: username.to_string(),
            password_hash: password_hash.to_string(),
            role,
        };
        tables.users.insert(account.id, account.clone());
        Ok(account)
    }
}

#[async_trait]
impl ReportSource for InMemoryStore {
    async fn revenue_between(&self, period: &ReportingPeriod) -> Result<Money, StoreError> {
        Ok(self
            .read()?
            .sales
            .values()
            .filter(|s| period.contains(s.sale_date))
            .map(|s| s.amount)
            .sum())
    }

    async fn expenses_between(&self, period: &ReportingPeriod) -> Result<Money, StoreError> {
        Ok(self
            .read()?
            .charges
            .values()
            .filter(|c| period.contains(c.charge_date))
            .map(|c| c.amount)
            .sum())
    }

    async fn top_items(&self, query: &TopItemsQuery) -> Result<Vec<ItemRevenue>, StoreError> {
        let tables = self.read()?;
        let revenues = tables
            .items
            .values()
            .map(|item| ItemRevenue {
                id: item.id(),
                name: item.name().to_string(),
                revenue: tables
                    .sales
                    .values()
                    .filter(|s| s.item_id == item.id() && query.period.contains(s.sale_date))
                    .map(|s| s.amount)
                    .sum(),
            })
            .collect();
        Ok(rank_items(revenues, query.limit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn draft(name: &str, quantity: i64) -> StockItemDraft {
        StockItemDraft {
            name: name.to_string(),
            quantity,
            amount: Money::new(dec!(2.50)).unwrap(),
        }
    }

    #[tokio::test]
    async fn staged_writes_are_invisible_until_commit() {
        let store = InMemoryStore::default();
        let item = store.create_item(draft("Widget", 5)).await.unwrap();

        let mut uow = store.begin().await.unwrap();
        uow.lock_item(item.id()).await.unwrap();
        uow.adjust_item_quantity(item.id(), -2).await.unwrap();
        assert_eq!(store.get_item(item.id()).await.unwrap().unwrap().quantity(), 5);

        uow.commit().await.unwrap();
        assert_eq!(store.get_item(item.id()).await.unwrap().unwrap().quantity(), 3);
    }

    #[tokio::test]
    async fn dropping_a_unit_of_work_discards_it_and_releases_locks() {
        let store = InMemoryStore::new(Duration::from_millis(100));
        let item = store.create_item(draft("Widget", 5)).await.unwrap();

        {
            let mut uow = store.begin().await.unwrap();
            uow.lock_item(item.id()).await.unwrap();
            uow.adjust_item_quantity(item.id(), -5).await.unwrap();
        }

        let mut uow = store.begin().await.unwrap();
        let locked = uow.lock_item(item.id()).await.unwrap().unwrap();
        assert_eq!(locked.quantity(), 5);
        uow.rollback().await.unwrap();
    }

    #[tokio::test]
    async fn second_locker_times_out_while_row_is_held() {
        let store = InMemoryStore::new(Duration::from_millis(50));
        let item = store.create_item(draft("Widget", 5)).await.unwrap();

        let mut first = store.begin().await.unwrap();
        first.lock_item(item.id()).await.unwrap();

        let mut second = store.begin().await.unwrap();
        assert_eq!(second.lock_item(item.id()).await.unwrap_err(), StoreError::LockTimeout);

        // Re-locking a row already held by the same unit of work does not wait.
        assert!(first.lock_item(item.id()).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn commit_rejects_negative_stock() {
        let store = InMemoryStore::default();
        let item = store.create_item(draft("Widget", 1)).await.unwrap();

        let mut uow = store.begin().await.unwrap();
        uow.adjust_item_quantity(item.id(), -2).await.unwrap();
        assert!(matches!(uow.commit().await, Err(StoreError::Conflict(_))));
        assert_eq!(store.get_item(item.id()).await.unwrap().unwrap().quantity(), 1);
    }

    #[tokio::test]
    async fn referenced_rows_cannot_be_deleted() {
        let store = InMemoryStore::default();
        let item = store.create_item(draft("Widget", 3)).await.unwrap();

        let mut uow = store.begin().await.unwrap();
        uow.insert_sale(NewSale {
            item_id: item.id(),
            quantity: 1,
            amount: item.unit_amount(),
            sale_date: Utc::now(),
        })
        .await
        .unwrap();
        uow.commit().await.unwrap();
        assert!(matches!(store.delete_item(item.id()).await, Err(StoreError::Conflict(_))));

        let rent = store
            .create_expense_item(ExpenseItemDraft { name: "Rent".to_string() })
            .await
            .unwrap();
        store
            .create_charge(
                NewCharge {
                    expense_item_id: rent.id,
                    amount: Money::new(dec!(100)).unwrap(),
                },
                Utc::now(),
            )
            .await
            .unwrap();
        assert!(matches!(store.delete_expense_item(rent.id).await, Err(StoreError::Conflict(_))));
    }

    #[tokio::test]
    async fn charge_requires_existing_expense_item() {
        let store = InMemoryStore::default();
        let err = store
            .create_charge(
                NewCharge {
                    expense_item_id: ExpenseItemId::new(42),
                    amount: Money::ZERO,
                },
                Utc::now(),
            )
            .await
            .unwrap_err();
        assert_eq!(err, StoreError::NotFound("expense item"));
    }

    #[tokio::test]
    async fn row_lock_registry_is_emptied_on_release() {
        let store = InMemoryStore::new(Duration::from_millis(50));
        let item = store.create_item(draft("Widget", 5)).await.unwrap();

        let mut uow = store.begin().await.unwrap();
        uow.lock_item(item.id()).await.unwrap();
        uow.lock_sale(SaleId::new(7)).await.unwrap();
        assert_eq!(store.registered_row_locks(), 2);
        uow.commit().await.unwrap();
        assert_eq!(store.registered_row_locks(), 0);

        let mut uow = store.begin().await.unwrap();
        uow.lock_item(item.id()).await.unwrap();
        uow.rollback().await.unwrap();
        assert_eq!(store.registered_row_locks(), 0);

        {
            let mut uow = store.begin().await.unwrap();
            uow.lock_item(item.id()).await.unwrap();
        }
        assert_eq!(store.registered_row_locks(), 0);

        store.update_item(item.id(), draft("Widget", 9)).await.unwrap();
        assert_eq!(store.registered_row_locks(), 0);
    }

    #[tokio::test]
    async fn timed_out_waiter_leaves_no_registry_entry() {
        let store = InMemoryStore::new(Duration::from_millis(30));
        let item = store.create_item(draft("Widget", 5)).await.unwrap();

        let mut holder = store.begin().await.unwrap();
        holder.lock_item(item.id()).await.unwrap();

        let mut waiter = store.begin().await.unwrap();
        assert_eq!(waiter.lock_item(item.id()).await.unwrap_err(), StoreError::LockTimeout);
        assert_eq!(store.registered_row_locks(), 1);

        holder.rollback().await.unwrap();
        assert_eq!(store.registered_row_locks(), 0);
    }

    #[tokio::test]
    async fn duplicate_usernames_conflict() {
        let store = InMemoryStore::default();
        store.insert_user("admin", "hash", Role::ADMIN).await.unwrap();
        assert!(matches!(
            store.insert_user("admin", "hash", Role::USER).await,
            Err(StoreError::Conflict(_))
        ));
        assert_eq!(store.count_users().await.unwrap(), 1);
    }
}
