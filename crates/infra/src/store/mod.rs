//! Storage boundary: the stock and sale ledgers plus the administrative
//! tables, with in-memory and Postgres implementations.

pub mod in_memory;
pub mod postgres;
pub mod r#trait;

pub use in_memory::InMemoryStore;
pub use postgres::PostgresStore;
pub use r#trait::{
    Backend, ChargeStore, ExpenseItemStore, LedgerStore, ReportSource, SaleStore, StockItemStore, StoreError,
    UnitOfWork, UserStore,
};
