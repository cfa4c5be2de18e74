//! Sales domain module.
//!
//! Sale records, the sale error taxonomy, and the pure decision logic used by
//! the transaction engine when it creates or reverses a sale. No IO lives here:
//! the engine reads a locked stock item, asks this crate what to write, and
//! writes it.

pub mod error;
pub mod plan;
pub mod sale;

pub use error::{FailureCause, SaleError};
pub use plan::{StockReversal, plan_reversal, plan_sale};
pub use sale::{NewSale, SaleRecord, SaleRequest};
