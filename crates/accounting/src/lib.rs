//! Expense bookkeeping and profit reporting types.
//!
//! Charges are booked against expense categories; reports combine them with
//! sale amounts over a reporting period. Pure domain logic only.

pub mod charge;
pub mod report;

pub use charge::{ChargeRecord, ExpenseItem, ExpenseItemDraft, NewCharge};
pub use report::{ItemRevenue, ProfitReport, ReportingPeriod, TopItemsQuery, rank_items};
