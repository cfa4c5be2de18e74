//! Infrastructure layer: storage backends, the transaction engine, reporting,
//! authentication wiring and configuration.

pub mod auth_gate;
pub mod config;
pub mod db;
pub mod engine;
pub mod reports;
pub mod store;

#[cfg(test)]
mod integration_tests;

pub use auth_gate::{AuthError, AuthGate};
pub use config::AppConfig;
pub use engine::TransactionEngine;
pub use reports::{ReportError, ReportService};
