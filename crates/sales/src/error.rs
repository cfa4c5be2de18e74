use thiserror::Error;

use stockroom_core::ItemId;

/// Why a unit of work could not be committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureCause {
    /// The exclusive row lock was not granted within the configured bound.
    LockTimeout,
    /// The storage layer failed to begin, write, commit or roll back.
    Storage(String),
}

impl core::fmt::Display for FailureCause {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            FailureCause::LockTimeout => f.write_str("lock wait timed out"),
            FailureCause::Storage(msg) => f.write_str(msg),
        }
    }
}

/// Failure of a sale creation or reversal.
///
/// Every variant is terminal for the call that produced it, and every variant
/// guarantees that neither ledger was changed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SaleError {
    #[error("quantity must be a positive integer (got {0})")]
    InvalidQuantity(i64),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("insufficient stock for item {item_id}: requested {requested}, available {available}")]
    InsufficientStock {
        item_id: ItemId,
        requested: i64,
        available: i64,
    },

    #[error("transaction failed: {0}")]
    TransactionFailure(FailureCause),
}

impl SaleError {
    pub fn item_not_found() -> Self {
        Self::NotFound("stock item")
    }

    pub fn sale_not_found() -> Self {
        Self::NotFound("sale")
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self::TransactionFailure(FailureCause::Storage(msg.into()))
    }

    /// Only storage faults may be retried with the same input.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SaleError::TransactionFailure(_))
    }

    /// Client-input errors (as opposed to server-side faults).
    pub fn is_client_error(&self) -> bool {
        !self.is_retryable()
    }
}
