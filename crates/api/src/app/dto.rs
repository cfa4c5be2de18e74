use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockroom_accounting::ProfitReport;
use stockroom_auth::{Principal, Role};
use stockroom_core::ItemId;

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateSaleRequest {
    pub warehouse_id: ItemId,
    pub quantity: i64,
}

#[derive(Debug, Deserialize)]
pub struct ProfitQuery {
    pub month: u32,
    pub year: i32,
}

#[derive(Debug, Deserialize)]
pub struct TopItemsParams {
    pub start_date: String,
    pub end_date: String,
    pub limit: Option<usize>,
}

// Stock item, expense item and charge payloads deserialize straight into
// the domain drafts (`StockItemDraft`, `ExpenseItemDraft`, `NewCharge`).

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Serialize)]
pub struct UserView {
    pub username: String,
    pub role: Role,
}

impl From<Principal> for UserView {
    fn from(p: Principal) -> Self {
        Self {
            username: p.username,
            role: p.role,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub user: UserView,
}

#[derive(Debug, Serialize)]
pub struct ProfitResponse {
    pub month: u32,
    pub year: i32,
    #[serde(flatten)]
    pub report: ProfitReport,
}
