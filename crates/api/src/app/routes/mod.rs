use axum::{Router, routing::get};

pub mod auth;
pub mod charges;
pub mod expense_items;
pub mod reports;
pub mod sales;
pub mod system;
pub mod warehouses;

/// Router for all authenticated endpoints.
pub fn router() -> Router {
    Router::new()
        .route("/auth/profile", get(auth::profile))
        .nest("/warehouses", warehouses::router())
        .nest("/sales", sales::router())
        .nest("/charges", charges::router())
        .nest("/expense-items", expense_items::router())
        .nest("/reports", reports::router())
}
