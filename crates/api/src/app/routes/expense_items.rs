use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, rejection::JsonRejection},
    http::StatusCode,
    routing::{delete, get},
};

use stockroom_accounting::ExpenseItemDraft;
use stockroom_auth::Permission;
use stockroom_core::ExpenseItemId;

use crate::app::errors::{self, ApiResult};
use crate::app::services::AppServices;
use crate::authz;
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_expense_items).post(create_expense_item))
        .route("/:id", delete(delete_expense_item))
}

pub async fn list_expense_items(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> ApiResult {
    authz::require(&principal, &Permission::EXPENSE_ITEMS_READ)?;

    let items = services
        .expense_items
        .list_expense_items()
        .await
        .map_err(errors::store_error_to_response)?;
    Ok(errors::json_ok(StatusCode::OK, items, None))
}

pub async fn create_expense_item(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    body: Result<Json<ExpenseItemDraft>, JsonRejection>,
) -> ApiResult {
    authz::require(&principal, &Permission::EXPENSE_ITEMS_WRITE)?;
    let draft = errors::json_body(body)?;
    draft.validate().map_err(errors::domain_error_to_response)?;

    let item = services
        .expense_items
        .create_expense_item(draft)
        .await
        .map_err(errors::store_error_to_response)?;
    Ok(errors::json_ok(StatusCode::CREATED, item, Some("Expense item created successfully")))
}

pub async fn delete_expense_item(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult {
    authz::require(&principal, &Permission::EXPENSE_ITEMS_WRITE)?;
    let id: ExpenseItemId = errors::parse_id(&id)?;

    services
        .expense_items
        .delete_expense_item(id)
        .await
        .map_err(errors::store_error_to_response)?;
    Ok(errors::json_ok(StatusCode::OK, serde_json::Value::Null, Some("Expense item deleted successfully")))
}
