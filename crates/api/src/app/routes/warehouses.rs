//! Stock item administration. Items are called "warehouses" on the wire.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, rejection::JsonRejection},
    http::StatusCode,
    routing::get,
};

use stockroom_auth::Permission;
use stockroom_core::{DomainError, ItemId};
use stockroom_inventory::StockItemDraft;

use crate::app::errors::{self, ApiResult};
use crate::app::services::AppServices;
use crate::authz;
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_items).post(create_item))
        .route("/:id", get(get_item).put(update_item).delete(delete_item))
}

pub async fn list_items(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> ApiResult {
    authz::require(&principal, &Permission::ITEMS_READ)?;

    let items = services
        .items
        .list_items()
        .await
        .map_err(errors::store_error_to_response)?;
    Ok(errors::json_ok(StatusCode::OK, items, None))
}

pub async fn get_item(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult {
    authz::require(&principal, &Permission::ITEMS_READ)?;
    let id: ItemId = errors::parse_id(&id)?;

    let item = services
        .items
        .get_item(id)
        .await
        .map_err(errors::store_error_to_response)?
        .ok_or_else(|| errors::domain_error_to_response(DomainError::not_found("warehouse")))?;
    Ok(errors::json_ok(StatusCode::OK, item, None))
}

pub async fn create_item(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    body: Result<Json<StockItemDraft>, JsonRejection>,
) -> ApiResult {
    authz::require(&principal, &Permission::ITEMS_WRITE)?;
    let draft = errors::json_body(body)?;
    draft.validate().map_err(errors::domain_error_to_response)?;

    let item = services
        .items
        .create_item(draft)
        .await
        .map_err(errors::store_error_to_response)?;
    Ok(errors::json_ok(StatusCode::CREATED, item, Some("Warehouse created successfully")))
}

pub async fn update_item(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    body: Result<Json<StockItemDraft>, JsonRejection>,
) -> ApiResult {
    authz::require(&principal, &Permission::ITEMS_WRITE)?;
    let id: ItemId = errors::parse_id(&id)?;
    let draft = errors::json_body(body)?;
    draft.validate().map_err(errors::domain_error_to_response)?;

    let item = services
        .items
        .update_item(id, draft)
        .await
        .map_err(errors::store_error_to_response)?;
    Ok(errors::json_ok(StatusCode::OK, item, Some("Warehouse updated successfully")))
}

pub async fn delete_item(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult {
    authz::require(&principal, &Permission::ITEMS_WRITE)?;
    let id: ItemId = errors::parse_id(&id)?;

    services
        .items
        .delete_item(id)
        .await
        .map_err(errors::store_error_to_response)?;
    Ok(errors::json_ok(StatusCode::OK, serde_json::Value::Null, Some("Warehouse deleted successfully")))
}
