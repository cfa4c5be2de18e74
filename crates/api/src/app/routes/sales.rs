use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, rejection::JsonRejection},
    http::StatusCode,
    routing::{delete, get},
};

use stockroom_auth::Permission;
use stockroom_core::SaleId;

use crate::app::dto::CreateSaleRequest;
use crate::app::errors::{self, ApiResult};
use crate::app::services::AppServices;
use crate::authz;
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_sales).post(create_sale))
        .route("/:id", delete(delete_sale))
}

pub async fn list_sales(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> ApiResult {
    authz::require(&principal, &Permission::SALES_READ)?;

    let sales = services
        .sales
        .list_sales()
        .await
        .map_err(errors::store_error_to_response)?;
    Ok(errors::json_ok(StatusCode::OK, sales, None))
}

pub async fn create_sale(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    body: Result<Json<CreateSaleRequest>, JsonRejection>,
) -> ApiResult {
    authz::require(&principal, &Permission::SALES_CREATE)?;
    let body = errors::json_body(body)?;

    let sale = services
        .engine
        .create_sale(body.warehouse_id, body.quantity)
        .await
        .map_err(errors::sale_error_to_response)?;

    tracing::info!(username = %principal.username(), sale_id = %sale.id, "sale recorded");
    Ok(errors::json_ok(StatusCode::CREATED, sale, Some("Sale created successfully")))
}

pub async fn delete_sale(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult {
    authz::require(&principal, &Permission::SALES_DELETE)?;
    let id: SaleId = errors::parse_id(&id)?;

    services
        .engine
        .delete_sale(id)
        .await
        .map_err(errors::sale_error_to_response)?;

    tracing::info!(username = %principal.username(), sale_id = %id, "sale reversed");
    Ok(errors::json_ok(StatusCode::OK, serde_json::Value::Null, Some("Sale deleted successfully")))
}
