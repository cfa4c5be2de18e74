use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, rejection::JsonRejection},
    http::StatusCode,
    routing::{delete, get},
};
use chrono::Utc;

use stockroom_accounting::NewCharge;
use stockroom_auth::Permission;
use stockroom_core::ChargeId;

use crate::app::errors::{self, ApiResult};
use crate::app::services::AppServices;
use crate::authz;
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_charges).post(create_charge))
        .route("/:id", delete(delete_charge))
}

pub async fn list_charges(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> ApiResult {
    authz::require(&principal, &Permission::CHARGES_READ)?;

    let charges = services
        .charges
        .list_charges()
        .await
        .map_err(errors::store_error_to_response)?;
    Ok(errors::json_ok(StatusCode::OK, charges, None))
}

/// Book a charge dated now. Negative amounts are rejected while decoding.
pub async fn create_charge(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    body: Result<Json<NewCharge>, JsonRejection>,
) -> ApiResult {
    authz::require(&principal, &Permission::CHARGES_WRITE)?;
    let charge = errors::json_body(body)?;

    let charge = services
        .charges
        .create_charge(charge, Utc::now())
        .await
        .map_err(errors::store_error_to_response)?;
    Ok(errors::json_ok(StatusCode::CREATED, charge, Some("Charge created successfully")))
}

pub async fn delete_charge(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult {
    authz::require(&principal, &Permission::CHARGES_WRITE)?;
    let id: ChargeId = errors::parse_id(&id)?;

    services
        .charges
        .delete_charge(id)
        .await
        .map_err(errors::store_error_to_response)?;
    Ok(errors::json_ok(StatusCode::OK, serde_json::Value::Null, Some("Charge deleted successfully")))
}
