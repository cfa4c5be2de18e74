use std::sync::Arc;

use axum::{
    Router,
    extract::{Extension, Query, rejection::QueryRejection},
    http::StatusCode,
    routing::get,
};

use stockroom_auth::Permission;

use crate::app::dto::{ProfitQuery, ProfitResponse, TopItemsParams};
use crate::app::errors::{self, ApiResult};
use crate::app::services::AppServices;
use crate::authz;
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/profit", get(profit))
        .route("/top-items", get(top_items))
}

pub async fn profit(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    query: Result<Query<ProfitQuery>, QueryRejection>,
) -> ApiResult {
    authz::require(&principal, &Permission::REPORTS_READ)?;
    let query = errors::query_params(query)?;

    let report = services
        .reports
        .profit_for_period(query.month, query.year)
        .await
        .map_err(errors::report_error_to_response)?;

    let response = ProfitResponse {
        month: query.month,
        year: query.year,
        report,
    };
    Ok(errors::json_ok(StatusCode::OK, response, None))
}

pub async fn top_items(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    query: Result<Query<TopItemsParams>, QueryRejection>,
) -> ApiResult {
    authz::require(&principal, &Permission::REPORTS_READ)?;
    let query = errors::query_params(query)?;

    let items = services
        .reports
        .top_items(&query.start_date, &query.end_date, query.limit)
        .await
        .map_err(errors::report_error_to_response)?;
    Ok(errors::json_ok(StatusCode::OK, items, None))
}
