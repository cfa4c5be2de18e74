use std::sync::Arc;

use axum::{
    Json,
    extract::{Extension, rejection::JsonRejection},
    http::StatusCode,
    response::Response,
};
use chrono::Utc;

use crate::app::dto::{LoginRequest, LoginResponse, UserView};
use crate::app::errors::{self, ApiResult};
use crate::app::services::AppServices;
use crate::context::PrincipalContext;

pub async fn login(
    Extension(services): Extension<Arc<AppServices>>,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> ApiResult {
    let body = errors::json_body(body)?;

    let (issued, principal) = services
        .auth
        .authenticate(&body.username, &body.password, Utc::now())
        .await
        .map_err(errors::auth_error_to_response)?;

    let response = LoginResponse {
        token: issued.token,
        expires_at: issued.expires_at,
        user: principal.into(),
    };
    Ok(errors::json_ok(StatusCode::OK, response, Some("Login successful")))
}

/// Identity carried by the caller's token.
pub async fn profile(Extension(principal): Extension<PrincipalContext>) -> Response {
    let user: UserView = principal.principal().clone().into();
    errors::json_ok(StatusCode::OK, user, None)
}
