use axum::http::StatusCode;
use axum::response::Response;
use serde_json::json;

use crate::app::errors;

pub async fn health() -> Response {
    errors::json_ok(StatusCode::OK, json!({ "status": "ok" }), None)
}

pub async fn not_found() -> Response {
    errors::json_error(StatusCode::NOT_FOUND, "not_found", "route not found")
}
