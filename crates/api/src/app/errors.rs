//! Consistent JSON responses.
//!
//! Every response uses one envelope:
//! - success: `{"success": true, "data": …, "message"?: …}`
//! - failure: `{"success": false, "error": <code>, "message": <text>}`

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{
    Json,
    extract::{
        Query,
        rejection::{JsonRejection, QueryRejection},
    },
};
use serde::Serialize;
use serde_json::json;

use stockroom_auth::CredentialError;
use stockroom_core::DomainError;
use stockroom_infra::store::StoreError;
use stockroom_infra::{AuthError, ReportError};
use stockroom_sales::{FailureCause, SaleError};

/// Handler result: both arms are complete responses.
pub type ApiResult = Result<Response, Response>;

pub fn json_ok<T: Serialize>(status: StatusCode, data: T, message: Option<&str>) -> Response {
    let mut body = json!({
        "success": true,
        "data": data,
    });
    if let Some(message) = message {
        body["message"] = json!(message);
    }
    (status, Json(body)).into_response()
}

pub fn json_error(status: StatusCode, code: &'static str, message: impl Into<String>) -> Response {
    (
        status,
        Json(json!({
            "success": false,
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

pub fn sale_error_to_response(err: SaleError) -> Response {
    match &err {
        SaleError::InvalidQuantity(_) => json_error(StatusCode::BAD_REQUEST, "invalid_quantity", err.to_string()),
        SaleError::NotFound(_) => json_error(StatusCode::NOT_FOUND, "not_found", err.to_string()),
        SaleError::InsufficientStock { .. } => {
            json_error(StatusCode::CONFLICT, "insufficient_stock", err.to_string())
        }
        SaleError::TransactionFailure(FailureCause::LockTimeout) => {
            json_error(StatusCode::SERVICE_UNAVAILABLE, "lock_timeout", err.to_string())
        }
        SaleError::TransactionFailure(FailureCause::Storage(_)) => {
            tracing::error!(error = %err, "sale transaction failed");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "transaction_failed", "transaction failed")
        }
    }
}

pub fn store_error_to_response(err: StoreError) -> Response {
    match err {
        StoreError::NotFound(_) => json_error(StatusCode::NOT_FOUND, "not_found", err.to_string()),
        StoreError::Conflict(msg) => json_error(StatusCode::CONFLICT, "conflict", msg),
        StoreError::LockTimeout => json_error(StatusCode::SERVICE_UNAVAILABLE, "lock_timeout", err.to_string()),
        StoreError::Backend(msg) => {
            tracing::error!(error = %msg, "storage failure");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", "storage failure")
        }
    }
}

pub fn domain_error_to_response(err: DomainError) -> Response {
    match &err {
        DomainError::Validation(msg) | DomainError::InvalidId(msg) => {
            json_error(StatusCode::BAD_REQUEST, "validation_error", msg.clone())
        }
        DomainError::InvariantViolation(msg) => {
            json_error(StatusCode::UNPROCESSABLE_ENTITY, "invariant_violation", msg.clone())
        }
        DomainError::NotFound(_) => json_error(StatusCode::NOT_FOUND, "not_found", err.to_string()),
        DomainError::Conflict(msg) => json_error(StatusCode::CONFLICT, "conflict", msg.clone()),
    }
}

pub fn report_error_to_response(err: ReportError) -> Response {
    match err {
        ReportError::Invalid(e) => domain_error_to_response(e),
        ReportError::Store(e) => store_error_to_response(e),
    }
}

pub fn auth_error_to_response(err: AuthError) -> Response {
    match err {
        AuthError::Credentials(CredentialError::InvalidCredentials) => {
            json_error(StatusCode::UNAUTHORIZED, "invalid_credentials", "invalid username or password")
        }
        AuthError::Credentials(CredentialError::Hashing(msg)) => {
            tracing::error!(error = %msg, "credential check failed");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", "credential check failed")
        }
        AuthError::Token(e) => json_error(StatusCode::UNAUTHORIZED, "invalid_token", e.to_string()),
        AuthError::Store(e) => store_error_to_response(e),
    }
}

/// Unwrap a JSON body, turning extractor rejections into the error envelope.
pub fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, Response> {
    body.map(|Json(v)| v)
        .map_err(|e| json_error(StatusCode::BAD_REQUEST, "invalid_body", e.body_text()))
}

/// Unwrap query parameters, turning extractor rejections into the error envelope.
pub fn query_params<T>(query: Result<Query<T>, QueryRejection>) -> Result<T, Response> {
    query
        .map(|Query(v)| v)
        .map_err(|e| json_error(StatusCode::BAD_REQUEST, "invalid_query", e.body_text()))
}

/// Parse a path id with the domain's id rules (positive integers).
pub fn parse_id<T>(raw: &str) -> Result<T, Response>
where
    T: core::str::FromStr<Err = DomainError>,
{
    raw.parse::<T>().map_err(domain_error_to_response)
}
