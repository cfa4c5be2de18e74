use axum::{
    extract::{Request, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::Response,
};
use chrono::Utc;
use tracing::Instrument;

use stockroom_infra::AuthGate;

use crate::app::errors;
use crate::context::{PrincipalContext, RequestId};

/// Attach a request id, trace the request, and echo the id as `x-request-id`.
pub async fn request_context(mut req: Request, next: Next) -> Response {
    let request_id = RequestId::new();
    req.extensions_mut().insert(request_id);

    let span = tracing::info_span!(
        "http_request",
        request_id = %request_id.as_uuid(),
        method = %req.method(),
        path = %req.uri().path(),
        status = tracing::field::Empty,
    );

    let mut res = next.run(req).instrument(span.clone()).await;
    span.record("status", res.status().as_u16());
    span.in_scope(|| tracing::info!("request completed"));

    if let Ok(value) = HeaderValue::from_str(&request_id.as_uuid().to_string()) {
        res.headers_mut().insert("x-request-id", value);
    }
    res
}

/// Require a valid bearer token and attach the principal it carries.
pub async fn auth_middleware(
    State(auth): State<AuthGate>,
    mut req: Request,
    next: Next,
) -> Result<Response, Response> {
    let token = extract_bearer(req.headers())
        .ok_or_else(|| errors::json_error(StatusCode::UNAUTHORIZED, "unauthorized", "missing bearer token"))?;

    let principal = auth.verify(token, Utc::now()).map_err(|e| {
        tracing::debug!(error = %e, "bearer token rejected");
        errors::json_error(StatusCode::UNAUTHORIZED, "invalid_token", e.to_string())
    })?;

    req.extensions_mut().insert(PrincipalContext::new(principal));

    Ok(next.run(req).await)
}

fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    let header = headers.get(axum::http::header::AUTHORIZATION)?;
    let header = header.to_str().ok()?;
    let token = header.strip_prefix("Bearer ")?.trim();
    if token.is_empty() {
        return None;
    }
    Some(token)
}
