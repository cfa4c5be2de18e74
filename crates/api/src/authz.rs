//! API-side authorization guard.
//!
//! Enforced at the handler boundary (before the engine or a store is called),
//! keeping domain crates and infra auth-agnostic.

use axum::http::StatusCode;
use axum::response::Response;

use stockroom_auth::{Permission, authorize};

use crate::app::errors;
use crate::context::PrincipalContext;

/// Check that the current principal holds `required`, or produce a 403.
pub fn require(principal: &PrincipalContext, required: &Permission) -> Result<(), Response> {
    authorize(principal.principal(), required).map_err(|e| {
        tracing::info!(username = %principal.username(), permission = %required, "authorization denied");
        errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string())
    })
}
