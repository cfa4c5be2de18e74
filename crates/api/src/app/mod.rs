//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: storage backend selection and shared services
//! - `routes/`: HTTP routes + handlers (one file per resource)
//! - `dto.rs`: request/response DTOs
//! - `errors.rs`: the response envelope and error → status mapping

use std::sync::Arc;

use axum::{
    Extension, Router,
    routing::{get, post},
};
use tower::ServiceBuilder;

use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

/// Build the full HTTP router (public entrypoint used by `main.rs`).
///
/// Everything lives under `/api/v1`; only `/health` and `/auth/login` are
/// reachable without a bearer token.
pub fn build_app(services: Arc<AppServices>) -> Router {
    // Protected routes: require a valid bearer token.
    let protected = routes::router().route_layer(axum::middleware::from_fn_with_state(
        services.auth.clone(),
        middleware::auth_middleware,
    ));

    let api = Router::new()
        .route("/health", get(routes::system::health))
        .route("/auth/login", post(routes::auth::login))
        .merge(protected)
        .layer(Extension(services));

    Router::new()
        .nest("/api/v1", api)
        .fallback(routes::system::not_found)
        .layer(ServiceBuilder::new().layer(axum::middleware::from_fn(middleware::request_context)))
}

pub use services::AppServices;
