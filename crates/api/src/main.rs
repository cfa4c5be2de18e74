use std::sync::Arc;

use anyhow::Context;

use stockroom_api::app::{build_app, services::build_services};
use stockroom_infra::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load().context("failed to load configuration")?;
    stockroom_observability::init(&config.log.filter, config.log.format);

    if config.uses_dev_secret() {
        tracing::warn!("auth.jwt_secret not set; using insecure dev default");
    }

    let services = build_services(&config)
        .await
        .context("failed to initialize services")?;
    let app = build_app(Arc::new(services));

    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    tracing::info!(addr = %listener.local_addr()?, backend = ?config.storage.backend, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    tracing::info!("shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
    }
}
