//! Service wiring: picks the storage backend and builds the process-scoped
//! services shared by all handlers.

use std::sync::Arc;

use chrono::Duration;
use thiserror::Error;

use stockroom_auth::{Argon2Scheme, Hs256TokenService};
use stockroom_infra::config::{AppConfig, AuthConfig, StorageBackend};
use stockroom_infra::db;
use stockroom_infra::store::{
    Backend, ChargeStore, ExpenseItemStore, InMemoryStore, PostgresStore, SaleStore, StockItemStore, StoreError,
};
use stockroom_infra::{AuthError, AuthGate, ReportService, TransactionEngine};

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("storage bootstrap failed: {0}")]
    Store(#[from] StoreError),

    #[error("user seeding failed: {0}")]
    Auth(#[from] AuthError),
}

/// Everything the handlers need, built once at startup.
#[derive(Clone)]
pub struct AppServices {
    pub engine: TransactionEngine,
    pub items: Arc<dyn StockItemStore>,
    pub sales: Arc<dyn SaleStore>,
    pub expense_items: Arc<dyn ExpenseItemStore>,
    pub charges: Arc<dyn ChargeStore>,
    pub reports: ReportService,
    pub auth: AuthGate,
}

impl AppServices {
    /// Wire every service onto one storage backend.
    pub fn from_backend<B: Backend>(backend: Arc<B>, auth: &AuthConfig) -> Self {
        let tokens = Arc::new(Hs256TokenService::new(
            auth.jwt_secret.as_bytes(),
            Duration::hours(auth.token_ttl_hours),
        ));

        Self {
            engine: TransactionEngine::new(backend.clone()),
            items: backend.clone(),
            sales: backend.clone(),
            expense_items: backend.clone(),
            charges: backend.clone(),
            reports: ReportService::new(backend.clone()),
            auth: AuthGate::new(backend, Arc::new(Argon2Scheme::new()), tokens),
        }
    }
}

/// Build services for the configured backend, bootstrapping schema and
/// default users as configured.
pub async fn build_services(config: &AppConfig) -> Result<AppServices, BootstrapError> {
    let lock_timeout = config.database.lock_timeout();

    let services = match config.storage.backend {
        StorageBackend::Memory => {
            tracing::warn!("using in-memory storage; data is lost on restart");
            AppServices::from_backend(Arc::new(InMemoryStore::new(lock_timeout)), &config.auth)
        }
        StorageBackend::Postgres => {
            let pool = db::connect(&config.database).await?;
            db::ensure_schema(&pool).await?;
            AppServices::from_backend(Arc::new(PostgresStore::new(pool, lock_timeout)), &config.auth)
        }
    };

    if config.auth.seed_users {
        services.auth.seed_default_users().await?;
    }

    Ok(services)
}
