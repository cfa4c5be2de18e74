//! User account maintenance against the configured database.
//!
//! ```text
//! stockroom-users check   list accounts (never prints hashes)
//! stockroom-users reset   delete every account, recreate admin/user
//! ```

use std::sync::Arc;

use anyhow::{Context, bail};

use stockroom_api::app::AppServices;
use stockroom_infra::config::StorageBackend;
use stockroom_infra::db;
use stockroom_infra::store::PostgresStore;
use stockroom_infra::{AppConfig, AuthGate};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let command = std::env::args().nth(1).unwrap_or_default();

    let config = AppConfig::load().context("failed to load configuration")?;
    stockroom_observability::init(&config.log.filter, config.log.format);

    if config.storage.backend != StorageBackend::Postgres {
        bail!("user maintenance needs storage.backend = postgres");
    }

    let pool = db::connect(&config.database).await?;
    db::ensure_schema(&pool).await?;
    let store = Arc::new(PostgresStore::new(pool, config.database.lock_timeout()));
    let auth = AppServices::from_backend(store, &config.auth).auth;

    match command.as_str() {
        "check" => check(&auth).await,
        "reset" => reset(&auth).await,
        other => bail!("unknown command '{other}'; expected 'check' or 'reset'"),
    }
}

async fn check(auth: &AuthGate) -> anyhow::Result<()> {
    let users = auth.list_users().await?;
    if users.is_empty() {
        println!("no users found");
        return Ok(());
    }
    for user in &users {
        println!("{:>4}  {:<20} {}", user.id, user.username, user.role);
    }
    println!("{} user(s)", users.len());
    Ok(())
}

async fn reset(auth: &AuthGate) -> anyhow::Result<()> {
    let created = auth.reset_default_users().await?;
    println!("recreated {created} default user(s)");
    Ok(())
}
