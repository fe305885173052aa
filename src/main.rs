use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use campus_admin_api::app::{app, AppState};
use campus_admin_api::config::config;
use campus_admin_api::database::{DatabaseManager, PgPurgeStore};
use campus_admin_api::is_production;
use campus_admin_api::purge::{validate_graph, DELETION_GRAPH};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present so cargo run picks up DATABASE_URL, CAMPUS_DATABASE, etc.
    let _ = dotenvy::dotenv();

    // Initialize configuration (this loads the config singleton)
    let config = config();

    let default_filter = if config.api.enable_request_logging {
        "info,tower_http=debug"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();

    tracing::info!("Starting Campus Admin API in {:?} mode", config.environment);
    if is_production!() && config.purge.allow_preview {
        tracing::warn!("Purge preview is enabled in production");
    }
    if !config.purge.enabled {
        tracing::warn!("Legacy user purge is disabled; purge endpoints will answer 403");
    }

    validate_graph(&DELETION_GRAPH).context("deletion graph is inconsistent")?;

    let pool = DatabaseManager::connect(&config.database)
        .await
        .context("failed to connect to the campus database")?;
    let store = PgPurgeStore::new(pool).with_query_logging(config.database.enable_query_logging);

    let state = AppState::new(Arc::new(store), config.purge.clone());

    let bind_addr = format!("0.0.0.0:{}", config.api.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;

    tracing::info!("Campus Admin API listening on http://{}", bind_addr);

    axum::serve(listener, app(state)).await.context("server error")?;
    Ok(())
}
