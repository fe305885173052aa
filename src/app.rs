use std::sync::Arc;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{delete, get},
    Router,
};
use serde_json::{json, Value};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::config::PurgeConfig;
use crate::database::store::PurgeStore;
use crate::handlers::elevated::root::legacy_user;
use crate::purge::LegacyUserPurger;

/// Shared by every handler
#[derive(Clone)]
pub struct AppState {
    pub purger: Arc<LegacyUserPurger>,
    pub store: Arc<dyn PurgeStore>,
    pub purge: PurgeConfig,
}

impl AppState {
    pub fn new(store: Arc<dyn PurgeStore>, purge: PurgeConfig) -> Self {
        let purger = LegacyUserPurger::new(Arc::clone(&store)).with_timeout(purge.timeout());
        Self {
            purger: Arc::new(purger),
            store,
            purge,
        }
    }
}

pub fn app(state: AppState) -> Router {
    Router::new()
        // Public
        .route("/", get(root))
        .route("/health", get(health))
        // Root administrative operations
        .merge(legacy_user_routes())
        // Global middleware
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn legacy_user_routes() -> Router<AppState> {
    Router::new()
        .route("/api/root/legacy-user/:id", delete(legacy_user::legacy_user_delete))
        .route("/api/root/legacy-user/:id/preview", get(legacy_user::legacy_user_preview))
}

async fn root() -> Json<Value> {
    let version = env!("CARGO_PKG_VERSION");

    Json(json!({
        "success": true,
        "data": {
            "name": "Campus Admin API",
            "version": version,
            "endpoints": {
                "health": "/health (public)",
                "legacy_user": "DELETE /api/root/legacy-user/:id (restricted)",
                "legacy_user_preview": "GET /api/root/legacy-user/:id/preview (restricted)",
            }
        }
    }))
}

async fn health(
    axum::extract::State(state): axum::extract::State<AppState>,
) -> impl IntoResponse {
    let now = chrono::Utc::now();

    match state.store.ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "data": {
                    "status": "ok",
                    "timestamp": now,
                    "database": "ok",
                    "purge_enabled": state.purge.enabled
                }
            })),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "success": false,
                "error": "database unavailable",
                "data": {
                    "status": "degraded",
                    "timestamp": now,
                    "database_error": e.to_string()
                }
            })),
        ),
    }
}
