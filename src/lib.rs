// Library exports for the binary and integration tests
pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;

use std::sync::Arc;

use axum::{routing::get, Router};
use tower_http::trace::TraceLayer;

use config::Config;
use db::{cache::TenantCache, provisioner::PgProvisioner, TenantDbCache};
use middleware::session::SessionSecret;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub tenants: TenantDbCache,
    pub config: Arc<Config>,
}

impl AppState {
    /// Builds the state without touching the database; tenants are provisioned on first request.
    pub fn new(config: Config) -> Self {
        let tenants = TenantCache::new(PgProvisioner::new(&config), config.cache_options());
        Self {
            tenants,
            config: Arc::new(config),
        }
    }
}

pub fn app(state: AppState) -> Router {
    let secret = SessionSecret(state.config.session_jwt_secret.clone());

    Router::new()
        .route("/health", get(routes::health::health_check))
        .route("/metrics", get(routes::metrics::metrics_handler))
        .route(
            "/me",
            get(routes::users::get_current_user).put(routes::users::save_current_user),
        )
        .layer(axum::Extension(secret))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
