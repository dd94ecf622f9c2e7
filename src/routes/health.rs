use axum::{extract::State, http::StatusCode, Json};
use serde_json::{json, Value};

use crate::AppState;

pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let tenants = state.tenants.len();
    match state.tenants.provisioner().ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({ "status": "ok", "db": "connected", "tenants_cached": tenants })),
        ),
        Err(e) => {
            tracing::warn!("Health check failed: {e}");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "error", "db": "unreachable", "tenants_cached": tenants })),
            )
        }
    }
}
