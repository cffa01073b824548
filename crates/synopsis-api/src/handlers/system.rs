//! Liveness and health endpoints.

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;

use crate::AppState;

/// Liveness probe.
pub async fn root() -> &'static str {
    "42"
}

pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let stats = state.service.cache_stats();
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "storage": state.service.backend(),
        "cache": {
            "enabled": state.service.cache_enabled(),
            "hits": stats.hits,
            "misses": stats.misses,
            "errors": stats.errors,
        },
    }))
}
