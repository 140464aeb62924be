use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use fairgate_core::Store;
use serde_json::json;
use tracing::error;

use crate::state::SharedState;

/// GET /health: liveness plus a store round trip.
pub async fn health(State(state): State<SharedState>) -> impl IntoResponse {
    match state.broker.store().get("health:probe").await {
        Ok(_) => (
            StatusCode::OK,
            Json(json!({
                "status": "healthy",
                "store": "reachable",
                "version": env!("CARGO_PKG_VERSION"),
            })),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "status": "unhealthy",
                "store": "unreachable",
                "error": e.to_string(),
                "version": env!("CARGO_PKG_VERSION"),
            })),
        ),
    }
}

/// GET /metrics: Prometheus text exposition.
pub async fn metrics(State(state): State<SharedState>) -> Response {
    match state.telemetry.render() {
        Ok(text) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            text,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "failed to render metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
