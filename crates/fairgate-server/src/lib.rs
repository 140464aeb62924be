//! HTTP gateway in front of the fairgate scheduler.
//!
//! Routes under the configured prefix (default `/api/v1`) pass the gate
//! chain before reaching the enqueue handler. Admin, health and metrics
//! routes are ungated.

pub mod config;
pub mod error;
pub mod middleware;
pub mod routes;
pub mod state;
pub mod telemetry;

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::middleware::from_fn_with_state;
use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

pub use state::{AppState, SharedState};
pub use telemetry::Telemetry;

/// Build the application router.
pub fn app(state: Arc<AppState>) -> Router {
    // Layers wrap outward: the last one added runs first.
    let gated = Router::new()
        .route("/:queue/enqueue", post(routes::enqueue))
        .route_layer(from_fn_with_state(state.clone(), middleware::integrity_gate))
        .route_layer(from_fn_with_state(state.clone(), middleware::idempotency_gate))
        .route_layer(from_fn_with_state(state.clone(), middleware::admission_gate));

    let router = if state.route_prefix.is_empty() {
        Router::new().merge(gated)
    } else {
        Router::new().nest(&state.route_prefix, gated)
    };

    router
        .route("/admin/dequeue", post(routes::dequeue))
        .route("/admin/queues", get(routes::list_queues))
        .route("/health", get(routes::health))
        .route("/metrics", get(routes::metrics))
        .layer(DefaultBodyLimit::max(state.max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
