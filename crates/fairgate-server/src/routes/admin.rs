use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use fairgate_core::QueueStats;
use serde_json::{json, Value};
use tracing::warn;

use crate::error::ApiError;
use crate::state::SharedState;

const STATS_CACHE_KEY: &str = "admin:queues";

/// POST /admin/dequeue: one fair-scheduling round.
pub async fn dequeue(State(state): State<SharedState>) -> Result<Response, ApiError> {
    let Some(served) = state.broker.dequeue().await? else {
        return Ok(StatusCode::NO_CONTENT.into_response());
    };

    let item = served.item;
    // Payloads are stored as serialized JSON; anything else is passed through.
    let data = serde_json::from_str::<Value>(&item.payload).unwrap_or(Value::String(item.payload));
    Ok(Json(json!({
        "queue": served.queue,
        "id": item.id,
        "data": data,
        "weight": item.weight,
        "enqueued_at": item.enqueued_at,
    }))
    .into_response())
}

/// GET /admin/queues
pub async fn list_queues(State(state): State<SharedState>) -> Result<Json<Value>, ApiError> {
    match state.stats_cache.get::<Vec<QueueStats>>(STATS_CACHE_KEY).await {
        Ok(Some(queues)) => return Ok(Json(json!({ "queues": queues }))),
        Ok(None) => {}
        Err(e) => warn!(error = %e, "stats cache read failed"),
    }

    let queues = state.broker.stats().await?;
    if let Err(e) = state.stats_cache.put(STATS_CACHE_KEY, &queues).await {
        warn!(error = %e, "stats cache write failed");
    }
    Ok(Json(json!({ "queues": queues })))
}
