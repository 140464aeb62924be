use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use crate::error::ApiError;
use crate::state::SharedState;

#[derive(Debug, Deserialize)]
pub struct EnqueueRequest {
    pub data: Value,
    #[serde(default = "default_weight")]
    pub weight: u32,
}

fn default_weight() -> u32 {
    1
}

/// POST {prefix}/:queue/enqueue
pub async fn enqueue(
    State(state): State<SharedState>,
    Path(queue): Path<String>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let request: EnqueueRequest =
        serde_json::from_slice(&body).map_err(|e| ApiError::InvalidBody(e.to_string()))?;

    let item = state
        .broker
        .enqueue(&queue, request.data.to_string(), request.weight)
        .await?;

    info!(queue = %queue, item_id = %item.id, weight = item.weight, "data queued");
    Ok(Json(json!({ "message": "Data queued" })))
}
