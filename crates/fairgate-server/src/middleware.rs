//! The gate chain in front of the enqueue routes. Layered so requests pass
//! admission, then idempotency, then integrity, then reach the handler.

use axum::body::{self, Body};
use axum::extract::{OriginalUri, Request, State};
use axum::http::{HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use fairgate_core::gate::{
    integrity, queue_name_from_path, Admission, IdempotencyOutcome, StoredResponse,
};
use serde_json::{json, Value};
use tracing::warn;

use crate::error::ApiError;
use crate::state::SharedState;

pub const IDEMPOTENCY_KEY_HEADER: &str = "x-idempotency-key";
pub const CHECKSUM_HEADER: &str = "x-checksum";
/// Set on responses replayed from an idempotency record.
pub const REPLAYED_HEADER: &str = "x-idempotent-replay";

pub async fn admission_gate(
    State(state): State<SharedState>,
    OriginalUri(uri): OriginalUri,
    req: Request,
    next: Next,
) -> Response {
    if let Some(queue) = queue_name_from_path(uri.path(), &state.route_prefix) {
        if let Admission::Defer { .. } = state.admission.check(queue).await {
            return (
                StatusCode::ACCEPTED,
                Json(json!({ "message": "Request queued due to high load" })),
            )
                .into_response();
        }
    }
    next.run(req).await
}

pub async fn idempotency_gate(
    State(state): State<SharedState>,
    req: Request,
    next: Next,
) -> Response {
    let key = req
        .headers()
        .get(IDEMPOTENCY_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let outcome = state
        .idempotency
        .admit(key.as_deref(), move || async move {
            capture(next.run(req).await).await
        })
        .await;

    match outcome {
        Ok(IdempotencyOutcome::Executed(stored)) => restore(stored),
        Ok(IdempotencyOutcome::Replayed(stored)) => {
            let mut response = restore(stored);
            response
                .headers_mut()
                .insert(REPLAYED_HEADER, HeaderValue::from_static("true"));
            response
        }
        Err(e) => ApiError::from(e).into_response(),
    }
}

pub async fn integrity_gate(
    State(state): State<SharedState>,
    req: Request,
    next: Next,
) -> Response {
    let (parts, body) = req.into_parts();
    let bytes = match body::to_bytes(body, state.max_body_bytes).await {
        Ok(bytes) => bytes,
        Err(_) => return ApiError::PayloadTooLarge.into_response(),
    };
    let supplied = parts
        .headers
        .get(CHECKSUM_HEADER)
        .and_then(|v| v.to_str().ok());

    if let Err(e) = integrity::verify(&bytes, supplied) {
        warn!(path = %parts.uri.path(), event = e.event(), error = %e, "integrity check failed");
        state.broker.metrics().record_integrity_failure(e.event());
        return ApiError::from(e).into_response();
    }

    next.run(Request::from_parts(parts, Body::from(bytes))).await
}

/// Buffer a handler response into the form the idempotency filter stores.
async fn capture(response: Response) -> StoredResponse {
    let status = response.status().as_u16();
    match body::to_bytes(response.into_body(), usize::MAX).await {
        Ok(bytes) if bytes.is_empty() => StoredResponse::new(status, Value::Null),
        Ok(bytes) => {
            let body = serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));
            StoredResponse::new(status, body)
        }
        Err(e) => {
            warn!(error = %e, "failed to buffer handler response");
            StoredResponse::new(500, json!({ "error": "Failed to process" }))
        }
    }
}

fn restore(stored: StoredResponse) -> Response {
    let status = StatusCode::from_u16(stored.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if stored.body.is_null() {
        status.into_response()
    } else {
        (status, Json(stored.body)).into_response()
    }
}
