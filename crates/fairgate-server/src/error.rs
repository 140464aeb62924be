use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use fairgate_core::{
    BrokerError, ConfigError, DequeueError, EnqueueError, IdempotencyError, IntegrityError,
    StatsError, StoreError,
};
use serde_json::json;
use tracing::error;

/// Failure of a single HTTP request, rendered as `{"error": "..."}`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Enqueue(#[from] EnqueueError),

    #[error(transparent)]
    Dequeue(#[from] DequeueError),

    #[error(transparent)]
    Stats(#[from] StatsError),

    #[error(transparent)]
    Idempotency(#[from] IdempotencyError),

    #[error(transparent)]
    Integrity(#[from] IntegrityError),

    #[error("invalid request body: {0}")]
    InvalidBody(String),

    #[error("request body too large")]
    PayloadTooLarge,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::Enqueue(EnqueueError::Store(e)) => {
                error!(error = %e, "enqueue failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "Failed to process".to_string())
            }
            ApiError::Enqueue(e) => (StatusCode::UNPROCESSABLE_ENTITY, e.to_string()),

            ApiError::Dequeue(DequeueError::Store(e)) | ApiError::Stats(StatsError::Store(e)) => {
                store_failure(e)
            }
            ApiError::Dequeue(DequeueError::Broker(e)) | ApiError::Stats(StatsError::Broker(e)) => {
                broker_failure(e)
            }

            ApiError::Idempotency(IdempotencyError::MissingKey) => {
                (StatusCode::BAD_REQUEST, "Idempotency key required".to_string())
            }
            ApiError::Idempotency(e @ IdempotencyError::InProgress(_)) => {
                (StatusCode::CONFLICT, e.to_string())
            }
            ApiError::Idempotency(IdempotencyError::Store(e)) => store_failure(e),

            ApiError::Integrity(e) => (StatusCode::UNPROCESSABLE_ENTITY, integrity_message(e)),

            ApiError::InvalidBody(_) => (StatusCode::UNPROCESSABLE_ENTITY, self.to_string()),
            ApiError::PayloadTooLarge => (StatusCode::PAYLOAD_TOO_LARGE, self.to_string()),
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

fn store_failure(e: &StoreError) -> (StatusCode, String) {
    error!(error = %e, "store operation failed");
    (StatusCode::INTERNAL_SERVER_ERROR, "Failed to process".to_string())
}

fn broker_failure(e: &BrokerError) -> (StatusCode, String) {
    match e {
        BrokerError::ChannelFull => (
            StatusCode::SERVICE_UNAVAILABLE,
            "scheduler overloaded".to_string(),
        ),
        BrokerError::ChannelDisconnected => (
            StatusCode::SERVICE_UNAVAILABLE,
            "scheduler unavailable".to_string(),
        ),
        BrokerError::SchedulerPanicked => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "scheduler panicked".to_string(),
        ),
    }
}

fn integrity_message(e: &IntegrityError) -> String {
    match e {
        IntegrityError::MissingChecksum => "Integrity check failed: checksum header required",
        IntegrityError::MalformedBody(_) => "Integrity check failed: body is not valid JSON",
        IntegrityError::Mismatch { .. } => "Integrity check failed: checksum mismatch",
    }
    .to_string()
}

/// Startup failures of the server binary.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("failed to read {path}: {source}")]
    ConfigRead {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    ConfigParse {
        path: String,
        source: toml::de::Error,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("metrics exporter setup failed: {0}")]
    Metrics(String),

    #[error("store backend {0:?} is not compiled into this binary")]
    BackendUnavailable(&'static str),
}
