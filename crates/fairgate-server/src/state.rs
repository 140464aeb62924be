use std::sync::Arc;
use std::time::Duration;

use fairgate_core::gate::{AdmissionController, IdempotencyFilter};
use fairgate_core::{Broker, FairgateConfig, ResponseCache, Store};

use crate::telemetry::Telemetry;

/// Shared state behind every handler and gate.
pub struct AppState {
    pub broker: Broker,
    pub admission: AdmissionController,
    pub idempotency: IdempotencyFilter,
    pub stats_cache: ResponseCache,
    pub telemetry: Telemetry,
    pub route_prefix: String,
    pub max_body_bytes: usize,
}

impl AppState {
    /// Must be called inside a tokio runtime; spawns the scheduler task.
    pub fn new(config: &FairgateConfig, store: Arc<dyn Store>, telemetry: Telemetry) -> Self {
        let metrics = telemetry.metrics();
        Self {
            broker: Broker::new(config, store.clone(), metrics.clone()),
            admission: AdmissionController::new(store.clone(), &config.admission, metrics.clone()),
            idempotency: IdempotencyFilter::new(store.clone(), &config.idempotency, metrics),
            stats_cache: ResponseCache::new(store, Duration::from_secs(config.cache.stats_ttl_secs)),
            telemetry,
            route_prefix: config.server.route_prefix.trim_end_matches('/').to_string(),
            max_body_bytes: config.server.max_body_bytes,
        }
    }
}

pub type SharedState = Arc<AppState>;
