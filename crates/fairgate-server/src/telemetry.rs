use std::sync::Arc;

use fairgate_core::Metrics;
use opentelemetry::metrics::MeterProvider;
use opentelemetry_sdk::metrics::SdkMeterProvider;
use prometheus::{Encoder, Registry, TextEncoder};

use crate::error::ServerError;

/// OTel meter provider exporting into a Prometheus registry, plus the
/// instruments created from it.
pub struct Telemetry {
    registry: Registry,
    provider: SdkMeterProvider,
    metrics: Arc<Metrics>,
}

impl Telemetry {
    pub fn new() -> Result<Self, ServerError> {
        let registry = Registry::new();
        let exporter = opentelemetry_prometheus::exporter()
            .with_registry(registry.clone())
            .build()
            .map_err(|e| ServerError::Metrics(e.to_string()))?;
        let provider = SdkMeterProvider::builder().with_reader(exporter).build();
        let metrics = Arc::new(Metrics::from_meter(&provider.meter("fairgate")));

        Ok(Self {
            registry,
            provider,
            metrics,
        })
    }

    pub fn metrics(&self) -> Arc<Metrics> {
        Arc::clone(&self.metrics)
    }

    /// Current values in the Prometheus text exposition format.
    pub fn render(&self) -> Result<String, ServerError> {
        let mut buf = Vec::new();
        TextEncoder::new()
            .encode(&self.registry.gather(), &mut buf)
            .map_err(|e| ServerError::Metrics(e.to_string()))?;
        String::from_utf8(buf).map_err(|e| ServerError::Metrics(e.to_string()))
    }

    pub fn shutdown(&self) {
        if let Err(e) = self.provider.shutdown() {
            tracing::warn!(error = %e, "meter provider shutdown failed");
        }
    }
}
