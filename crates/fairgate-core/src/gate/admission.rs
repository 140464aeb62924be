use std::sync::Arc;

use tracing::{info, warn};

use crate::broker::config::AdmissionConfig;
use crate::broker::metrics::Metrics;
use crate::store::{keys, Store};

/// Result of a backpressure check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Accept,
    /// The queue is over its threshold; the request must not be enqueued.
    Defer { depth: u64 },
}

/// Backpressure gate: defers new work for a queue whose depth exceeds the
/// configured threshold.
///
/// Fails open. When the depth cannot be read the queue is treated as empty
/// and the request is accepted, so a store outage does not wedge intake.
/// Every fail-open decision is logged at `warn` and counted in
/// `fairgate.admission.fail_open`.
pub struct AdmissionController {
    store: Arc<dyn Store>,
    threshold: u64,
    metrics: Arc<Metrics>,
}

impl AdmissionController {
    pub fn new(store: Arc<dyn Store>, config: &AdmissionConfig, metrics: Arc<Metrics>) -> Self {
        Self {
            store,
            threshold: config.threshold,
            metrics,
        }
    }

    /// Names that could never be enqueued are admitted untouched: the
    /// enqueue handler rejects them, and they never reach the store or a
    /// metric label.
    pub async fn check(&self, queue: &str) -> Admission {
        if keys::validate_queue_name(queue).is_err() {
            return Admission::Accept;
        }

        let depth = match self.store.len(&keys::queue_key(queue)).await {
            Ok(depth) => depth,
            Err(e) => {
                warn!(
                    queue,
                    error = %e,
                    event = "backpressure.fail_open",
                    "queue depth unavailable, admitting request"
                );
                self.metrics.record_fail_open(queue);
                0
            }
        };

        if depth > self.threshold {
            info!(
                queue,
                depth,
                threshold = self.threshold,
                event = "backpressure.deferred",
                "request deferred"
            );
            self.metrics.record_deferred(queue);
            return Admission::Defer { depth };
        }
        Admission::Accept
    }
}

/// Queue name addressed by a request path: the first segment after
/// `prefix`. `/api/v1/agromo/enqueue` with prefix `/api/v1` gives `agromo`.
pub fn queue_name_from_path<'a>(path: &'a str, prefix: &str) -> Option<&'a str> {
    let rest = path.strip_prefix(prefix.trim_end_matches('/'))?;
    let rest = rest.strip_prefix('/')?;
    rest.split('/').next().filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::testing::FaultyStore;
    use crate::store::MemoryStore;

    fn controller(store: Arc<dyn Store>, threshold: u64) -> AdmissionController {
        AdmissionController::new(store, &AdmissionConfig { threshold }, Arc::new(Metrics::new()))
    }

    async fn fill(store: &dyn Store, queue: &str, n: usize) {
        for i in 0..n {
            store
                .push_back(&keys::queue_key(queue), &i.to_string())
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn depth_over_threshold_defers() {
        let store = Arc::new(MemoryStore::new());
        fill(store.as_ref(), "agromo", 101).await;
        let gate = controller(store, 100);
        assert_eq!(gate.check("agromo").await, Admission::Defer { depth: 101 });
    }

    #[tokio::test]
    async fn depth_at_threshold_accepts() {
        let store = Arc::new(MemoryStore::new());
        fill(store.as_ref(), "agromo", 100).await;
        let gate = controller(store, 100);
        assert_eq!(gate.check("agromo").await, Admission::Accept);
    }

    #[tokio::test]
    async fn unknown_queue_accepts() {
        let gate = controller(Arc::new(MemoryStore::new()), 100);
        assert_eq!(gate.check("never-seen").await, Admission::Accept);
    }

    #[tokio::test]
    async fn store_outage_fails_open() {
        let store = Arc::new(FaultyStore::new());
        fill(store.as_ref(), "agromo", 5).await;
        store.fail(&["len"]);
        let gate = controller(store.clone(), 1);
        assert_eq!(gate.check("agromo").await, Admission::Accept);

        store.heal();
        assert_eq!(gate.check("agromo").await, Admission::Defer { depth: 5 });
    }

    #[tokio::test]
    async fn invalid_queue_name_skips_depth_check() {
        let store = Arc::new(FaultyStore::new());
        fill(store.as_ref(), "a:b", 5).await;
        let gate = controller(store.clone(), 1);
        assert_eq!(gate.check("a:b").await, Admission::Accept);

        store.fail(&["len"]);
        let long = "x".repeat(200);
        assert_eq!(gate.check(&long).await, Admission::Accept);
    }

    #[test]
    fn queue_name_is_first_segment_after_prefix() {
        assert_eq!(
            queue_name_from_path("/api/v1/agromo/enqueue", "/api/v1"),
            Some("agromo")
        );
        assert_eq!(queue_name_from_path("/api/v1/agromo", "/api/v1/"), Some("agromo"));
        assert_eq!(queue_name_from_path("/api/v1/", "/api/v1"), None);
        assert_eq!(queue_name_from_path("/api/v10/x", "/api/v1"), None);
        assert_eq!(queue_name_from_path("/health", "/api/v1"), None);
    }
}
