use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, warn};

use crate::broker::config::IdempotencyConfig;
use crate::broker::metrics::Metrics;
use crate::error::{IdempotencyError, StoreError};
use crate::store::{keys, Store};

/// A response as remembered by the filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredResponse {
    pub status: u16,
    pub body: Value,
}

impl StoredResponse {
    pub fn new(status: u16, body: Value) -> Self {
        Self { status, body }
    }

    pub fn is_success(&self) -> bool {
        self.status == 200
    }
}

/// What the filter did with a request.
#[derive(Debug, Clone, PartialEq)]
pub enum IdempotencyOutcome {
    /// The handler ran; this is its response.
    Executed(StoredResponse),
    /// A previous response for the key was returned without running the handler.
    Replayed(StoredResponse),
}

/// Value stored under `idempotency:{key}`.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
enum IdempotencyRecord {
    /// Reserved by a request whose handler has not finished.
    Pending,
    Completed { response: StoredResponse },
}

/// Duplicate suppression keyed by a caller-supplied idempotency key.
///
/// A fresh key is reserved atomically with `set_if_absent` before the
/// handler runs, so concurrent duplicates cannot both execute: the loser
/// sees the reservation and gets [`IdempotencyError::InProgress`]. A 200
/// response replaces the reservation and is replayed for the rest of the
/// TTL. Any other response releases the key so the caller may retry.
///
/// A reservation orphaned by a crashed or cancelled request blocks the key
/// until `pending_ttl` runs out.
pub struct IdempotencyFilter {
    store: Arc<dyn Store>,
    ttl: Duration,
    pending_ttl: Duration,
    metrics: Arc<Metrics>,
}

impl IdempotencyFilter {
    pub fn new(store: Arc<dyn Store>, config: &IdempotencyConfig, metrics: Arc<Metrics>) -> Self {
        Self {
            store,
            ttl: Duration::from_secs(config.ttl_secs),
            pending_ttl: Duration::from_secs(config.pending_ttl_secs),
            metrics,
        }
    }

    /// Run `handler` at most once per key within the TTL window.
    ///
    /// Lookup failures are returned as errors rather than treated as a
    /// miss, since guessing "absent" could execute the handler twice.
    pub async fn admit<F, Fut>(
        &self,
        key: Option<&str>,
        handler: F,
    ) -> Result<IdempotencyOutcome, IdempotencyError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = StoredResponse>,
    {
        let key = key
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or(IdempotencyError::MissingKey)?;
        let store_key = keys::idempotency_key(key);

        if let Some(replayed) = self.lookup(key, &store_key).await? {
            return Ok(IdempotencyOutcome::Replayed(replayed));
        }

        let pending = encode(&IdempotencyRecord::Pending)?;
        if !self
            .store
            .set_if_absent(&store_key, &pending, self.pending_ttl)
            .await?
        {
            // Lost the reservation race; the winner may have finished already.
            return match self.lookup(key, &store_key).await? {
                Some(replayed) => Ok(IdempotencyOutcome::Replayed(replayed)),
                None => Err(IdempotencyError::InProgress(key.to_string())),
            };
        }

        let response = handler().await;

        if response.is_success() {
            let record = encode(&IdempotencyRecord::Completed {
                response: response.clone(),
            })?;
            if let Err(e) = self.store.set_with_ttl(&store_key, &record, self.ttl).await {
                error!(
                    idempotency_key = key,
                    error = %e,
                    "failed to store response, a retry will execute again"
                );
            }
        } else if let Err(e) = self.store.delete(&store_key).await {
            warn!(
                idempotency_key = key,
                error = %e,
                "failed to release reservation, key blocked until it expires"
            );
        }

        Ok(IdempotencyOutcome::Executed(response))
    }

    /// `Some(response)` for a completed record, `InProgress` for a pending
    /// one, `None` when the key is unused.
    async fn lookup(
        &self,
        key: &str,
        store_key: &str,
    ) -> Result<Option<StoredResponse>, IdempotencyError> {
        let Some(raw) = self.store.get(store_key).await? else {
            return Ok(None);
        };
        let record: IdempotencyRecord = serde_json::from_str(&raw).map_err(StoreError::from)?;
        match record {
            IdempotencyRecord::Pending => Err(IdempotencyError::InProgress(key.to_string())),
            IdempotencyRecord::Completed { response } => {
                debug!(idempotency_key = key, "replaying stored response");
                self.metrics.record_replay();
                Ok(Some(StoredResponse::new(200, response.body)))
            }
        }
    }
}

fn encode(record: &IdempotencyRecord) -> Result<String, IdempotencyError> {
    Ok(serde_json::to_string(record).map_err(StoreError::from)?)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use serde_json::json;

    use super::*;
    use crate::store::testing::FaultyStore;
    use crate::store::MemoryStore;

    fn filter(store: Arc<dyn Store>) -> IdempotencyFilter {
        IdempotencyFilter::new(store, &IdempotencyConfig::default(), Arc::new(Metrics::new()))
    }

    fn ok(body: Value) -> StoredResponse {
        StoredResponse::new(200, body)
    }

    #[tokio::test]
    async fn second_call_replays_without_running_handler() {
        let filter = filter(Arc::new(MemoryStore::new()));
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let handler = move || async move {
            let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
            ok(json!({ "message": "Data queued", "n": n }))
        };

        let first = filter.admit(Some("k1"), handler).await.unwrap();
        let second = filter.admit(Some("k1"), handler).await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let (IdempotencyOutcome::Executed(executed), IdempotencyOutcome::Replayed(replayed)) =
            (first, second)
        else {
            panic!("expected an execution followed by a replay");
        };
        assert_eq!(executed, replayed);
    }

    #[tokio::test]
    async fn missing_or_blank_key_is_rejected() {
        let filter = filter(Arc::new(MemoryStore::new()));
        for key in [None, Some(""), Some("   ")] {
            let result = filter.admit(key, || async { ok(json!({})) }).await;
            assert!(matches!(result, Err(IdempotencyError::MissingKey)));
        }
    }

    #[tokio::test]
    async fn failed_response_is_not_remembered() {
        let filter = filter(Arc::new(MemoryStore::new()));
        let calls = AtomicU32::new(0);
        let counter = &calls;

        let first = filter
            .admit(Some("k"), move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                StoredResponse::new(500, json!({ "error": "Failed to process" }))
            })
            .await
            .unwrap();
        assert!(matches!(first, IdempotencyOutcome::Executed(r) if r.status == 500));

        let retry = filter
            .admit(Some("k"), move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                ok(json!({ "message": "Data queued" }))
            })
            .await
            .unwrap();
        assert!(matches!(retry, IdempotencyOutcome::Executed(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn concurrent_duplicate_is_in_progress() {
        let store = Arc::new(MemoryStore::new());
        let filter = filter(store);
        let (started_tx, started_rx) = tokio::sync::oneshot::channel::<()>();
        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();

        let first = filter.admit(Some("dup"), || async move {
            let _ = started_tx.send(());
            let _ = release_rx.await;
            ok(json!({ "message": "Data queued" }))
        });
        let second = async {
            started_rx.await.unwrap();
            let result = filter.admit(Some("dup"), || async { ok(json!({})) }).await;
            let _ = release_tx.send(());
            result
        };

        let (first, second) = tokio::join!(first, second);
        assert!(matches!(first, Ok(IdempotencyOutcome::Executed(_))));
        assert!(matches!(second, Err(IdempotencyError::InProgress(k)) if k == "dup"));
    }

    #[tokio::test]
    async fn lookup_failure_propagates() {
        let store = Arc::new(FaultyStore::new());
        store.fail(&["get"]);
        let filter = filter(store);
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result = filter
            .admit(Some("k"), move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                ok(json!({}))
            })
            .await;
        assert!(matches!(result, Err(IdempotencyError::Store(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn record_expires_after_ttl() {
        let store = Arc::new(MemoryStore::new());
        let config = IdempotencyConfig {
            ttl_secs: 10,
            pending_ttl_secs: 5,
        };
        let filter = IdempotencyFilter::new(store, &config, Arc::new(Metrics::new()));
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let handler = move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            ok(json!({}))
        };

        filter.admit(Some("k"), handler).await.unwrap();
        tokio::time::advance(Duration::from_secs(11)).await;
        let again = filter.admit(Some("k"), handler).await.unwrap();

        assert!(matches!(again, IdempotencyOutcome::Executed(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
