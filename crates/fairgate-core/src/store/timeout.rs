use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{StoreError, StoreResult};
use crate::store::traits::Store;

/// Decorator bounding the operations of the wrapped store by a fixed
/// timeout. An elapsed timer surfaces as [`StoreError::Timeout`]; the inner
/// operation is dropped, not cancelled remotely.
///
/// `pop_front` is not bounded. A RocksDB pop on the blocking pool, or an
/// RPOP already on the wire, still removes the item after the timer fires,
/// and the caller would never receive it. Pops wait for the backend instead.
pub struct TimeoutStore<S> {
    inner: S,
    timeout: Duration,
}

impl<S: Store> TimeoutStore<S> {
    pub fn new(inner: S, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    async fn bounded<T>(&self, op: impl Future<Output = StoreResult<T>>) -> StoreResult<T> {
        tokio::time::timeout(self.timeout, op)
            .await
            .map_err(|_| StoreError::Timeout(self.timeout))?
    }
}

#[async_trait]
impl<S: Store> Store for TimeoutStore<S> {
    async fn push_back(&self, key: &str, value: &str) -> StoreResult<u64> {
        self.bounded(self.inner.push_back(key, value)).await
    }

    async fn pop_front(&self, key: &str) -> StoreResult<Option<String>> {
        self.inner.pop_front(key).await
    }

    async fn push_front(&self, key: &str, value: &str) -> StoreResult<u64> {
        self.bounded(self.inner.push_front(key, value)).await
    }

    async fn len(&self, key: &str) -> StoreResult<u64> {
        self.bounded(self.inner.len(key)).await
    }

    async fn list_keys(&self, prefix: &str) -> StoreResult<Vec<String>> {
        self.bounded(self.inner.list_keys(prefix)).await
    }

    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        self.bounded(self.inner.get(key)).await
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()> {
        self.bounded(self.inner.set_with_ttl(key, value, ttl)).await
    }

    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<bool> {
        self.bounded(self.inner.set_if_absent(key, value, ttl)).await
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        self.bounded(self.inner.delete(key)).await
    }

    async fn increment(&self, key: &str) -> StoreResult<i64> {
        self.bounded(self.inner.increment(key)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    /// Store whose `len` never completes and whose `pop_front` takes a
    /// second; everything else delegates.
    struct StalledLen(MemoryStore);

    #[async_trait]
    impl Store for StalledLen {
        async fn push_back(&self, key: &str, value: &str) -> StoreResult<u64> {
            self.0.push_back(key, value).await
        }
        async fn pop_front(&self, key: &str) -> StoreResult<Option<String>> {
            let popped = self.0.pop_front(key).await;
            tokio::time::sleep(Duration::from_secs(1)).await;
            popped
        }
        async fn push_front(&self, key: &str, value: &str) -> StoreResult<u64> {
            self.0.push_front(key, value).await
        }
        async fn len(&self, _key: &str) -> StoreResult<u64> {
            std::future::pending().await
        }
        async fn list_keys(&self, prefix: &str) -> StoreResult<Vec<String>> {
            self.0.list_keys(prefix).await
        }
        async fn get(&self, key: &str) -> StoreResult<Option<String>> {
            self.0.get(key).await
        }
        async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()> {
            self.0.set_with_ttl(key, value, ttl).await
        }
        async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<bool> {
            self.0.set_if_absent(key, value, ttl).await
        }
        async fn delete(&self, key: &str) -> StoreResult<()> {
            self.0.delete(key).await
        }
        async fn increment(&self, key: &str) -> StoreResult<i64> {
            self.0.increment(key).await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_operation_times_out() {
        let store = TimeoutStore::new(StalledLen(MemoryStore::new()), Duration::from_millis(250));
        let err = store.len("queue:q:items").await.unwrap_err();
        assert!(matches!(err, StoreError::Timeout(d) if d == Duration::from_millis(250)));
    }

    #[tokio::test(start_paused = true)]
    async fn fast_operations_pass_through() {
        let store = TimeoutStore::new(StalledLen(MemoryStore::new()), Duration::from_millis(250));
        assert_eq!(store.push_back("l", "a").await.unwrap(), 1);
        assert_eq!(store.get("missing").await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_pop_still_hands_over_the_item() {
        let store = TimeoutStore::new(StalledLen(MemoryStore::new()), Duration::from_millis(250));
        store.push_back("l", "a").await.unwrap();
        assert_eq!(store.pop_front("l").await.unwrap().as_deref(), Some("a"));
        assert_eq!(store.pop_front("l").await.unwrap(), None);
    }
}
