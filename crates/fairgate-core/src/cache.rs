use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;

use crate::error::StoreResult;
use crate::store::{keys, Store};

/// JSON values cached in the store under `cache:{key}` with a TTL.
///
/// Entries that no longer decode as the requested type read as a miss.
#[derive(Clone)]
pub struct ResponseCache {
    store: Arc<dyn Store>,
    ttl: Duration,
}

impl ResponseCache {
    pub fn new(store: Arc<dyn Store>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    /// A zero TTL disables the cache.
    pub fn is_enabled(&self) -> bool {
        !self.ttl.is_zero()
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> StoreResult<Option<T>> {
        if !self.is_enabled() {
            return Ok(None);
        }
        let Some(raw) = self.store.get(&keys::cache_key(key)).await? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                warn!(cache_key = key, error = %e, "discarding undecodable cache entry");
                Ok(None)
            }
        }
    }

    pub async fn put<T: Serialize>(&self, key: &str, value: &T) -> StoreResult<()> {
        if !self.is_enabled() {
            return Ok(());
        }
        let raw = serde_json::to_string(value)?;
        self.store
            .set_with_ttl(&keys::cache_key(key), &raw, self.ttl)
            .await
    }
}
