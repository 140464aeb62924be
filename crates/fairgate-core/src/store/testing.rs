use std::collections::HashSet;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{StoreError, StoreResult};
use crate::store::{MemoryStore, Store};

/// Memory store that fails selected operations with `StoreError::Unavailable`.
#[derive(Default)]
pub(crate) struct FaultyStore {
    inner: MemoryStore,
    failing: Mutex<HashSet<&'static str>>,
}

impl FaultyStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Make every listed operation (by trait method name) fail from now on.
    pub(crate) fn fail(&self, ops: &[&'static str]) {
        self.failing.lock().unwrap().extend(ops.iter().copied());
    }

    pub(crate) fn heal(&self) {
        self.failing.lock().unwrap().clear();
    }

    fn check(&self, op: &'static str) -> StoreResult<()> {
        if self.failing.lock().unwrap().contains(op) {
            return Err(StoreError::Unavailable(format!("injected {op} failure")));
        }
        Ok(())
    }
}

#[async_trait]
impl Store for FaultyStore {
    async fn push_back(&self, key: &str, value: &str) -> StoreResult<u64> {
        self.check("push_back")?;
        self.inner.push_back(key, value).await
    }

    async fn pop_front(&self, key: &str) -> StoreResult<Option<String>> {
        self.check("pop_front")?;
        self.inner.pop_front(key).await
    }

    async fn push_front(&self, key: &str, value: &str) -> StoreResult<u64> {
        self.check("push_front")?;
        self.inner.push_front(key, value).await
    }

    async fn len(&self, key: &str) -> StoreResult<u64> {
        self.check("len")?;
        self.inner.len(key).await
    }

    async fn list_keys(&self, prefix: &str) -> StoreResult<Vec<String>> {
        self.check("list_keys")?;
        self.inner.list_keys(prefix).await
    }

    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        self.check("get")?;
        self.inner.get(key).await
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()> {
        self.check("set_with_ttl")?;
        self.inner.set_with_ttl(key, value, ttl).await
    }

    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<bool> {
        self.check("set_if_absent")?;
        self.inner.set_if_absent(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        self.check("delete")?;
        self.inner.delete(key).await
    }

    async fn increment(&self, key: &str) -> StoreResult<i64> {
        self.check("increment")?;
        self.inner.increment(key).await
    }
}
