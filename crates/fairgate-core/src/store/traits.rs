use std::time::Duration;

use async_trait::async_trait;

use crate::error::StoreResult;

/// Durable queue store: FIFO lists, counters and expiring key-value entries.
///
/// Every operation is an independent round trip; no multi-operation
/// transaction is assumed. Implementations must be thread-safe.
///
/// List orientation follows the Redis `LPUSH`/`RPOP` convention: producers
/// append at the newest end with [`push_back`](Store::push_back), consumers
/// remove from the oldest end with [`pop_front`](Store::pop_front).
#[async_trait]
pub trait Store: Send + Sync {
    // --- List operations ---

    /// Append a value at the newest end of a list. Returns the new length.
    async fn push_back(&self, key: &str, value: &str) -> StoreResult<u64>;

    /// Atomically remove and return the oldest value of a list.
    async fn pop_front(&self, key: &str) -> StoreResult<Option<String>>;

    /// Return a value to the oldest end of a list, so it is the next one
    /// popped. Returns the new length.
    async fn push_front(&self, key: &str, value: &str) -> StoreResult<u64>;

    /// Number of values in a list (0 for unknown lists).
    async fn len(&self, key: &str) -> StoreResult<u64>;

    /// Keys of lists beginning with `prefix`. May include empty lists.
    async fn list_keys(&self, prefix: &str) -> StoreResult<Vec<String>>;

    // --- Key-value operations ---

    /// Read a value; expired entries read as absent.
    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// Write a value that expires after `ttl`, replacing any existing one.
    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()>;

    /// Write a value that expires after `ttl` only if the key is absent.
    /// Returns `true` when the value was written.
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<bool>;

    /// Remove a key-value entry. Missing keys are not an error.
    async fn delete(&self, key: &str) -> StoreResult<()>;

    /// Atomically increment an integer counter, creating it at 0 first.
    /// Returns the new value.
    async fn increment(&self, key: &str) -> StoreResult<i64>;
}
