use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, DBWithThreadMode, Direction, IteratorMode,
    MultiThreaded, Options, WriteBatch,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::item::now_ms;
use crate::store::keys;
use crate::store::traits::Store;

const CF_LISTS: &str = "lists";
const CF_LIST_META: &str = "list_meta";
const CF_KV: &str = "kv";

/// All column family names (excluding `default` which RocksDB creates automatically).
const COLUMN_FAMILIES: &[&str] = &[CF_LISTS, CF_LIST_META, CF_KV];

/// A full scan of the `kv` family for expired entries runs once per this
/// many value writes.
const SWEEP_EVERY: u64 = 256;

/// Sequence number new lists start from, leaving room to grow in both directions.
const SEQ_ORIGIN: u64 = 1 << 63;

type DB = DBWithThreadMode<MultiThreaded>;

/// Bounds of a list: entries occupy sequence numbers `head..tail`.
#[derive(Debug, Clone, Copy, PartialEq)]
struct ListMeta {
    head: u64,
    tail: u64,
}

impl ListMeta {
    const EMPTY: ListMeta = ListMeta {
        head: SEQ_ORIGIN,
        tail: SEQ_ORIGIN,
    };

    fn len(&self) -> u64 {
        self.tail - self.head
    }

    fn encode(&self) -> [u8; 16] {
        let mut buf = [0u8; 16];
        buf[..8].copy_from_slice(&self.head.to_be_bytes());
        buf[8..].copy_from_slice(&self.tail.to_be_bytes());
        buf
    }

    fn decode(bytes: &[u8]) -> StoreResult<Self> {
        let head: [u8; 8] = bytes
            .get(..8)
            .and_then(|b| b.try_into().ok())
            .ok_or_else(|| StoreError::Serialization("truncated list metadata".to_string()))?;
        let tail: [u8; 8] = bytes
            .get(8..16)
            .and_then(|b| b.try_into().ok())
            .ok_or_else(|| StoreError::Serialization("truncated list metadata".to_string()))?;
        Ok(Self {
            head: u64::from_be_bytes(head),
            tail: u64::from_be_bytes(tail),
        })
    }
}

/// Key-value entry as persisted in the `kv` column family.
#[derive(Debug, Serialize, Deserialize)]
struct StoredValue {
    value: String,
    /// Unix epoch milliseconds; `None` never expires.
    expires_at_ms: Option<u64>,
}

impl StoredValue {
    fn is_live(&self, now_ms: u64) -> bool {
        self.expires_at_ms.is_none_or(|at| at > now_ms)
    }
}

struct Inner {
    db: DB,
    /// Serializes read-modify-write sequences (list bounds, set-if-absent,
    /// counters). Plain reads do not take it.
    write_lock: Mutex<()>,
    kv_writes: AtomicU64,
}

impl Inner {
    fn cf(&self, name: &str) -> StoreResult<Arc<BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::RocksDb(format!("column family not found: {name}")))
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, ()>> {
        self.write_lock
            .lock()
            .map_err(|_| StoreError::Unavailable("rocksdb write lock poisoned".to_string()))
    }

    fn read_meta(&self, list_key: &str) -> StoreResult<Option<ListMeta>> {
        let cf = self.cf(CF_LIST_META)?;
        match self.db.get_cf(&cf, list_key.as_bytes())? {
            Some(bytes) => Ok(Some(ListMeta::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    fn push(&self, list_key: &str, value: &str, front: bool) -> StoreResult<u64> {
        let _guard = self.lock()?;
        let mut meta = self.read_meta(list_key)?.unwrap_or(ListMeta::EMPTY);
        let seq = if front {
            meta.head -= 1;
            meta.head
        } else {
            meta.tail += 1;
            meta.tail - 1
        };

        let lists = self.cf(CF_LISTS)?;
        let list_meta = self.cf(CF_LIST_META)?;
        let mut batch = WriteBatch::default();
        batch.put_cf(&lists, keys::list_entry_key(list_key, seq), value.as_bytes());
        batch.put_cf(&list_meta, list_key.as_bytes(), meta.encode());
        self.db.write(batch)?;
        Ok(meta.len())
    }

    fn pop_front(&self, list_key: &str) -> StoreResult<Option<String>> {
        let _guard = self.lock()?;
        let Some(mut meta) = self.read_meta(list_key)? else {
            return Ok(None);
        };
        if meta.len() == 0 {
            return Ok(None);
        }

        let lists = self.cf(CF_LISTS)?;
        let list_meta = self.cf(CF_LIST_META)?;
        let entry_key = keys::list_entry_key(list_key, meta.head);
        let value = self.db.get_cf(&lists, &entry_key)?.ok_or_else(|| {
            StoreError::RocksDb(format!("list {list_key} missing entry at seq {}", meta.head))
        })?;
        meta.head += 1;

        let mut batch = WriteBatch::default();
        batch.delete_cf(&lists, &entry_key);
        batch.put_cf(&list_meta, list_key.as_bytes(), meta.encode());
        self.db.write(batch)?;

        String::from_utf8(value)
            .map(Some)
            .map_err(|e| StoreError::Serialization(e.to_string()))
    }

    fn list_keys(&self, prefix: &str) -> StoreResult<Vec<String>> {
        let cf = self.cf(CF_LIST_META)?;
        let iter = self.db.iterator_cf(
            &cf,
            IteratorMode::From(prefix.as_bytes(), Direction::Forward),
        );
        let mut results = Vec::new();
        for item in iter {
            let (key, _) = item?;
            if !key.starts_with(prefix.as_bytes()) {
                break;
            }
            let key = String::from_utf8(key.to_vec())
                .map_err(|e| StoreError::Serialization(e.to_string()))?;
            results.push(key);
        }
        Ok(results)
    }

    fn read_value(&self, key: &str) -> StoreResult<Option<StoredValue>> {
        let cf = self.cf(CF_KV)?;
        match self.db.get_cf(&cf, key.as_bytes())? {
            Some(bytes) => {
                let stored: StoredValue = serde_json::from_slice(&bytes)?;
                Ok(stored.is_live(now_ms()).then_some(stored))
            }
            None => Ok(None),
        }
    }

    fn write_value(&self, key: &str, value: &str, ttl: Option<Duration>) -> StoreResult<()> {
        let cf = self.cf(CF_KV)?;
        let stored = StoredValue {
            value: value.to_string(),
            expires_at_ms: ttl.map(|ttl| now_ms() + ttl.as_millis() as u64),
        };
        self.db
            .put_cf(&cf, key.as_bytes(), serde_json::to_vec(&stored)?)?;

        if self.kv_writes.fetch_add(1, Ordering::Relaxed) % SWEEP_EVERY == SWEEP_EVERY - 1 {
            let removed = self.sweep_expired()?;
            if removed > 0 {
                debug!(removed, "swept expired values");
            }
        }
        Ok(())
    }

    /// Delete every expired entry in the `kv` family. Entries that fail to
    /// decode are left alone. The caller holds the write lock.
    fn sweep_expired(&self) -> StoreResult<usize> {
        let cf = self.cf(CF_KV)?;
        let now = now_ms();
        let mut batch = WriteBatch::default();
        let mut removed = 0;
        for item in self.db.iterator_cf(&cf, IteratorMode::Start) {
            let (key, bytes) = item?;
            let expired = serde_json::from_slice::<StoredValue>(&bytes)
                .is_ok_and(|stored| !stored.is_live(now));
            if expired {
                batch.delete_cf(&cf, key);
                removed += 1;
            }
        }
        if removed > 0 {
            self.db.write(batch)?;
        }
        Ok(removed)
    }
}

/// RocksDB-backed store. Lists are sequence-numbered entries bracketed by a
/// head/tail pair in `list_meta`; each list mutation writes the entry and
/// the new bounds in one `WriteBatch`. Blocking RocksDB calls run on the
/// tokio blocking pool.
pub struct RocksDbStore {
    inner: Arc<Inner>,
}

impl RocksDbStore {
    /// Open or create a RocksDB database at the given path with all column families.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        let cf_descriptors: Vec<ColumnFamilyDescriptor> = COLUMN_FAMILIES
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Options::default()))
            .collect();

        let db = DB::open_cf_descriptors(&db_opts, path, cf_descriptors)?;
        Ok(Self {
            inner: Arc::new(Inner {
                db,
                write_lock: Mutex::new(()),
                kv_writes: AtomicU64::new(0),
            }),
        })
    }

    async fn run<T, F>(&self, f: F) -> StoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Inner) -> StoreResult<T> + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || f(&inner))
            .await
            .map_err(|e| StoreError::Unavailable(format!("rocksdb task failed: {e}")))?
    }
}

#[async_trait]
impl Store for RocksDbStore {
    async fn push_back(&self, key: &str, value: &str) -> StoreResult<u64> {
        let (key, value) = (key.to_string(), value.to_string());
        self.run(move |db| db.push(&key, &value, false)).await
    }

    async fn pop_front(&self, key: &str) -> StoreResult<Option<String>> {
        let key = key.to_string();
        self.run(move |db| db.pop_front(&key)).await
    }

    async fn push_front(&self, key: &str, value: &str) -> StoreResult<u64> {
        let (key, value) = (key.to_string(), value.to_string());
        self.run(move |db| db.push(&key, &value, true)).await
    }

    async fn len(&self, key: &str) -> StoreResult<u64> {
        let key = key.to_string();
        self.run(move |db| Ok(db.read_meta(&key)?.map_or(0, |m| m.len())))
            .await
    }

    async fn list_keys(&self, prefix: &str) -> StoreResult<Vec<String>> {
        let prefix = prefix.to_string();
        self.run(move |db| db.list_keys(&prefix)).await
    }

    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let key = key.to_string();
        self.run(move |db| Ok(db.read_value(&key)?.map(|v| v.value)))
            .await
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()> {
        let (key, value) = (key.to_string(), value.to_string());
        self.run(move |db| {
            let _guard = db.lock()?;
            db.write_value(&key, &value, Some(ttl))
        })
        .await
    }

    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<bool> {
        let (key, value) = (key.to_string(), value.to_string());
        self.run(move |db| {
            let _guard = db.lock()?;
            if db.read_value(&key)?.is_some() {
                return Ok(false);
            }
            db.write_value(&key, &value, Some(ttl))?;
            Ok(true)
        })
        .await
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        let key = key.to_string();
        self.run(move |db| {
            let _guard = db.lock()?;
            let cf = db.cf(CF_KV)?;
            db.db.delete_cf(&cf, key.as_bytes())?;
            Ok(())
        })
        .await
    }

    async fn increment(&self, key: &str) -> StoreResult<i64> {
        let key = key.to_string();
        self.run(move |db| {
            let _guard = db.lock()?;
            let current = match db.read_value(&key)? {
                Some(stored) => stored.value.parse::<i64>().map_err(|e| {
                    StoreError::Serialization(format!("counter {key} is not an integer: {e}"))
                })?,
                None => 0,
            };
            let next = current + 1;
            db.write_value(&key, &next.to_string(), None)?;
            Ok(next)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_store() -> (RocksDbStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = RocksDbStore::open(dir.path()).unwrap();
        (store, dir)
    }

    fn resident_values(store: &RocksDbStore) -> usize {
        let cf = store.inner.cf(CF_KV).unwrap();
        store.inner.db.iterator_cf(&cf, IteratorMode::Start).count()
    }

    #[test]
    fn list_meta_encoding_preserves_bounds() {
        let meta = ListMeta {
            head: SEQ_ORIGIN - 3,
            tail: SEQ_ORIGIN + 7,
        };
        assert_eq!(ListMeta::decode(&meta.encode()).unwrap(), meta);
        assert_eq!(meta.len(), 10);
        assert!(ListMeta::decode(&[0u8; 4]).is_err());
    }

    #[tokio::test]
    async fn list_operations_keep_fifo_order() {
        let (store, _dir) = test_store();
        assert_eq!(store.push_back("queue:q:items", "a").await.unwrap(), 1);
        assert_eq!(store.push_back("queue:q:items", "b").await.unwrap(), 2);
        assert_eq!(store.push_back("queue:q:items", "c").await.unwrap(), 3);

        let head = store.pop_front("queue:q:items").await.unwrap().unwrap();
        assert_eq!(head, "a");
        store.push_front("queue:q:items", &head).await.unwrap();

        let mut drained = Vec::new();
        while let Some(v) = store.pop_front("queue:q:items").await.unwrap() {
            drained.push(v);
        }
        assert_eq!(drained, vec!["a", "b", "c"]);
        assert_eq!(store.len("queue:q:items").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn list_keys_scans_by_prefix() {
        let (store, _dir) = test_store();
        store.push_back("queue:a:items", "1").await.unwrap();
        store.push_back("queue:b:items", "1").await.unwrap();
        store.push_back("other:c", "1").await.unwrap();

        let keys = store.list_keys("queue:").await.unwrap();
        assert_eq!(keys, vec!["queue:a:items", "queue:b:items"]);
    }

    #[tokio::test]
    async fn lists_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = RocksDbStore::open(dir.path()).unwrap();
            store.push_back("queue:q:items", "first").await.unwrap();
            store.push_back("queue:q:items", "second").await.unwrap();
        }
        let store = RocksDbStore::open(dir.path()).unwrap();
        assert_eq!(store.len("queue:q:items").await.unwrap(), 2);
        assert_eq!(
            store.pop_front("queue:q:items").await.unwrap().as_deref(),
            Some("first")
        );
    }

    #[tokio::test]
    async fn set_if_absent_and_delete() {
        let (store, _dir) = test_store();
        let ttl = Duration::from_secs(60);
        assert!(store.set_if_absent("k", "one", ttl).await.unwrap());
        assert!(!store.set_if_absent("k", "two", ttl).await.unwrap());
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("one"));

        store.delete("k").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);
        assert!(store.set_if_absent("k", "three", ttl).await.unwrap());
    }

    #[tokio::test]
    async fn expired_values_read_as_absent() {
        let (store, _dir) = test_store();
        store
            .set_with_ttl("k", "v", Duration::from_millis(0))
            .await
            .unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);
        assert!(store
            .set_if_absent("k", "fresh", Duration::from_secs(60))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn expired_values_are_swept_by_later_writes() {
        let (store, _dir) = test_store();
        store.increment("counter:q:enqueued").await.unwrap();
        for i in 1..SWEEP_EVERY {
            store
                .set_if_absent(&format!("idem:{i}"), "p", Duration::ZERO)
                .await
                .unwrap();
        }

        assert_eq!(resident_values(&store), 1);
        assert_eq!(
            store.get("counter:q:enqueued").await.unwrap().as_deref(),
            Some("1")
        );
    }

    #[tokio::test]
    async fn sweep_keeps_live_and_undecodable_entries() {
        let (store, _dir) = test_store();
        store
            .set_with_ttl("dead", "v", Duration::ZERO)
            .await
            .unwrap();
        store
            .set_with_ttl("live", "v", Duration::from_secs(60))
            .await
            .unwrap();
        let cf = store.inner.cf(CF_KV).unwrap();
        store.inner.db.put_cf(&cf, b"junk", b"not json").unwrap();

        assert_eq!(store.inner.sweep_expired().unwrap(), 1);
        assert_eq!(resident_values(&store), 2);
        assert_eq!(store.get("live").await.unwrap().as_deref(), Some("v"));
    }

    #[tokio::test]
    async fn increment_persists_counter() {
        let (store, _dir) = test_store();
        assert_eq!(store.increment("counter:q:enqueued").await.unwrap(), 1);
        assert_eq!(store.increment("counter:q:enqueued").await.unwrap(), 2);
        assert_eq!(
            store.get("counter:q:enqueued").await.unwrap().as_deref(),
            Some("2")
        );
    }
}
