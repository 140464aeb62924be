use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::error::{StoreError, StoreResult};
use crate::store::traits::Store;

/// Minimum spacing between full scans for expired values.
const SWEEP_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Default)]
struct MemoryState {
    lists: HashMap<String, VecDeque<String>>,
    values: HashMap<String, Entry>,
    last_sweep: Option<Instant>,
}

impl MemoryState {
    /// Store a value, first dropping every expired entry if the last sweep
    /// is more than [`SWEEP_INTERVAL`] old. Keys that are never read again
    /// are reclaimed this way.
    fn insert_value(&mut self, key: &str, entry: Entry, now: Instant) {
        if self
            .last_sweep
            .is_none_or(|at| now.duration_since(at) >= SWEEP_INTERVAL)
        {
            self.values.retain(|_, e| e.is_live(now));
            self.last_sweep = Some(now);
        }
        self.values.insert(key.to_string(), entry);
    }
}

struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }
}

/// In-process store. Every operation takes the state lock once, which makes
/// each operation atomic with respect to the others. Expiry is measured
/// against the tokio clock.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, MemoryState>> {
        self.state
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".to_string()))
    }

    /// Number of key-value entries held, expired or not.
    #[cfg(test)]
    fn resident_values(&self) -> usize {
        self.lock().map_or(0, |state| state.values.len())
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn push_back(&self, key: &str, value: &str) -> StoreResult<u64> {
        let mut state = self.lock()?;
        let list = state.lists.entry(key.to_string()).or_default();
        list.push_back(value.to_string());
        Ok(list.len() as u64)
    }

    async fn pop_front(&self, key: &str) -> StoreResult<Option<String>> {
        let mut state = self.lock()?;
        Ok(state.lists.get_mut(key).and_then(VecDeque::pop_front))
    }

    async fn push_front(&self, key: &str, value: &str) -> StoreResult<u64> {
        let mut state = self.lock()?;
        let list = state.lists.entry(key.to_string()).or_default();
        list.push_front(value.to_string());
        Ok(list.len() as u64)
    }

    async fn len(&self, key: &str) -> StoreResult<u64> {
        let state = self.lock()?;
        Ok(state.lists.get(key).map_or(0, |l| l.len() as u64))
    }

    async fn list_keys(&self, prefix: &str) -> StoreResult<Vec<String>> {
        let state = self.lock()?;
        Ok(state
            .lists
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let mut state = self.lock()?;
        let now = Instant::now();
        match state.values.get(key) {
            Some(entry) if entry.is_live(now) => Ok(Some(entry.value.clone())),
            Some(_) => {
                state.values.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()> {
        let mut state = self.lock()?;
        let now = Instant::now();
        state.insert_value(
            key,
            Entry {
                value: value.to_string(),
                expires_at: Some(now + ttl),
            },
            now,
        );
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<bool> {
        let mut state = self.lock()?;
        let now = Instant::now();
        if state.values.get(key).is_some_and(|e| e.is_live(now)) {
            return Ok(false);
        }
        state.insert_value(
            key,
            Entry {
                value: value.to_string(),
                expires_at: Some(now + ttl),
            },
            now,
        );
        Ok(true)
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        let mut state = self.lock()?;
        state.values.remove(key);
        Ok(())
    }

    async fn increment(&self, key: &str) -> StoreResult<i64> {
        let mut state = self.lock()?;
        let now = Instant::now();
        let current = match state.values.get(key) {
            Some(entry) if entry.is_live(now) => entry.value.parse::<i64>().map_err(|e| {
                StoreError::Serialization(format!("counter {key} is not an integer: {e}"))
            })?,
            _ => 0,
        };
        let next = current + 1;
        state.insert_value(
            key,
            Entry {
                value: next.to_string(),
                expires_at: None,
            },
            now,
        );
        Ok(next)
    }
}
