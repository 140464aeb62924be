use std::time::Duration;

use ::redis::aio::ConnectionManager;
use async_trait::async_trait;

use crate::error::StoreResult;
use crate::store::traits::Store;

/// Number of keys requested per `SCAN` page.
const SCAN_PAGE: usize = 100;

/// Redis-backed store. Lists map onto `LPUSH`/`RPOP`/`RPUSH`, so the oldest
/// element sits at the right end of the Redis list.
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
}

impl RedisStore {
    /// Connect to `url` (e.g. `redis://127.0.0.1:6379`). The connection
    /// manager reconnects transparently after failures.
    pub async fn connect(url: &str) -> StoreResult<Self> {
        let client = ::redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl Store for RedisStore {
    async fn push_back(&self, key: &str, value: &str) -> StoreResult<u64> {
        let mut conn = self.conn.clone();
        let len: u64 = ::redis::cmd("LPUSH")
            .arg(key)
            .arg(value)
            .query_async(&mut conn)
            .await?;
        Ok(len)
    }

    async fn pop_front(&self, key: &str) -> StoreResult<Option<String>> {
        let mut conn = self.conn.clone();
        let value: Option<String> = ::redis::cmd("RPOP").arg(key).query_async(&mut conn).await?;
        Ok(value)
    }

    async fn push_front(&self, key: &str, value: &str) -> StoreResult<u64> {
        let mut conn = self.conn.clone();
        let len: u64 = ::redis::cmd("RPUSH")
            .arg(key)
            .arg(value)
            .query_async(&mut conn)
            .await?;
        Ok(len)
    }

    async fn len(&self, key: &str) -> StoreResult<u64> {
        let mut conn = self.conn.clone();
        let len: u64 = ::redis::cmd("LLEN").arg(key).query_async(&mut conn).await?;
        Ok(len)
    }

    async fn list_keys(&self, prefix: &str) -> StoreResult<Vec<String>> {
        let mut conn = self.conn.clone();
        let pattern = format!("{prefix}*");
        let mut cursor: u64 = 0;
        let mut keys = Vec::new();
        loop {
            let (next, page): (u64, Vec<String>) = ::redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_PAGE)
                .arg("TYPE")
                .arg("list")
                .query_async(&mut conn)
                .await?;
            keys.extend(page);
            if next == 0 {
                break;
            }
            cursor = next;
        }
        // SCAN may return a key more than once across pages.
        keys.sort();
        keys.dedup();
        Ok(keys)
    }

    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let mut conn = self.conn.clone();
        let value: Option<String> = ::redis::cmd("GET").arg(key).query_async(&mut conn).await?;
        Ok(value)
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        let _: () = ::redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("PX")
            .arg(ttl.as_millis().max(1) as u64)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<bool> {
        let mut conn = self.conn.clone();
        let reply: Option<String> = ::redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("PX")
            .arg(ttl.as_millis().max(1) as u64)
            .query_async(&mut conn)
            .await?;
        Ok(reply.is_some())
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        let _: i64 = ::redis::cmd("DEL").arg(key).query_async(&mut conn).await?;
        Ok(())
    }

    async fn increment(&self, key: &str) -> StoreResult<i64> {
        let mut conn = self.conn.clone();
        let value: i64 = ::redis::cmd("INCR").arg(key).query_async(&mut conn).await?;
        Ok(value)
    }
}
