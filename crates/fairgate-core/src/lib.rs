//! Weighted fair queueing over a durable queue store, with the request gates
//! that sit in front of it: backpressure admission, idempotent replay and
//! body integrity checks.

pub mod broker;
pub mod cache;
pub mod error;
pub mod gate;
pub mod item;
pub mod store;
pub mod telemetry;

pub use broker::{Broker, FairgateConfig, Metrics, QueueStats, WfqScheduler};
pub use cache::ResponseCache;
pub use error::{
    BrokerError, ConfigError, DequeueError, EnqueueError, IdempotencyError, IntegrityError,
    StatsError, StoreError, StoreResult,
};
pub use item::{Dequeued, QueueItem};
pub use store::{MemoryStore, RocksDbStore, Store, TimeoutStore};
#[cfg(feature = "redis")]
pub use store::RedisStore;
