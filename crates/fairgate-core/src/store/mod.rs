pub mod keys;
mod memory;
#[cfg(feature = "redis")]
mod redis;
mod rocksdb;
#[cfg(test)]
pub(crate) mod testing;
mod timeout;
mod traits;

pub use self::memory::MemoryStore;
#[cfg(feature = "redis")]
pub use self::redis::RedisStore;
pub use self::rocksdb::RocksDbStore;
pub use timeout::TimeoutStore;
pub use traits::Store;
