use std::time::Duration;

/// Low-level store errors. Every `Store` operation can fail only with these
/// infrastructure errors, never with domain errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("rocksdb error: {0}")]
    RocksDb(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<rocksdb::Error> for StoreError {
    fn from(err: rocksdb::Error) -> Self {
        StoreError::RocksDb(err.into_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

#[cfg(feature = "redis")]
impl From<redis::RedisError> for StoreError {
    fn from(err: redis::RedisError) -> Self {
        StoreError::Unavailable(err.to_string())
    }
}

/// Errors from the broker's scheduler task plumbing.
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error("scheduler command channel full")]
    ChannelFull,

    #[error("scheduler command channel disconnected")]
    ChannelDisconnected,

    #[error("scheduler task panicked")]
    SchedulerPanicked,
}

// --- Per-operation error types ---

#[derive(Debug, thiserror::Error)]
pub enum EnqueueError {
    #[error("invalid queue name: {0}")]
    InvalidQueueName(String),

    #[error("item weight must be at least 1")]
    InvalidWeight,

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, thiserror::Error)]
pub enum DequeueError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Broker(#[from] BrokerError),
}

#[derive(Debug, thiserror::Error)]
pub enum StatsError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Broker(#[from] BrokerError),
}

#[derive(Debug, thiserror::Error)]
pub enum IdempotencyError {
    #[error("idempotency key required")]
    MissingKey,

    #[error("request with idempotency key {0} is already in progress")]
    InProgress(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, thiserror::Error)]
pub enum IntegrityError {
    #[error("integrity check failed: checksum header missing")]
    MissingChecksum,

    #[error("integrity check failed: malformed body: {0}")]
    MalformedBody(String),

    #[error("integrity check failed: checksum mismatch")]
    Mismatch { expected: String, supplied: String },
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid config value: {0}")]
    InvalidValue(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;
pub type BrokerResult<T> = std::result::Result<T, BrokerError>;
