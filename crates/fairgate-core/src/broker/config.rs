use serde::Deserialize;

use crate::error::ConfigError;

/// Top-level gateway configuration, deserializable from TOML.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FairgateConfig {
    pub server: ServerConfig,
    pub store: StoreConfig,
    pub scheduler: SchedulerConfig,
    pub admission: AdmissionConfig,
    pub idempotency: IdempotencyConfig,
    pub cache: CacheConfig,
}

/// HTTP listener configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_addr: String,
    /// Mount point of the admission-controlled routes. The queue name is the
    /// first path segment after it.
    pub route_prefix: String,
    pub max_body_bytes: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Memory,
    RocksDb,
    Redis,
}

/// Durable queue store selection and per-operation timeout.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    /// RocksDB directory (backend = "rocksdb").
    pub data_dir: String,
    /// Connection URL (backend = "redis").
    pub redis_url: String,
    /// Upper bound for any single store round trip.
    pub op_timeout_ms: u64,
}

/// Scheduler configuration (channel capacity, DRR quantum, static queues).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub command_channel_capacity: usize,
    /// Credit granted to a queue each time the round-robin pass visits it.
    /// With quantum 1 and integer weights, an item of weight `w` waits for
    /// `w` visits.
    pub quantum: u32,
    /// Queues always considered by the scheduler, in addition to the ones
    /// discovered by scanning the store.
    pub seed_queues: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AdmissionConfig {
    /// Requests are deferred while a queue holds more than this many items.
    pub threshold: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IdempotencyConfig {
    /// Lifetime of a stored response.
    pub ttl_secs: u64,
    /// Lifetime of an in-flight reservation, bounding how long a crashed
    /// request can block retries of the same key.
    pub pending_ttl_secs: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Lifetime of cached queue statistics. 0 disables caching.
    pub stats_ttl_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:3000".to_string(),
            route_prefix: "/api/v1".to_string(),
            max_body_bytes: 1024 * 1024,
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            data_dir: "data".to_string(),
            redis_url: "redis://127.0.0.1:6379".to_string(),
            op_timeout_ms: 2_000,
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            command_channel_capacity: 1_024,
            quantum: 1,
            seed_queues: Vec::new(),
        }
    }
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self { threshold: 100 }
    }
}

impl Default for IdempotencyConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 3_600,
            pending_ttl_secs: 60,
        }
    }
}

impl FairgateConfig {
    /// Reject values the runtime cannot operate with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.scheduler.quantum == 0 {
            return Err(ConfigError::InvalidValue(
                "scheduler.quantum must be > 0".to_string(),
            ));
        }
        if self.scheduler.command_channel_capacity == 0 {
            return Err(ConfigError::InvalidValue(
                "scheduler.command_channel_capacity must be > 0".to_string(),
            ));
        }
        if self.admission.threshold == 0 {
            return Err(ConfigError::InvalidValue(
                "admission.threshold must be > 0".to_string(),
            ));
        }
        if self.idempotency.ttl_secs == 0 || self.idempotency.pending_ttl_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "idempotency TTLs must be > 0".to_string(),
            ));
        }
        if self.store.op_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue(
                "store.op_timeout_ms must be > 0".to_string(),
            ));
        }
        if !self.server.route_prefix.starts_with('/') {
            return Err(ConfigError::InvalidValue(format!(
                "server.route_prefix must start with '/': {}",
                self.server.route_prefix
            )));
        }
        for name in &self.scheduler.seed_queues {
            crate::store::keys::validate_queue_name(name).map_err(ConfigError::InvalidValue)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let config = FairgateConfig::default();
        assert_eq!(config.server.listen_addr, "0.0.0.0:3000");
        assert_eq!(config.server.route_prefix, "/api/v1");
        assert_eq!(config.store.backend, StoreBackend::Memory);
        assert_eq!(config.store.op_timeout_ms, 2_000);
        assert_eq!(config.scheduler.quantum, 1);
        assert_eq!(config.admission.threshold, 100);
        assert_eq!(config.idempotency.ttl_secs, 3_600);
        assert_eq!(config.cache.stats_ttl_secs, 0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn toml_parsing_with_overrides() {
        let toml_str = r#"
            [server]
            listen_addr = "127.0.0.1:9999"

            [store]
            backend = "rocksdb"
            data_dir = "/var/lib/fairgate"

            [scheduler]
            quantum = 4
            seed_queues = ["agromo", "biofeed"]

            [admission]
            threshold = 250
        "#;
        let config: FairgateConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.listen_addr, "127.0.0.1:9999");
        assert_eq!(config.store.backend, StoreBackend::RocksDb);
        assert_eq!(config.store.data_dir, "/var/lib/fairgate");
        assert_eq!(config.scheduler.quantum, 4);
        assert_eq!(config.scheduler.seed_queues, vec!["agromo", "biofeed"]);
        assert_eq!(config.admission.threshold, 250);
        // Untouched sections keep their defaults
        assert_eq!(config.idempotency.ttl_secs, 3_600);
    }

    #[test]
    fn toml_parsing_empty_uses_defaults() {
        let config: FairgateConfig = toml::from_str("").unwrap();
        assert_eq!(config.server.listen_addr, "0.0.0.0:3000");
        assert_eq!(config.scheduler.command_channel_capacity, 1_024);
    }

    #[test]
    fn validation_rejects_zero_quantum() {
        let mut config = FairgateConfig::default();
        config.scheduler.quantum = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue(msg)) if msg.contains("quantum")
        ));
    }

    #[test]
    fn validation_rejects_bad_seed_queue() {
        let mut config = FairgateConfig::default();
        config.scheduler.seed_queues = vec!["bad:name".to_string()];
        assert!(config.validate().is_err());
    }
}
