use std::sync::Arc;
use std::time::Duration;

use fairgate_core::broker::config::{StoreBackend, StoreConfig};
use fairgate_core::{MemoryStore, RocksDbStore, Store, TimeoutStore};
use fairgate_server::config::{load_config, CONFIG_PATHS};
use fairgate_server::error::ServerError;
use fairgate_server::{app, AppState, Telemetry};
use tracing::info;

async fn open_store(config: &StoreConfig) -> Result<Arc<dyn Store>, ServerError> {
    let timeout = Duration::from_millis(config.op_timeout_ms);
    let store: Arc<dyn Store> = match config.backend {
        StoreBackend::Memory => Arc::new(TimeoutStore::new(MemoryStore::new(), timeout)),
        StoreBackend::RocksDb => {
            info!(data_dir = %config.data_dir, "opening rocksdb store");
            Arc::new(TimeoutStore::new(RocksDbStore::open(&config.data_dir)?, timeout))
        }
        #[cfg(feature = "redis")]
        StoreBackend::Redis => {
            info!(url = %config.redis_url, "connecting to redis");
            let redis = fairgate_core::RedisStore::connect(&config.redis_url).await?;
            Arc::new(TimeoutStore::new(redis, timeout))
        }
        #[cfg(not(feature = "redis"))]
        StoreBackend::Redis => return Err(ServerError::BackendUnavailable("redis")),
    };
    Ok(store)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    fairgate_core::telemetry::init_tracing();

    let config = load_config(&CONFIG_PATHS)?;
    let store = open_store(&config.store).await?;
    let telemetry = Telemetry::new()?;

    let state = Arc::new(AppState::new(&config, store, telemetry));
    let router = app(state.clone());

    let listener = tokio::net::TcpListener::bind(&config.server.listen_addr).await?;
    info!(addr = %config.server.listen_addr, backend = ?config.store.backend, "starting HTTP server");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("HTTP server stopped, shutting down broker");

    state.telemetry.shutdown();
    match Arc::try_unwrap(state) {
        Ok(state) => state.broker.shutdown().await?,
        // Drop impl stops the scheduler once the last reference goes.
        Err(_) => info!("broker still referenced, leaving shutdown to drop"),
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {},
                    _ = sigterm.recv() => {},
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to install SIGTERM handler");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
    }

    info!("received shutdown signal");
}
