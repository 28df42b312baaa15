//! Main entry point for the Keyward lock coordinator.
//!
//! Loads configuration, selects the state store and serves the HTTP API
//! until Ctrl+C or SIGTERM.

use std::sync::Arc;

use anyhow::Context;
use keyward_common::StorageMode;
use keyward_core::{LockCoordinator, MemoryStateStore, RedisStateStore, StateStore};
use keyward_server::{model::Configuration, startup};
use tracing::{error, info};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let configuration = Configuration::new()?;

    let logging_config = configuration.logging_config();
    let _logging_guard = startup::init_logging(&logging_config)?;

    let storage_mode = configuration.storage_mode();
    info!("Storage mode: {}", storage_mode);

    let store: Arc<dyn StateStore> = match storage_mode {
        StorageMode::Memory => Arc::new(MemoryStateStore::new(configuration.default_expiry())),
        StorageMode::Redis => {
            let redis_config = configuration.redis_store_config();
            let store = RedisStateStore::new(&redis_config)
                .with_context(|| format!("Invalid Redis URL {}", redis_config.url))?;
            if let Err(e) = store.health_check().await {
                error!(url = %redis_config.url, error = %e, "Failed to connect to Redis");
                return Err(e)
                    .with_context(|| format!("Redis at {} is unreachable", redis_config.url));
            }
            info!(url = %redis_config.url, "Connected to Redis");
            Arc::new(store)
        }
    };

    let coordinator = LockCoordinator::new(store);

    let server_address = configuration.server_address();
    let server_port = configuration.server_port();
    let server = startup::main_server(coordinator, server_address.clone(), server_port)
        .with_context(|| format!("Failed to bind {}:{}", server_address, server_port))?;

    info!(
        "Keyward listening on {}:{} (default lease {} ms)",
        server_address,
        server_port,
        configuration.default_expiry().as_millis()
    );

    startup::serve_until(server, startup::wait_for_shutdown_signal()).await?;

    Ok(())
}
