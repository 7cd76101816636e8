//! Couponsys Daemon - Main Entry Point
//! Hosts the connection pool and the daily archival task

mod config;
mod logging;

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{error, info};

use config::{database_file, DaemonConfig};
use couponsys_core::application::{ArchivalPipeline, ArchivalScheduler};
use couponsys_core::port::SystemTimeProvider;
use couponsys_infra_sqlite::{connect_store, RecordStore, SqliteCouponRepository};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Load configuration
    let config = DaemonConfig::from_env()?;

    // 2. Initialize logging
    let _log_guard = logging::init_logging(&config.log)?;

    info!("Couponsys daemon v{} starting...", VERSION);

    // 3. Initialize database (pool + migrations)
    if let Some(parent) = database_file(&config.store.database_url)
        .as_deref()
        .and_then(|path| path.parent())
        .filter(|parent| !parent.as_os_str().is_empty())
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Cannot create database directory {}", parent.display()))?;
    }

    info!(
        database_url = %config.store.database_url,
        pool_capacity = config.store.pool_capacity,
        "Initializing database..."
    );
    let pool = connect_store(&config.store)
        .await
        .map_err(|e| anyhow::anyhow!("Store initialization failed: {}", e.details()))?;

    // 4. Setup dependencies (DI wiring)
    let time_provider = Arc::new(SystemTimeProvider);
    let repository = Arc::new(SqliteCouponRepository::new(RecordStore::new(pool.clone())));
    let pipeline = Arc::new(ArchivalPipeline::new(repository, time_provider));

    // 5. Start the archival task
    info!(
        interval_secs = config.archival.interval.as_secs(),
        "Starting archival task..."
    );
    let archival = ArchivalScheduler::new(pipeline, config.archival.clone())?.start();

    info!("System ready. Press Ctrl+C to shutdown");

    // 6. Wait for shutdown signal
    tokio::signal::ctrl_c().await?;

    info!("Shutdown signal received. Exiting gracefully...");

    // 7. Graceful shutdown: archival first, then the connections it was using
    if let Err(e) = archival.stop_task().await {
        error!(error = %e, details = ?e.details(), "Archival task did not stop cleanly");
    }
    let closed = pool.close_all().await;

    info!(closed_connections = closed, "Shutdown complete.");

    Ok(())
}
