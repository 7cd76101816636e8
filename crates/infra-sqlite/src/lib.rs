// Couponsys Infrastructure - SQLite Adapter
// Implements: connection pool, record store operations, CouponRepository

mod config;
mod coupon_repository;
mod migration;
mod pool;
mod record_store;

pub use config::{StoreConfig, DEFAULT_DATABASE_URL, DEFAULT_POOL_CAPACITY};
pub use coupon_repository::{ArchiveFilter, SqliteCouponRepository};
pub use migration::run_migrations;
pub use pool::{ConnectionPool, PoolStatus, PooledConnection};
pub use record_store::{
    ClearStatementCache, RecordStore, Rows, SqlValue, StatementReleaser, StoreSession,
};

// Note: sqlx::Error conversion goes through record_store::map_sqlx_error
// due to Rust's orphan rules (cannot implement From<sqlx::Error> for StoreError here)

/// Open a pool for `config` and bring its schema up to date
pub async fn connect_store(config: &StoreConfig) -> couponsys_core::port::StoreResult<ConnectionPool> {
    let options = config.connect_options()?;
    let pool = ConnectionPool::connect(&options, config.pool_capacity).await?;
    if let Err(e) = run_migrations(&pool).await {
        pool.close_all().await;
        return Err(e);
    }
    Ok(pool)
}
