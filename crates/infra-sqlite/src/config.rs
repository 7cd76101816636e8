// SQLite Connection Settings

use couponsys_core::port::PoolError;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode};
use std::str::FromStr;
use std::time::Duration;

/// Default pool capacity
pub const DEFAULT_POOL_CAPACITY: usize = 10;

/// Default database: private in-memory store
pub const DEFAULT_DATABASE_URL: &str = "sqlite::memory:";

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Store configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub database_url: String,
    pub pool_capacity: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            pool_capacity: DEFAULT_POOL_CAPACITY,
        }
    }
}

impl StoreConfig {
    pub fn new(database_url: impl Into<String>, pool_capacity: usize) -> Self {
        Self {
            database_url: database_url.into(),
            pool_capacity,
        }
    }

    fn is_in_memory(&self) -> bool {
        self.database_url.contains(":memory:") || self.database_url.contains("mode=memory")
    }

    /// Connection options: foreign keys on, WAL for file databases
    ///
    /// Every connection opened from one options value reaches the same
    /// database, in-memory ones included.
    pub fn connect_options(&self) -> Result<SqliteConnectOptions, PoolError> {
        let options = SqliteConnectOptions::from_str(&self.database_url)
            .map_err(|e| {
                PoolError::Config(format!(
                    "invalid database url '{}': {}",
                    self.database_url, e
                ))
            })?
            .foreign_keys(true)
            .busy_timeout(BUSY_TIMEOUT)
            .create_if_missing(true);

        if self.is_in_memory() {
            Ok(options)
        } else {
            Ok(options.journal_mode(SqliteJournalMode::Wal))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_matches_original_capacity() {
        let config = StoreConfig::default();
        assert_eq!(config.pool_capacity, 10);
        assert_eq!(config.database_url, "sqlite::memory:");
        assert!(config.connect_options().is_ok());
    }

    #[test]
    fn test_invalid_url_is_config_error() {
        let config = StoreConfig::new("sqlite:coupons.db?mode=bogus", 1);
        assert!(matches!(
            config.connect_options(),
            Err(PoolError::Config(_))
        ));
    }
}
