// Daemon Configuration
// Everything comes from COUPONSYS_* environment variables, with defaults

use anyhow::{bail, Context, Result};
use couponsys_core::application::ArchivalConfig;
use couponsys_infra_sqlite::{StoreConfig, DEFAULT_POOL_CAPACITY};
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_DB_PATH: &str = "~/.couponsys/coupons.db";

pub const ENV_DB_URL: &str = "COUPONSYS_DB_URL";
pub const ENV_POOL_SIZE: &str = "COUPONSYS_POOL_SIZE";
pub const ENV_ARCHIVE_INTERVAL_SECS: &str = "COUPONSYS_ARCHIVE_INTERVAL_SECS";
pub const ENV_LOG_FORMAT: &str = "COUPONSYS_LOG_FORMAT";
pub const ENV_LOG_DIR: &str = "COUPONSYS_LOG_DIR";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Production: JSON structured logging
    Json,
    /// Development: human-readable
    Pretty,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    pub format: LogFormat,
    /// Directory for the daily-rolling log file; stdout only when unset
    pub dir: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonConfig {
    pub store: StoreConfig,
    pub archival: ArchivalConfig,
    pub log: LogConfig,
}

impl DaemonConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let raw_url = lookup(ENV_DB_URL).unwrap_or_else(|| DEFAULT_DB_PATH.to_string());
        let database_url = shellexpand::tilde(&raw_url).into_owned();

        let pool_capacity = match lookup(ENV_POOL_SIZE) {
            Some(value) => value
                .trim()
                .parse::<usize>()
                .with_context(|| format!("{} must be a positive integer, got '{}'", ENV_POOL_SIZE, value))?,
            None => DEFAULT_POOL_CAPACITY,
        };
        if pool_capacity == 0 {
            bail!("{} must be at least 1", ENV_POOL_SIZE);
        }

        let mut archival = ArchivalConfig::default();
        if let Some(value) = lookup(ENV_ARCHIVE_INTERVAL_SECS) {
            let secs = value.trim().parse::<u64>().with_context(|| {
                format!(
                    "{} must be a number of seconds, got '{}'",
                    ENV_ARCHIVE_INTERVAL_SECS, value
                )
            })?;
            if secs == 0 {
                bail!("{} must be at least 1", ENV_ARCHIVE_INTERVAL_SECS);
            }
            archival.interval = Duration::from_secs(secs);
        }

        let format = match lookup(ENV_LOG_FORMAT).as_deref() {
            Some("json") => LogFormat::Json,
            _ => LogFormat::Pretty,
        };
        let dir = lookup(ENV_LOG_DIR)
            .filter(|d| !d.trim().is_empty())
            .map(|d| PathBuf::from(shellexpand::tilde(&d).into_owned()));

        Ok(Self {
            store: StoreConfig::new(database_url, pool_capacity),
            archival,
            log: LogConfig { format, dir },
        })
    }
}

/// Filesystem path behind a SQLite URL, if it names a file
pub fn database_file(url: &str) -> Option<PathBuf> {
    if url.contains(":memory:") || url.contains("mode=memory") {
        return None;
    }
    let path = url
        .strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"))
        .unwrap_or(url);
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() {
        None
    } else {
        Some(PathBuf::from(path))
    }
}
