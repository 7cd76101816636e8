//! Logging setup
//!
//! Stdout logging in JSON or pretty format, plus an optional daily-rolling
//! file sink.
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: filter directives (default: `couponsys=info`)
//! - `COUPONSYS_LOG_FORMAT`: `json` or `pretty` (default)
//! - `COUPONSYS_LOG_DIR`: directory for `couponsys.log.YYYY-MM-DD`

use crate::config::{LogConfig, LogFormat};
use anyhow::Result;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_FILTER: &str = "couponsys=info";
const LOG_FILE_PREFIX: &str = "couponsys.log";

/// Install the global subscriber
///
/// The returned guard flushes the file sink; keep it alive until exit.
pub fn init_logging(config: &LogConfig) -> Result<Option<WorkerGuard>> {
    let env_filter =
        EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(DEFAULT_FILTER))?;

    let (file_layer, guard) = match &config.dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().json().with_ansi(false).with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    match config.format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(env_filter)
            .with(file_layer)
            .with(fmt::layer().json())
            .try_init()?,
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(env_filter)
            .with(file_layer)
            .with(fmt::layer().pretty())
            .try_init()?,
    }

    Ok(guard)
}
