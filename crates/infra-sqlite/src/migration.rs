// Migration Runner

use crate::pool::ConnectionPool;
use crate::record_store::map_sqlx_error;
use couponsys_core::port::StoreResult;
use sqlx::sqlite::SqliteConnection;
use sqlx::Connection;
use tracing::info;

/// Versioned migrations, applied in order
const MIGRATIONS: &[(i64, &str, &str)] = &[(
    1,
    "Initial schema",
    include_str!("../migrations/001_initial_schema.sql"),
)];

/// Run database migrations
///
/// # Returns
/// Schema version after the run
pub async fn run_migrations(pool: &ConnectionPool) -> StoreResult<i64> {
    info!("Running database migrations...");
    let mut conn = pool.acquire().await?;

    let table_exists: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='schema_version'",
    )
    .fetch_one(&mut *conn)
    .await
    .map_err(|e| map_sqlx_error("schema_version lookup", e))?;

    let mut current_version: i64 = if table_exists > 0 {
        sqlx::query_scalar("SELECT version FROM schema_version ORDER BY version DESC LIMIT 1")
            .fetch_optional(&mut *conn)
            .await
            .map_err(|e| map_sqlx_error("schema_version lookup", e))?
            .unwrap_or(0)
    } else {
        0
    };

    info!("Current schema version: {}", current_version);

    for (version, name, sql) in MIGRATIONS {
        if current_version < *version {
            info!("Applying migration {:03}: {}", version, name);
            apply_migration(&mut conn, sql).await?;
            current_version = *version;
        }
    }

    info!("All migrations applied successfully");
    Ok(current_version)
}

/// Apply a single migration SQL file inside one transaction
async fn apply_migration(conn: &mut SqliteConnection, sql: &str) -> StoreResult<()> {
    let mut tx = conn
        .begin()
        .await
        .map_err(|e| map_sqlx_error("BEGIN", e))?;

    for statement in sql.split(';') {
        let clean_statement: String = statement
            .lines()
            .filter(|line| !line.trim().starts_with("--"))
            .collect::<Vec<_>>()
            .join("\n")
            .trim()
            .to_string();

        if !clean_statement.is_empty() {
            sqlx::query(&clean_statement)
                .execute(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error(&clean_statement, e))?;
        }
    }

    tx.commit()
        .await
        .map_err(|e| map_sqlx_error("COMMIT", e))?;
    Ok(())
}
