//! Builds the SQLite pool: on-disk (WAL, busy timeout, foreign keys) or in-memory for tests.
use std::{
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};

use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
    SqlitePool,
};

pub async fn create_pool(db_path: &Path) -> Result<SqlitePool, String> {
    let full_path = if db_path.is_absolute() {
        db_path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(db_path)
    };

    if let Some(parent) = full_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| format!("db dir create error: {e}"))?;
    }

    let url = format!("sqlite://{}", full_path.display());
    let opts = SqliteConnectOptions::from_str(&url)
        .map_err(|e| format!("db connect options error: {e}"))?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5))
        .foreign_keys(true);

    SqlitePoolOptions::new()
        .max_connections(4)
        .connect_with(opts)
        .await
        .map_err(|e| format!("db connect error: {e}"))
}

/// Each in-memory connection is its own database, so the pool is pinned to a single
/// connection that never expires.
pub async fn create_memory_pool() -> Result<SqlitePool, String> {
    let opts = SqliteConnectOptions::from_str("sqlite::memory:")
        .map_err(|e| format!("db connect options error: {e}"))?
        .foreign_keys(true);

    SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(opts)
        .await
        .map_err(|e| format!("db connect error: {e}"))
}
