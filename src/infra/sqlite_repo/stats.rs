//! Aggregate counts for the end-of-run report.
use std::collections::HashMap;

use sqlx::SqlitePool;

use crate::ports::repo::StoreStats;

async fn count(pool: &SqlitePool, sql: &str) -> Result<i64, String> {
    sqlx::query_scalar(sql)
        .fetch_one(pool)
        .await
        .map_err(|e| format!("stats error: {e}"))
}

async fn grouped(pool: &SqlitePool, sql: &str) -> Result<HashMap<String, i64>, String> {
    let rows: Vec<(String, i64)> = sqlx::query_as(sql)
        .fetch_all(pool)
        .await
        .map_err(|e| format!("stats error: {e}"))?;
    Ok(rows.into_iter().collect())
}

pub async fn store_stats(pool: &SqlitePool) -> Result<StoreStats, String> {
    Ok(StoreStats {
        total_tracked: count(pool, "SELECT COUNT(*) FROM tracked_items").await?,
        by_status: grouped(
            pool,
            "SELECT status, COUNT(*) FROM tracked_items GROUP BY status",
        )
        .await?,
        by_collection: grouped(
            pool,
            "SELECT collection, COUNT(*) FROM tracked_items GROUP BY collection",
        )
        .await?,
        total_replies: count(pool, "SELECT COUNT(*) FROM replies").await?,
        queue_pending: count(
            pool,
            "SELECT COUNT(*) FROM retry_queue WHERE attempts < max_attempts",
        )
        .await?,
        queue_abandoned: count(
            pool,
            "SELECT COUNT(*) FROM retry_queue WHERE attempts >= max_attempts",
        )
        .await?,
    })
}
