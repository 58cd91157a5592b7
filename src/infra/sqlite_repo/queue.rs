//! Durable retry queue: unique per (item, action), exponential backoff on failure.
use chrono_tz::Tz;
use sqlx::SqlitePool;
use tracing::{debug, warn};

use crate::domain::model::{QueueAction, QueueEntry};
use crate::domain::retry::next_scheduled_for_ms;
use crate::infra::time::epoch_ms_to_iso;

use super::models::QueueRecord;

const QUEUE_COLUMNS: &str = r#"
        id, item_id, collection, action, priority, attempts, max_attempts,
        last_error, created_at_ms, scheduled_for_ms
"#;

#[allow(clippy::too_many_arguments)]
pub async fn enqueue(
    pool: &SqlitePool,
    item_id: &str,
    collection: &str,
    action: QueueAction,
    priority: i64,
    max_attempts: i64,
    now_ms: i64,
    zone: &Tz,
) -> Result<(), String> {
    let now_text = epoch_ms_to_iso(now_ms, zone);
    sqlx::query(
        r#"
      INSERT INTO retry_queue(
        item_id, collection, action, priority, attempts, max_attempts,
        created_at_ms, created_at_text, scheduled_for_ms, scheduled_for_text
      ) VALUES (?1, ?2, ?3, ?4, 0, ?5, ?6, ?7, ?6, ?7)
      ON CONFLICT(item_id, action) DO UPDATE SET
        priority = MAX(retry_queue.priority, excluded.priority)
      "#,
    )
    .bind(item_id)
    .bind(collection)
    .bind(action.as_str())
    .bind(priority)
    .bind(max_attempts)
    .bind(now_ms)
    .bind(&now_text)
    .execute(pool)
    .await
    .map_err(|e| format!("enqueue error: {e}"))?;
    debug!(item_id, action = action.as_str(), priority, "Queued for retry");
    Ok(())
}

pub async fn eligible(pool: &SqlitePool, now_ms: i64, limit: i64) -> Result<Vec<QueueEntry>, String> {
    let sql = format!(
        "SELECT {QUEUE_COLUMNS} FROM retry_queue
         WHERE attempts < max_attempts AND scheduled_for_ms <= ?1
         ORDER BY priority DESC, created_at_ms ASC, id ASC
         LIMIT ?2"
    );
    let rows = sqlx::query_as::<_, QueueRecord>(&sql)
        .bind(now_ms)
        .bind(limit)
        .fetch_all(pool)
        .await
        .map_err(|e| format!("eligible_queue_entries error: {e}"))?;
    rows.into_iter().map(QueueEntry::try_from).collect()
}

pub async fn get_entry(
    pool: &SqlitePool,
    item_id: &str,
    action: QueueAction,
) -> Result<Option<QueueEntry>, String> {
    let sql = format!("SELECT {QUEUE_COLUMNS} FROM retry_queue WHERE item_id = ?1 AND action = ?2");
    let row = sqlx::query_as::<_, QueueRecord>(&sql)
        .bind(item_id)
        .bind(action.as_str())
        .fetch_optional(pool)
        .await
        .map_err(|e| format!("get_queue_entry error: {e}"))?;
    row.map(QueueEntry::try_from).transpose()
}

pub async fn mark_success(pool: &SqlitePool, entry_id: i64) -> Result<(), String> {
    sqlx::query("DELETE FROM retry_queue WHERE id = ?1")
        .bind(entry_id)
        .execute(pool)
        .await
        .map_err(|e| format!("mark_queue_success error: {e}"))?;
    Ok(())
}

pub async fn mark_failure(
    pool: &SqlitePool,
    entry_id: i64,
    error: &str,
    now_ms: i64,
    base_delay_ms: i64,
    zone: &Tz,
) -> Result<(), String> {
    let row: Option<(i64, i64)> =
        sqlx::query_as("SELECT attempts, max_attempts FROM retry_queue WHERE id = ?1")
            .bind(entry_id)
            .fetch_optional(pool)
            .await
            .map_err(|e| format!("mark_queue_failure lookup error: {e}"))?;
    let (attempts, max_attempts) = row.unwrap_or((0, 0));

    let next_ms = next_scheduled_for_ms(now_ms, base_delay_ms, attempts);
    sqlx::query(
        r#"
      UPDATE retry_queue
      SET attempts = attempts + 1,
          last_error = ?1,
          scheduled_for_ms = ?2,
          scheduled_for_text = ?3
      WHERE id = ?4
      "#,
    )
    .bind(error)
    .bind(next_ms)
    .bind(epoch_ms_to_iso(next_ms, zone))
    .bind(entry_id)
    .execute(pool)
    .await
    .map_err(|e| format!("mark_queue_failure error: {e}"))?;

    if attempts + 1 >= max_attempts {
        warn!(entry_id, attempts = attempts + 1, error, "Queue entry abandoned");
    }
    Ok(())
}
