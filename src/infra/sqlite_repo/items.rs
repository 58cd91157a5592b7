//! Tracking records: lookup, upsert, the per-phase selection queries and deletion.
use chrono_tz::Tz;
use sqlx::SqlitePool;
use tracing::info;

use crate::domain::model::{ItemStatus, TrackedItem};
use crate::infra::time::epoch_ms_to_iso;

use super::models::{tracked_rows, TrackedRecord};

const TRACKED_COLUMNS: &str = r#"
        item_id,
        collection,
        created_at_ms,
        first_seen_at_ms,
        last_updated_at_ms,
        update_count,
        status,
        remote_doc_id,
        content_fingerprint
"#;

pub async fn get_tracked(pool: &SqlitePool, item_id: &str) -> Result<Option<TrackedItem>, String> {
    let sql = format!("SELECT {TRACKED_COLUMNS} FROM tracked_items WHERE item_id = ?1");
    let row = sqlx::query_as::<_, TrackedRecord>(&sql)
        .bind(item_id)
        .fetch_optional(pool)
        .await
        .map_err(|e| format!("get_tracked error: {e}"))?;
    row.map(TrackedItem::try_from).transpose()
}

pub async fn upsert_tracked(pool: &SqlitePool, item: &TrackedItem, zone: &Tz) -> Result<(), String> {
    sqlx::query(
        r#"
      INSERT INTO tracked_items(
        item_id, collection,
        created_at_ms, created_at_text,
        first_seen_at_ms, first_seen_at_text,
        last_updated_at_ms, last_updated_at_text,
        update_count, status, remote_doc_id, content_fingerprint
      ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
      ON CONFLICT(item_id) DO UPDATE SET
        collection = excluded.collection,
        last_updated_at_ms = excluded.last_updated_at_ms,
        last_updated_at_text = excluded.last_updated_at_text,
        update_count = excluded.update_count,
        status = excluded.status,
        remote_doc_id = COALESCE(excluded.remote_doc_id, tracked_items.remote_doc_id),
        content_fingerprint = excluded.content_fingerprint
      "#,
    )
    .bind(&item.item_id)
    .bind(&item.collection)
    .bind(item.created_at_ms)
    .bind(epoch_ms_to_iso(item.created_at_ms, zone))
    .bind(item.first_seen_at_ms)
    .bind(epoch_ms_to_iso(item.first_seen_at_ms, zone))
    .bind(item.last_updated_at_ms)
    .bind(epoch_ms_to_iso(item.last_updated_at_ms, zone))
    .bind(item.update_count)
    .bind(item.status.as_str())
    .bind(item.remote_doc_id.as_deref())
    .bind(&item.content_fingerprint)
    .execute(pool)
    .await
    .map_err(|e| format!("upsert_tracked error: {e}"))?;
    Ok(())
}

pub async fn items_to_advance(pool: &SqlitePool, freeze_at: i64) -> Result<Vec<TrackedItem>, String> {
    let sql = format!(
        "SELECT {TRACKED_COLUMNS} FROM tracked_items
         WHERE status != ?1 AND update_count < ?2
         ORDER BY update_count ASC, first_seen_at_ms ASC"
    );
    let rows = sqlx::query_as::<_, TrackedRecord>(&sql)
        .bind(ItemStatus::Frozen.as_str())
        .bind(freeze_at)
        .fetch_all(pool)
        .await
        .map_err(|e| format!("items_to_advance error: {e}"))?;
    tracked_rows(rows)
}

pub async fn items_to_freeze(pool: &SqlitePool, freeze_at: i64) -> Result<Vec<TrackedItem>, String> {
    let sql = format!(
        "SELECT {TRACKED_COLUMNS} FROM tracked_items
         WHERE status != ?1 AND update_count >= ?2
         ORDER BY first_seen_at_ms ASC"
    );
    let rows = sqlx::query_as::<_, TrackedRecord>(&sql)
        .bind(ItemStatus::Frozen.as_str())
        .bind(freeze_at)
        .fetch_all(pool)
        .await
        .map_err(|e| format!("items_to_freeze error: {e}"))?;
    tracked_rows(rows)
}

pub async fn items_missing_fingerprint(pool: &SqlitePool) -> Result<Vec<TrackedItem>, String> {
    let sql = format!(
        "SELECT {TRACKED_COLUMNS} FROM tracked_items
         WHERE (content_fingerprint IS NULL OR content_fingerprint = '') AND status != ?1
         ORDER BY first_seen_at_ms ASC"
    );
    let rows = sqlx::query_as::<_, TrackedRecord>(&sql)
        .bind(ItemStatus::Frozen.as_str())
        .fetch_all(pool)
        .await
        .map_err(|e| format!("items_missing_fingerprint error: {e}"))?;
    tracked_rows(rows)
}

pub async fn delete_item(pool: &SqlitePool, item_id: &str) -> Result<bool, String> {
    let mut tx = pool
        .begin()
        .await
        .map_err(|e| format!("delete_item begin error: {e}"))?;

    for sql in [
        "DELETE FROM replies WHERE item_id = ?1",
        "DELETE FROM cached_items WHERE item_id = ?1",
        "DELETE FROM retry_queue WHERE item_id = ?1",
    ] {
        sqlx::query(sql)
            .bind(item_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| format!("delete_item error: {e}"))?;
    }
    let res = sqlx::query("DELETE FROM tracked_items WHERE item_id = ?1")
        .bind(item_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| format!("delete_item error: {e}"))?;

    tx.commit()
        .await
        .map_err(|e| format!("delete_item commit error: {e}"))?;

    let deleted = res.rows_affected() > 0;
    if deleted {
        info!(item_id, "Item removed from store");
    }
    Ok(deleted)
}

pub async fn delete_older_than(pool: &SqlitePool, cutoff_ms: i64) -> Result<u64, String> {
    let mut tx = pool
        .begin()
        .await
        .map_err(|e| format!("delete_older_than begin error: {e}"))?;

    for sql in [
        "DELETE FROM replies WHERE item_id IN (
           SELECT item_id FROM tracked_items WHERE first_seen_at_ms < ?1)",
        "DELETE FROM cached_items WHERE item_id IN (
           SELECT item_id FROM tracked_items WHERE first_seen_at_ms < ?1)",
        "DELETE FROM retry_queue WHERE item_id IN (
           SELECT item_id FROM tracked_items WHERE first_seen_at_ms < ?1)",
    ] {
        sqlx::query(sql)
            .bind(cutoff_ms)
            .execute(&mut *tx)
            .await
            .map_err(|e| format!("delete_older_than error: {e}"))?;
    }
    let res = sqlx::query("DELETE FROM tracked_items WHERE first_seen_at_ms < ?1")
        .bind(cutoff_ms)
        .execute(&mut *tx)
        .await
        .map_err(|e| format!("delete_older_than error: {e}"))?;

    tx.commit()
        .await
        .map_err(|e| format!("delete_older_than commit error: {e}"))?;
    Ok(res.rows_affected())
}
