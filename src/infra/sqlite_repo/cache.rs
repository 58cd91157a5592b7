//! Cached item snapshots. Every save replaces the item row and its full reply set.
use chrono_tz::Tz;
use sqlx::SqlitePool;

use crate::domain::model::{CachedItem, SourceItem};
use crate::infra::time::epoch_ms_to_iso;

use super::models::{CachedRecord, ReplyRecord};

pub async fn save_cached(
    pool: &SqlitePool,
    item: &SourceItem,
    update_count: i64,
    cached_at_ms: i64,
    zone: &Tz,
) -> Result<(), String> {
    let mut tx = pool
        .begin()
        .await
        .map_err(|e| format!("save_cached begin error: {e}"))?;

    sqlx::query(
        r#"
      INSERT INTO cached_items(
        item_id, collection, author, title, body, url, permalink,
        score, upvote_ratio, reply_count,
        created_at_ms, created_at_text,
        edited, flair, is_self,
        cached_at_ms, cached_at_text, update_count
      ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)
      ON CONFLICT(item_id) DO UPDATE SET
        collection = excluded.collection,
        author = excluded.author,
        title = excluded.title,
        body = excluded.body,
        url = excluded.url,
        permalink = excluded.permalink,
        score = excluded.score,
        upvote_ratio = excluded.upvote_ratio,
        reply_count = excluded.reply_count,
        created_at_ms = excluded.created_at_ms,
        created_at_text = excluded.created_at_text,
        edited = excluded.edited,
        flair = excluded.flair,
        is_self = excluded.is_self,
        cached_at_ms = excluded.cached_at_ms,
        cached_at_text = excluded.cached_at_text,
        update_count = excluded.update_count
      "#,
    )
    .bind(&item.item_id)
    .bind(&item.collection)
    .bind(&item.author)
    .bind(&item.title)
    .bind(&item.body)
    .bind(&item.url)
    .bind(&item.permalink)
    .bind(item.score)
    .bind(item.upvote_ratio)
    .bind(item.reply_count)
    .bind(item.created_at_ms)
    .bind(epoch_ms_to_iso(item.created_at_ms, zone))
    .bind(item.edited)
    .bind(item.flair.as_deref())
    .bind(item.is_self)
    .bind(cached_at_ms)
    .bind(epoch_ms_to_iso(cached_at_ms, zone))
    .bind(update_count)
    .execute(&mut *tx)
    .await
    .map_err(|e| format!("save_cached item error: {e}"))?;

    sqlx::query("DELETE FROM replies WHERE item_id = ?1")
        .bind(&item.item_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| format!("save_cached clear replies error: {e}"))?;

    for (position, reply) in item.replies.iter().enumerate() {
        sqlx::query(
            r#"
          INSERT INTO replies(
            reply_id, item_id, author, body, score,
            created_at_ms, created_at_text,
            parent_id, is_submitter, edited, depth, position
          ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
          ON CONFLICT(item_id, reply_id) DO NOTHING
          "#,
        )
        .bind(&reply.reply_id)
        .bind(&item.item_id)
        .bind(&reply.author)
        .bind(&reply.body)
        .bind(reply.score)
        .bind(reply.created_at_ms)
        .bind(epoch_ms_to_iso(reply.created_at_ms, zone))
        .bind(&reply.parent_id)
        .bind(reply.is_submitter)
        .bind(reply.edited)
        .bind(reply.depth)
        .bind(position as i64)
        .execute(&mut *tx)
        .await
        .map_err(|e| format!("save_cached reply error: {e}"))?;
    }

    tx.commit()
        .await
        .map_err(|e| format!("save_cached commit error: {e}"))
}

pub async fn get_cached(pool: &SqlitePool, item_id: &str) -> Result<Option<CachedItem>, String> {
    let row = sqlx::query_as::<_, CachedRecord>(
        r#"
      SELECT
        item_id, collection, author, title, body, url, permalink,
        score, upvote_ratio, reply_count, created_at_ms,
        edited, flair, is_self, cached_at_ms, update_count
      FROM cached_items
      WHERE item_id = ?1
      "#,
    )
    .bind(item_id)
    .fetch_optional(pool)
    .await
    .map_err(|e| format!("get_cached error: {e}"))?;

    let Some(row) = row else {
        return Ok(None);
    };

    let replies = sqlx::query_as::<_, ReplyRecord>(
        r#"
      SELECT
        reply_id, author, body, score, created_at_ms,
        parent_id, is_submitter, edited, depth
      FROM replies
      WHERE item_id = ?1
      ORDER BY position ASC
      "#,
    )
    .bind(item_id)
    .fetch_all(pool)
    .await
    .map_err(|e| format!("get_cached replies error: {e}"))?;

    Ok(Some(row.into_cached(replies)))
}
