//! SQLite-backed `Repo`. Query code lives in the submodules; this type only owns the
//! pool and the timezone used for the human-readable timestamp columns.
mod cache;
mod connection;
mod items;
mod migrations;
mod models;
mod queue;
mod stats;

use std::path::Path;

use chrono_tz::Tz;
use sqlx::SqlitePool;

use crate::domain::model::{CachedItem, QueueAction, QueueEntry, SourceItem, TrackedItem};
use crate::ports::repo::{Repo, StoreStats};

pub struct SqliteRepo {
    pool: SqlitePool,
    zone: Tz,
}

impl SqliteRepo {
    pub async fn new(db_path: &Path, zone: Tz) -> Result<Self, String> {
        let pool = connection::create_pool(db_path).await?;
        Ok(Self { pool, zone })
    }

    pub async fn in_memory(zone: Tz) -> Result<Self, String> {
        let pool = connection::create_memory_pool().await?;
        Ok(Self { pool, zone })
    }

    /// Migrated on-disk store, or an empty in-memory one when the run must leave the
    /// database file untouched.
    pub async fn open(db_path: &Path, zone: Tz, on_disk: bool) -> Result<Self, String> {
        if !on_disk {
            return Self::in_memory(zone).await;
        }
        let repo = Self::new(db_path, zone).await?;
        repo.migrate().await?;
        Ok(repo)
    }
}

#[async_trait::async_trait]
impl Repo for SqliteRepo {
    async fn migrate(&self) -> Result<(), String> {
        migrations::migrate(&self.pool).await
    }

    async fn get_tracked(&self, item_id: &str) -> Result<Option<TrackedItem>, String> {
        items::get_tracked(&self.pool, item_id).await
    }

    async fn upsert_tracked(&self, item: &TrackedItem) -> Result<(), String> {
        items::upsert_tracked(&self.pool, item, &self.zone).await
    }

    async fn items_to_advance(&self, freeze_at: i64) -> Result<Vec<TrackedItem>, String> {
        items::items_to_advance(&self.pool, freeze_at).await
    }

    async fn items_to_freeze(&self, freeze_at: i64) -> Result<Vec<TrackedItem>, String> {
        items::items_to_freeze(&self.pool, freeze_at).await
    }

    async fn items_missing_fingerprint(&self) -> Result<Vec<TrackedItem>, String> {
        items::items_missing_fingerprint(&self.pool).await
    }

    async fn save_cached(
        &self,
        item: &SourceItem,
        update_count: i64,
        cached_at_ms: i64,
    ) -> Result<(), String> {
        cache::save_cached(&self.pool, item, update_count, cached_at_ms, &self.zone).await
    }

    async fn get_cached(&self, item_id: &str) -> Result<Option<CachedItem>, String> {
        cache::get_cached(&self.pool, item_id).await
    }

    async fn delete_item(&self, item_id: &str) -> Result<bool, String> {
        items::delete_item(&self.pool, item_id).await
    }

    async fn delete_older_than(&self, cutoff_ms: i64) -> Result<u64, String> {
        items::delete_older_than(&self.pool, cutoff_ms).await
    }

    async fn enqueue(
        &self,
        item_id: &str,
        collection: &str,
        action: QueueAction,
        priority: i64,
        max_attempts: i64,
        now_ms: i64,
    ) -> Result<(), String> {
        queue::enqueue(
            &self.pool,
            item_id,
            collection,
            action,
            priority,
            max_attempts,
            now_ms,
            &self.zone,
        )
        .await
    }

    async fn eligible_queue_entries(
        &self,
        now_ms: i64,
        limit: i64,
    ) -> Result<Vec<QueueEntry>, String> {
        queue::eligible(&self.pool, now_ms, limit).await
    }

    async fn get_queue_entry(
        &self,
        item_id: &str,
        action: QueueAction,
    ) -> Result<Option<QueueEntry>, String> {
        queue::get_entry(&self.pool, item_id, action).await
    }

    async fn mark_queue_success(&self, entry_id: i64) -> Result<(), String> {
        queue::mark_success(&self.pool, entry_id).await
    }

    async fn mark_queue_failure(
        &self,
        entry_id: i64,
        error: &str,
        now_ms: i64,
        base_delay_ms: i64,
    ) -> Result<(), String> {
        queue::mark_failure(&self.pool, entry_id, error, now_ms, base_delay_ms, &self.zone).await
    }

    async fn stats(&self) -> Result<StoreStats, String> {
        stats::store_stats(&self.pool).await
    }
}
