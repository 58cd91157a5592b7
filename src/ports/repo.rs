//! Repository abstraction for tracking records, cached items with their replies, and the
//! durable retry queue.
use std::collections::HashMap;

use serde::Serialize;

use crate::domain::model::{CachedItem, QueueAction, QueueEntry, SourceItem, TrackedItem};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub total_tracked: i64,
    pub by_status: HashMap<String, i64>,
    pub by_collection: HashMap<String, i64>,
    pub total_replies: i64,
    pub queue_pending: i64,
    pub queue_abandoned: i64,
}

#[async_trait::async_trait]
pub trait Repo: Send + Sync {
    async fn migrate(&self) -> Result<(), String>;

    async fn get_tracked(&self, item_id: &str) -> Result<Option<TrackedItem>, String>;
    /// Insert or update. A `None` doc id never clears an existing one.
    async fn upsert_tracked(&self, item: &TrackedItem) -> Result<(), String>;

    /// Non-frozen items with `update_count < freeze_at`, lowest count then oldest first.
    async fn items_to_advance(&self, freeze_at: i64) -> Result<Vec<TrackedItem>, String>;
    /// Non-frozen items with `update_count >= freeze_at`.
    async fn items_to_freeze(&self, freeze_at: i64) -> Result<Vec<TrackedItem>, String>;
    /// Non-frozen items whose fingerprint was never computed.
    async fn items_missing_fingerprint(&self) -> Result<Vec<TrackedItem>, String>;

    /// Replaces the cached item and its whole reply set.
    async fn save_cached(
        &self,
        item: &SourceItem,
        update_count: i64,
        cached_at_ms: i64,
    ) -> Result<(), String>;
    async fn get_cached(&self, item_id: &str) -> Result<Option<CachedItem>, String>;

    /// Removes the tracking record, the cached item and its replies.
    async fn delete_item(&self, item_id: &str) -> Result<bool, String>;
    /// Bulk-removes items first seen before `cutoff_ms`; returns how many went.
    async fn delete_older_than(&self, cutoff_ms: i64) -> Result<u64, String>;

    /// One pending entry per (item, action); re-enqueueing keeps the higher priority.
    async fn enqueue(
        &self,
        item_id: &str,
        collection: &str,
        action: QueueAction,
        priority: i64,
        max_attempts: i64,
        now_ms: i64,
    ) -> Result<(), String>;
    /// Eligible entries by priority desc, then oldest first.
    async fn eligible_queue_entries(
        &self,
        now_ms: i64,
        limit: i64,
    ) -> Result<Vec<QueueEntry>, String>;
    async fn get_queue_entry(
        &self,
        item_id: &str,
        action: QueueAction,
    ) -> Result<Option<QueueEntry>, String>;
    async fn mark_queue_success(&self, entry_id: i64) -> Result<(), String>;
    async fn mark_queue_failure(
        &self,
        entry_id: i64,
        error: &str,
        now_ms: i64,
        base_delay_ms: i64,
    ) -> Result<(), String>;

    async fn stats(&self) -> Result<StoreStats, String>;
}
