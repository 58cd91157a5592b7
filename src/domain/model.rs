use std::path::PathBuf;

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reply {
    pub reply_id: String,
    pub author: String,
    pub body: String,
    pub score: i64,
    pub created_at_ms: i64,
    pub parent_id: String,
    pub is_submitter: bool,
    pub edited: bool,
    pub depth: i64,
}

/// A post as returned by the source, including its reply list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceItem {
    pub item_id: String,
    pub collection: String,
    pub author: String,
    pub title: String,
    pub body: String,
    pub url: String,
    pub permalink: String,
    pub score: i64,
    pub upvote_ratio: f64,
    pub reply_count: i64,
    pub created_at_ms: i64,
    pub edited: bool,
    pub flair: Option<String>,
    pub is_self: bool,
    pub replies: Vec<Reply>,
}

impl SourceItem {
    pub fn age_days(&self, now_ms: i64) -> f64 {
        (now_ms - self.created_at_ms) as f64 / 86_400_000.0
    }

    pub fn within_window(&self, window_days: u32, now_ms: i64) -> bool {
        self.age_days(now_ms) <= window_days as f64
    }
}

/// Latest fetched snapshot of a tracked item; replaced wholesale on every save.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedItem {
    pub item: SourceItem,
    pub cached_at_ms: i64,
    pub update_count: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ItemStatus {
    New,
    Updating,
    Frozen,
}

impl ItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemStatus::New => "new",
            ItemStatus::Updating => "updating",
            ItemStatus::Frozen => "frozen",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "new" => Some(ItemStatus::New),
            "updating" => Some(ItemStatus::Updating),
            "frozen" => Some(ItemStatus::Frozen),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrackedItem {
    pub item_id: String,
    pub collection: String,
    pub created_at_ms: i64,
    pub first_seen_at_ms: i64,
    pub last_updated_at_ms: i64,
    pub update_count: i64,
    pub status: ItemStatus,
    pub remote_doc_id: Option<String>,
    /// Empty means never computed.
    pub content_fingerprint: String,
}

impl TrackedItem {
    /// First sighting: counter at -1 so the next daily cycle lands on 0.
    pub fn first_seen(item: &SourceItem, fingerprint: String, now_ms: i64) -> Self {
        Self {
            item_id: item.item_id.clone(),
            collection: item.collection.clone(),
            created_at_ms: item.created_at_ms,
            first_seen_at_ms: now_ms,
            last_updated_at_ms: now_ms,
            update_count: -1,
            status: ItemStatus::New,
            remote_doc_id: None,
            content_fingerprint: fingerprint,
        }
    }

    pub fn is_frozen(&self) -> bool {
        self.status == ItemStatus::Frozen
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QueueAction {
    Ingest,
    Update,
}

impl QueueAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueAction::Ingest => "ingest",
            QueueAction::Update => "update",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ingest" => Some(QueueAction::Ingest),
            "update" => Some(QueueAction::Update),
            _ => None,
        }
    }

    /// Priority used when the action is enqueued by the pipeline.
    pub fn default_priority(&self) -> i64 {
        match self {
            QueueAction::Ingest => 1,
            QueueAction::Update => 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueueEntry {
    pub id: i64,
    pub item_id: String,
    pub collection: String,
    pub action: QueueAction,
    pub priority: i64,
    pub attempts: i64,
    pub max_attempts: i64,
    pub last_error: Option<String>,
    pub created_at_ms: i64,
    pub scheduled_for_ms: i64,
}

impl QueueEntry {
    pub fn is_abandoned(&self) -> bool {
        self.attempts >= self.max_attempts
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: u64,
    pub jitter: bool,
}

impl RetryPolicy {
    pub const fn none() -> Self {
        Self {
            max_attempts: 1,
            min_delay_ms: 0,
            max_delay_ms: 0,
            multiplier: 1,
            jitter: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SourceConfig {
    pub collections: Vec<String>,
    pub window_hours: u32,
    pub base_url: String,
    pub user_agent: String,
    pub max_replies: usize,
    pub fetch_replies: bool,
    pub requests_per_minute: u32,
    pub min_request_delay_ms: u64,
    pub collection_pause_ms: u64,
    pub window_retry: RetryPolicy,
    pub item_retry: RetryPolicy,
}

impl SourceConfig {
    /// Spacing between source calls: the stricter of the explicit minimum delay and the
    /// per-minute request budget.
    pub fn effective_min_delay_ms(&self) -> u64 {
        let from_budget = if self.requests_per_minute == 0 {
            0
        } else {
            60_000 / u64::from(self.requests_per_minute)
        };
        self.min_request_delay_ms.max(from_budget)
    }
}

#[derive(Debug, Clone)]
pub struct LifecycleConfig {
    pub refresh_at: i64,
    pub freeze_at: i64,
    pub always_reingest_on_refresh: bool,
    pub update_window_days: u32,
    pub retention_days: u32,
    pub update_pause_ms: u64,
}

#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub base_delay_minutes: u64,
    pub max_attempts: i64,
    pub drain_batch: i64,
    pub pause_ms: u64,
}

impl QueueConfig {
    pub fn base_delay_ms(&self) -> i64 {
        (self.base_delay_minutes as i64) * 60_000
    }
}

#[derive(Debug, Clone)]
pub struct DocumentStoreConfig {
    pub base_url: String,
    pub datastore_id: String,
    pub api_key: String,
    pub ingest_retry: RetryPolicy,
    pub reingest_retry: RetryPolicy,
    pub delete_retry: RetryPolicy,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_path: PathBuf,
    pub timezone: Tz,
    pub log_level: String,
    pub source: SourceConfig,
    pub lifecycle: LifecycleConfig,
    pub queue: QueueConfig,
    pub documents: DocumentStoreConfig,
}
