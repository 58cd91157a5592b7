//! Row structs and conversions between SQLx records and domain types.
use crate::domain::model::{
    CachedItem, ItemStatus, QueueAction, QueueEntry, Reply, SourceItem, TrackedItem,
};

#[derive(Debug, sqlx::FromRow)]
pub struct TrackedRecord {
    pub item_id: String,
    pub collection: String,
    pub created_at_ms: i64,
    pub first_seen_at_ms: i64,
    pub last_updated_at_ms: i64,
    pub update_count: i64,
    pub status: String,
    pub remote_doc_id: Option<String>,
    pub content_fingerprint: Option<String>,
}

impl TryFrom<TrackedRecord> for TrackedItem {
    type Error = String;

    fn try_from(row: TrackedRecord) -> Result<Self, Self::Error> {
        let status = ItemStatus::parse(&row.status)
            .ok_or_else(|| format!("item {}: unknown status '{}'", row.item_id, row.status))?;
        Ok(TrackedItem {
            item_id: row.item_id,
            collection: row.collection,
            created_at_ms: row.created_at_ms,
            first_seen_at_ms: row.first_seen_at_ms,
            last_updated_at_ms: row.last_updated_at_ms,
            update_count: row.update_count,
            status,
            remote_doc_id: row.remote_doc_id.filter(|d| !d.is_empty()),
            content_fingerprint: row.content_fingerprint.unwrap_or_default(),
        })
    }
}

pub fn tracked_rows(rows: Vec<TrackedRecord>) -> Result<Vec<TrackedItem>, String> {
    rows.into_iter().map(TrackedItem::try_from).collect()
}

#[derive(Debug, sqlx::FromRow)]
pub struct CachedRecord {
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
    pub cached_at_ms: i64,
    pub update_count: i64,
}

#[derive(Debug, sqlx::FromRow)]
pub struct ReplyRecord {
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

impl From<ReplyRecord> for Reply {
    fn from(row: ReplyRecord) -> Self {
        Reply {
            reply_id: row.reply_id,
            author: row.author,
            body: row.body,
            score: row.score,
            created_at_ms: row.created_at_ms,
            parent_id: row.parent_id,
            is_submitter: row.is_submitter,
            edited: row.edited,
            depth: row.depth,
        }
    }
}

impl CachedRecord {
    pub fn into_cached(self, replies: Vec<ReplyRecord>) -> CachedItem {
        CachedItem {
            item: SourceItem {
                item_id: self.item_id,
                collection: self.collection,
                author: self.author,
                title: self.title,
                body: self.body,
                url: self.url,
                permalink: self.permalink,
                score: self.score,
                upvote_ratio: self.upvote_ratio,
                reply_count: self.reply_count,
                created_at_ms: self.created_at_ms,
                edited: self.edited,
                flair: self.flair,
                is_self: self.is_self,
                replies: replies.into_iter().map(Reply::from).collect(),
            },
            cached_at_ms: self.cached_at_ms,
            update_count: self.update_count,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub struct QueueRecord {
    pub id: i64,
    pub item_id: String,
    pub collection: String,
    pub action: String,
    pub priority: i64,
    pub attempts: i64,
    pub max_attempts: i64,
    pub last_error: Option<String>,
    pub created_at_ms: i64,
    pub scheduled_for_ms: i64,
}

impl TryFrom<QueueRecord> for QueueEntry {
    type Error = String;

    fn try_from(row: QueueRecord) -> Result<Self, Self::Error> {
        let action = QueueAction::parse(&row.action)
            .ok_or_else(|| format!("queue entry {}: unknown action '{}'", row.id, row.action))?;
        Ok(QueueEntry {
            id: row.id,
            item_id: row.item_id,
            collection: row.collection,
            action,
            priority: row.priority,
            attempts: row.attempts,
            max_attempts: row.max_attempts,
            last_error: row.last_error,
            created_at_ms: row.created_at_ms,
            scheduled_for_ms: row.scheduled_for_ms,
        })
    }
}
