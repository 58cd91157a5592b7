//! Run-scoped counters, returned to the caller and printed as the run summary.
use std::collections::BTreeMap;

use serde::Serialize;

use crate::ports::repo::StoreStats;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CollectionStats {
    pub fetched: u64,
    pub new: u64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunStats {
    pub mode: String,
    pub started_at_ms: i64,
    pub completed_at_ms: Option<i64>,

    pub items_fetched: u64,
    pub newly_tracked: u64,
    pub documents_ingested: u64,
    pub documents_reingested: u64,
    pub metadata_patched: u64,
    /// Counter bumped below the refresh threshold, no remote call.
    pub accumulated: u64,
    pub skipped_unchanged: u64,
    pub frozen: u64,
    pub deleted: u64,
    pub repaired: u64,
    pub errors: u64,
    pub queued_for_retry: u64,
    pub queue_processed: u64,
    pub queue_failed: u64,
    pub cleaned_up: u64,

    pub failed_collections: Vec<String>,
    pub by_collection: BTreeMap<String, CollectionStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store: Option<StoreStats>,
}

impl RunStats {
    pub fn new(mode: &str, started_at_ms: i64) -> Self {
        Self {
            mode: mode.to_string(),
            started_at_ms,
            ..Self::default()
        }
    }

    pub fn collection(&mut self, name: &str) -> &mut CollectionStats {
        self.by_collection.entry(name.to_string()).or_default()
    }

    pub fn duration_ms(&self) -> Option<i64> {
        self.completed_at_ms.map(|c| c - self.started_at_ms)
    }
}
