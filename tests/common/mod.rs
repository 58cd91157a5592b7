#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono_tz::Tz;
use postmirror::app::context::AppContext;
use postmirror::app::pipeline::Pipeline;
use postmirror::domain::document::DocumentContent;
use postmirror::domain::error::FetchError;
use postmirror::domain::model::{
    AppConfig, DocumentStoreConfig, LifecycleConfig, QueueConfig, Reply, RetryPolicy,
    SourceConfig, SourceItem,
};
use postmirror::infra::clock::ManualClock;
use postmirror::infra::random::MutexRng;
use postmirror::infra::sqlite_repo::SqliteRepo;
use postmirror::ports::documents::DocumentStore;
use postmirror::ports::repo::Repo;
use postmirror::ports::source::SourceFetcher;
use serde_json::{Map, Value};

pub const DAY_MS: i64 = 86_400_000;
/// 2025-01-06T12:00:00Z
pub const T0: i64 = 1_736_164_800_000;

pub fn reply(id: &str, body: &str, score: i64) -> Reply {
    Reply {
        reply_id: id.to_string(),
        author: format!("user_{id}"),
        body: body.to_string(),
        score,
        created_at_ms: T0 - 1_800_000,
        parent_id: "t3_abc".to_string(),
        is_submitter: false,
        edited: false,
        depth: 0,
    }
}

pub fn item(id: &str, collection: &str) -> SourceItem {
    SourceItem {
        item_id: id.to_string(),
        collection: collection.to_string(),
        author: "poster".to_string(),
        title: format!("Post {id}"),
        body: "Some body text".to_string(),
        url: format!("https://reddit.com/r/{collection}/comments/{id}/post/"),
        permalink: format!("/r/{collection}/comments/{id}/post/"),
        score: 10,
        upvote_ratio: 0.9,
        reply_count: 2,
        created_at_ms: T0 - 3_600_000,
        edited: false,
        flair: None,
        is_self: true,
        replies: vec![reply("c1", "first", 5), reply("c2", "second", 3)],
    }
}

pub fn test_config() -> AppConfig {
    AppConfig {
        db_path: ":memory:".into(),
        timezone: chrono_tz::UTC,
        log_level: "info".to_string(),
        source: SourceConfig {
            collections: vec!["rust".to_string()],
            window_hours: 26,
            base_url: "http://localhost".to_string(),
            user_agent: "test".to_string(),
            max_replies: 100,
            fetch_replies: true,
            requests_per_minute: 0,
            min_request_delay_ms: 0,
            collection_pause_ms: 0,
            window_retry: RetryPolicy::none(),
            item_retry: RetryPolicy::none(),
        },
        lifecycle: LifecycleConfig {
            refresh_at: 0,
            freeze_at: 2,
            always_reingest_on_refresh: false,
            update_window_days: 2,
            retention_days: 30,
            update_pause_ms: 0,
        },
        queue: QueueConfig {
            base_delay_minutes: 5,
            max_attempts: 5,
            drain_batch: 50,
            pause_ms: 0,
        },
        documents: DocumentStoreConfig {
            base_url: "http://localhost".to_string(),
            datastore_id: "ds".to_string(),
            api_key: "key".to_string(),
            ingest_retry: RetryPolicy::none(),
            reingest_retry: RetryPolicy::none(),
            delete_retry: RetryPolicy::none(),
        },
    }
}

/// Source whose listing and single-item answers are set by the test.
#[derive(Default)]
pub struct FakeSource {
    pub listing: Mutex<HashMap<String, Vec<SourceItem>>>,
    pub items: Mutex<HashMap<String, SourceItem>>,
    pub failing_collections: Mutex<Vec<String>>,
    pub failing_items: Mutex<Vec<String>>,
    pub fetch_one_calls: AtomicU64,
}

impl FakeSource {
    /// Puts the item in its collection's listing and makes it fetchable by id.
    pub fn publish(&self, item: SourceItem) {
        let mut listing = self.listing.lock().unwrap();
        let list = listing.entry(item.collection.clone()).or_default();
        list.retain(|i| i.item_id != item.item_id);
        list.push(item.clone());
        self.items.lock().unwrap().insert(item.item_id.clone(), item);
    }

    /// Updates what a single-item fetch returns without touching the listing.
    pub fn set_current(&self, item: SourceItem) {
        self.items.lock().unwrap().insert(item.item_id.clone(), item);
    }

    pub fn remove(&self, item_id: &str) {
        self.items.lock().unwrap().remove(item_id);
        for list in self.listing.lock().unwrap().values_mut() {
            list.retain(|i| i.item_id != item_id);
        }
    }

    pub fn fail_item(&self, item_id: &str) {
        self.failing_items.lock().unwrap().push(item_id.to_string());
    }

    pub fn heal_item(&self, item_id: &str) {
        self.failing_items.lock().unwrap().retain(|i| i != item_id);
    }

    pub fn clear_listing(&self) {
        self.listing.lock().unwrap().clear();
    }

    pub fn fetch_one_count(&self) -> u64 {
        self.fetch_one_calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl SourceFetcher for FakeSource {
    async fn fetch_window(
        &self,
        collection: &str,
        _window_hours: u32,
    ) -> Result<Vec<SourceItem>, FetchError> {
        if self
            .failing_collections
            .lock()
            .unwrap()
            .iter()
            .any(|c| c == collection)
        {
            return Err(FetchError::Transient(format!("{collection} down")));
        }
        Ok(self
            .listing
            .lock()
            .unwrap()
            .get(collection)
            .cloned()
            .unwrap_or_default())
    }

    async fn fetch_one(&self, item_id: &str) -> Result<Option<SourceItem>, FetchError> {
        self.fetch_one_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing_items.lock().unwrap().iter().any(|i| i == item_id) {
            return Err(FetchError::Transient(format!("{item_id} timed out")));
        }
        Ok(self.items.lock().unwrap().get(item_id).cloned())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DocCall {
    Ingest(String),
    Patch(String),
    Delete(String),
}

/// Document store that records every call and hands out sequential ids.
#[derive(Default)]
pub struct FakeDocuments {
    pub calls: Mutex<Vec<DocCall>>,
    pub ingest_failures: Mutex<VecDeque<String>>,
    pub fail_patches: Mutex<bool>,
    pub fail_deletes: Mutex<bool>,
    pub last_metadata: Mutex<Option<Map<String, Value>>>,
    next_id: AtomicU64,
}

impl FakeDocuments {
    pub fn fail_next_ingests(&self, n: usize) {
        let mut q = self.ingest_failures.lock().unwrap();
        for _ in 0..n {
            q.push_back("HTTP 503".to_string());
        }
    }

    pub fn calls(&self) -> Vec<DocCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.calls.lock().unwrap().clear();
    }

    pub fn count(&self, f: impl Fn(&DocCall) -> bool) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| f(*c)).count()
    }
}

#[async_trait::async_trait]
impl DocumentStore for FakeDocuments {
    async fn ingest(&self, doc: &DocumentContent) -> Result<String, String> {
        self.calls
            .lock()
            .unwrap()
            .push(DocCall::Ingest(doc.name.clone()));
        if let Some(e) = self.ingest_failures.lock().unwrap().pop_front() {
            return Err(e);
        }
        let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("doc-{n}"))
    }

    async fn patch_metadata(&self, doc_id: &str, metadata: &Map<String, Value>) -> bool {
        self.calls
            .lock()
            .unwrap()
            .push(DocCall::Patch(doc_id.to_string()));
        *self.last_metadata.lock().unwrap() = Some(metadata.clone());
        !*self.fail_patches.lock().unwrap()
    }

    async fn delete(&self, doc_id: &str) -> bool {
        self.calls
            .lock()
            .unwrap()
            .push(DocCall::Delete(doc_id.to_string()));
        !*self.fail_deletes.lock().unwrap()
    }
}

pub type TestPipeline = Pipeline<SqliteRepo, FakeSource, FakeDocuments, ManualClock, MutexRng>;

pub struct Harness {
    pub pipeline: TestPipeline,
    pub repo: Arc<SqliteRepo>,
    pub source: Arc<FakeSource>,
    pub docs: Arc<FakeDocuments>,
    pub clock: Arc<ManualClock>,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_config(test_config()).await
    }

    pub async fn with_config(cfg: AppConfig) -> Self {
        let zone: Tz = cfg.timezone;
        let repo = Arc::new(SqliteRepo::in_memory(zone).await.unwrap());
        repo.migrate().await.unwrap();
        let source = Arc::new(FakeSource::default());
        let docs = Arc::new(FakeDocuments::default());
        let clock = Arc::new(ManualClock::new(T0));
        let ctx = AppContext {
            cfg,
            repo: repo.clone(),
            source: source.clone(),
            documents: docs.clone(),
            clock: clock.clone(),
            rng: Arc::new(MutexRng::from_seed(7)),
        };
        Self {
            pipeline: Pipeline::new(ctx),
            repo,
            source,
            docs,
            clock,
        }
    }

    pub fn next_day(&self) {
        self.clock.advance_ms(DAY_MS);
    }
}
