mod common;

use std::sync::Arc;

use common::*;
use postmirror::app::context::AppContext;
use postmirror::app::pipeline::{Pipeline, RunMode};
use postmirror::domain::error::SyncError;
use postmirror::domain::fingerprint::fingerprint;
use postmirror::domain::model::{ItemStatus, QueueAction, RetryPolicy, TrackedItem};
use postmirror::infra::clock::ManualClock;
use postmirror::infra::random::MutexRng;
use postmirror::infra::sqlite_repo::SqliteRepo;
use postmirror::ports::repo::Repo;

const FIVE_MIN_MS: i64 = 5 * 60_000;

async fn tracked(h: &Harness, id: &str) -> TrackedItem {
    h.repo.get_tracked(id).await.unwrap().expect("tracked")
}

#[tokio::test]
async fn new_item_is_tracked_cached_and_ingested() {
    let h = Harness::new().await;
    h.source.publish(item("abc", "rust"));

    let stats = h.pipeline.run(RunMode::Full).await.unwrap();

    let t = tracked(&h, "abc").await;
    assert_eq!(t.update_count, -1);
    assert_eq!(t.status, ItemStatus::New);
    assert_eq!(t.remote_doc_id.as_deref(), Some("doc-1"));
    assert_eq!(t.content_fingerprint, fingerprint(&item("abc", "rust")));

    let cached = h.repo.get_cached("abc").await.unwrap().expect("cached");
    assert_eq!(cached.item.replies.len(), 2);

    assert_eq!(h.docs.calls(), vec![DocCall::Ingest("post_abc".into())]);
    assert_eq!(stats.newly_tracked, 1);
    assert_eq!(stats.documents_ingested, 1);
    assert_eq!(stats.by_collection["rust"].new, 1);
    assert_eq!(stats.errors, 0);
    assert_eq!(h.source.fetch_one_count(), 0);
    let store = stats.store.expect("store totals");
    assert_eq!(store.total_tracked, 1);
    assert_eq!(store.total_replies, 2);
}

#[tokio::test]
async fn lifecycle_accumulates_refreshes_then_freezes() {
    let h = Harness::new().await;
    h.source.publish(item("abc", "rust"));
    h.pipeline.run(RunMode::Full).await.unwrap();

    // Day 1: below the refresh threshold, no remote calls.
    h.next_day();
    h.docs.clear();
    let stats = h.pipeline.run(RunMode::Full).await.unwrap();
    assert_eq!(tracked(&h, "abc").await.update_count, 0);
    assert_eq!(stats.accumulated, 1);
    assert_eq!(h.source.fetch_one_count(), 0);
    assert!(h.docs.calls().is_empty());

    // Day 2: refresh check, nothing changed.
    h.next_day();
    let stats = h.pipeline.run(RunMode::Full).await.unwrap();
    assert_eq!(tracked(&h, "abc").await.update_count, 1);
    assert_eq!(stats.skipped_unchanged, 1);
    assert_eq!(h.source.fetch_one_count(), 1);
    assert!(h.docs.calls().is_empty());

    // Day 3: last refresh, then frozen by the sweep.
    h.next_day();
    let stats = h.pipeline.run(RunMode::Full).await.unwrap();
    let t = tracked(&h, "abc").await;
    assert_eq!(t.update_count, 2);
    assert_eq!(t.status, ItemStatus::Frozen);
    assert_eq!(stats.frozen, 1);
    assert!(h.repo.items_to_advance(2).await.unwrap().is_empty());

    // Frozen items are never fetched again.
    h.next_day();
    let before = h.source.fetch_one_count();
    h.pipeline.run(RunMode::Full).await.unwrap();
    assert_eq!(h.source.fetch_one_count(), before);
    assert_eq!(tracked(&h, "abc").await.update_count, 2);
}

#[tokio::test]
async fn same_day_repeat_run_changes_nothing() {
    let h = Harness::new().await;
    h.source.publish(item("abc", "rust"));
    h.pipeline.run(RunMode::Full).await.unwrap();
    h.next_day();
    h.pipeline.run(RunMode::Full).await.unwrap();

    h.docs.clear();
    let fetches = h.source.fetch_one_count();
    let stats = h.pipeline.run(RunMode::Full).await.unwrap();

    assert_eq!(tracked(&h, "abc").await.update_count, 0);
    assert_eq!(stats.accumulated, 0);
    assert_eq!(stats.newly_tracked, 0);
    assert_eq!(h.source.fetch_one_count(), fetches);
    assert!(h.docs.calls().is_empty());
}

#[tokio::test]
async fn score_change_only_patches_metadata_once() {
    let h = Harness::new().await;
    h.source.publish(item("abc", "rust"));
    h.pipeline.run(RunMode::Full).await.unwrap();
    h.next_day();
    h.pipeline.run(RunMode::Full).await.unwrap();

    let mut changed = item("abc", "rust");
    changed.score = 50;
    changed.reply_count = 7;
    h.source.set_current(changed);
    h.next_day();
    h.docs.clear();
    let stats = h.pipeline.run(RunMode::Full).await.unwrap();

    assert_eq!(h.docs.calls(), vec![DocCall::Patch("doc-1".into())]);
    assert_eq!(stats.metadata_patched, 1);
    let md = h.docs.last_metadata.lock().unwrap().clone().expect("metadata");
    assert_eq!(md["score"], 50);
    assert_eq!(md["num_comments"], 7);

    let t = tracked(&h, "abc").await;
    assert_eq!(t.remote_doc_id.as_deref(), Some("doc-1"));
    assert_eq!(t.status, ItemStatus::New);
    let cached = h.repo.get_cached("abc").await.unwrap().expect("cached");
    assert_eq!(cached.item.score, 50);
}

#[tokio::test]
async fn content_change_replaces_the_document() {
    let h = Harness::new().await;
    h.source.publish(item("abc", "rust"));
    h.pipeline.run(RunMode::Full).await.unwrap();
    h.next_day();
    h.pipeline.run(RunMode::Full).await.unwrap();

    let mut changed = item("abc", "rust");
    changed.replies.push(reply("c3", "late reply", 1));
    let expected_fp = fingerprint(&changed);
    h.source.set_current(changed);
    h.next_day();
    h.docs.clear();
    let stats = h.pipeline.run(RunMode::Full).await.unwrap();

    assert_eq!(
        h.docs.calls(),
        vec![
            DocCall::Delete("doc-1".into()),
            DocCall::Ingest("post_abc".into())
        ]
    );
    assert_eq!(stats.documents_reingested, 1);
    let t = tracked(&h, "abc").await;
    assert_eq!(t.remote_doc_id.as_deref(), Some("doc-2"));
    assert_eq!(t.status, ItemStatus::Updating);
    assert_eq!(t.content_fingerprint, expected_fp);
    assert_eq!(t.update_count, 1);
}

#[tokio::test]
async fn always_reingest_ignores_the_fingerprint() {
    let mut cfg = test_config();
    cfg.lifecycle.always_reingest_on_refresh = true;
    let h = Harness::with_config(cfg).await;
    h.source.publish(item("abc", "rust"));
    h.pipeline.run(RunMode::Full).await.unwrap();
    h.next_day();
    h.pipeline.run(RunMode::Full).await.unwrap();

    h.next_day();
    h.docs.clear();
    h.pipeline.run(RunMode::Full).await.unwrap();

    assert_eq!(h.docs.count(|c| matches!(c, DocCall::Ingest(_))), 1);
    assert_eq!(h.docs.count(|c| matches!(c, DocCall::Delete(_))), 1);
}

#[tokio::test]
async fn failed_patch_keeps_old_snapshot_and_retries_next_cycle() {
    let h = Harness::new().await;
    h.source.publish(item("abc", "rust"));
    h.pipeline.run(RunMode::Full).await.unwrap();
    h.next_day();
    h.pipeline.run(RunMode::Full).await.unwrap();

    let mut changed = item("abc", "rust");
    changed.score = 99;
    h.source.set_current(changed);
    *h.docs.fail_patches.lock().unwrap() = true;
    h.next_day();
    let stats = h.pipeline.run(RunMode::Full).await.unwrap();

    assert_eq!(stats.errors, 1);
    assert_eq!(stats.metadata_patched, 0);
    assert_eq!(tracked(&h, "abc").await.update_count, 1);
    let cached = h.repo.get_cached("abc").await.unwrap().expect("cached");
    assert_eq!(cached.item.score, 10);

    *h.docs.fail_patches.lock().unwrap() = false;
    h.next_day();
    h.docs.clear();
    let stats = h.pipeline.run(RunMode::Full).await.unwrap();
    assert_eq!(h.docs.calls(), vec![DocCall::Patch("doc-1".into())]);
    assert_eq!(stats.metadata_patched, 1);
}

#[tokio::test]
async fn item_gone_upstream_is_removed_everywhere() {
    let h = Harness::new().await;
    h.source.publish(item("abc", "rust"));
    h.pipeline.run(RunMode::Full).await.unwrap();
    h.repo
        .enqueue("abc", "rust", QueueAction::Update, 0, 5, T0 + 10 * DAY_MS)
        .await
        .unwrap();
    h.next_day();
    h.pipeline.run(RunMode::Full).await.unwrap();

    h.source.remove("abc");
    h.next_day();
    h.docs.clear();
    let stats = h.pipeline.run(RunMode::Full).await.unwrap();

    assert_eq!(h.docs.calls(), vec![DocCall::Delete("doc-1".into())]);
    assert_eq!(stats.deleted, 1);
    assert!(h.repo.get_tracked("abc").await.unwrap().is_none());
    assert!(h.repo.get_cached("abc").await.unwrap().is_none());
    assert!(h
        .repo
        .get_queue_entry("abc", QueueAction::Update)
        .await
        .unwrap()
        .is_none());
    assert_eq!(stats.store.expect("store").total_replies, 0);
}

#[tokio::test]
async fn refused_remote_delete_still_removes_local_records() {
    let mut cfg = test_config();
    cfg.documents.delete_retry = RetryPolicy {
        max_attempts: 2,
        min_delay_ms: 0,
        max_delay_ms: 0,
        multiplier: 2,
        jitter: false,
    };
    let h = Harness::with_config(cfg).await;
    h.source.publish(item("abc", "rust"));
    h.pipeline.run(RunMode::Full).await.unwrap();
    h.repo
        .enqueue("abc", "rust", QueueAction::Update, 0, 5, T0 + 10 * DAY_MS)
        .await
        .unwrap();
    h.next_day();
    h.pipeline.run(RunMode::Full).await.unwrap();

    h.source.remove("abc");
    *h.docs.fail_deletes.lock().unwrap() = true;
    h.next_day();
    h.docs.clear();
    let stats = h.pipeline.run(RunMode::UpdateOnly).await.unwrap();

    assert_eq!(
        h.docs.calls(),
        vec![DocCall::Delete("doc-1".into()), DocCall::Delete("doc-1".into())]
    );
    assert_eq!(stats.deleted, 1);
    assert_eq!(stats.errors, 0);
    assert!(h.repo.get_tracked("abc").await.unwrap().is_none());
    assert!(h.repo.get_cached("abc").await.unwrap().is_none());
    assert!(h
        .repo
        .get_queue_entry("abc", QueueAction::Update)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn failed_ingest_is_healed_by_the_closing_queue_drain() {
    let h = Harness::new().await;
    h.source.publish(item("abc", "rust"));
    h.docs.fail_next_ingests(1);

    let stats = h.pipeline.run(RunMode::Full).await.unwrap();

    assert_eq!(stats.errors, 1);
    assert_eq!(stats.queued_for_retry, 1);
    assert_eq!(stats.queue_processed, 1);
    assert_eq!(stats.documents_ingested, 1);
    assert_eq!(tracked(&h, "abc").await.remote_doc_id.as_deref(), Some("doc-1"));
    assert!(h
        .repo
        .get_queue_entry("abc", QueueAction::Ingest)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn queue_entry_backs_off_until_due() {
    let h = Harness::new().await;
    h.source.publish(item("abc", "rust"));
    h.docs.fail_next_ingests(2);

    let stats = h.pipeline.run(RunMode::Full).await.unwrap();
    assert_eq!(stats.queue_failed, 1);
    assert_eq!(stats.errors, 2);

    let entry = h
        .repo
        .get_queue_entry("abc", QueueAction::Ingest)
        .await
        .unwrap()
        .expect("queued");
    assert_eq!(entry.attempts, 1);
    assert_eq!(entry.priority, 1);
    assert_eq!(entry.scheduled_for_ms, T0 + FIVE_MIN_MS);
    assert_eq!(entry.last_error.as_deref(), Some("document store: HTTP 503"));

    // Not due yet.
    h.clock.advance_ms(FIVE_MIN_MS - 1);
    let stats = h.pipeline.run(RunMode::QueueOnly).await.unwrap();
    assert_eq!(stats.queue_processed, 0);
    assert!(tracked(&h, "abc").await.remote_doc_id.is_none());

    h.clock.advance_ms(1);
    let stats = h.pipeline.run(RunMode::QueueOnly).await.unwrap();
    assert_eq!(stats.queue_processed, 1);
    assert_eq!(tracked(&h, "abc").await.remote_doc_id.as_deref(), Some("doc-1"));
    assert_eq!(stats.store.expect("store").queue_pending, 0);
}

#[tokio::test]
async fn failed_refresh_is_queued_as_update_without_advancing() {
    let h = Harness::new().await;
    h.source.publish(item("abc", "rust"));
    h.pipeline.run(RunMode::Full).await.unwrap();
    h.next_day();
    h.pipeline.run(RunMode::Full).await.unwrap();

    h.source.fail_item("abc");
    h.next_day();
    let stats = h.pipeline.run(RunMode::Full).await.unwrap();

    assert_eq!(stats.queued_for_retry, 1);
    assert_eq!(stats.queue_failed, 1);
    assert_eq!(tracked(&h, "abc").await.update_count, 0);
    let entry = h
        .repo
        .get_queue_entry("abc", QueueAction::Update)
        .await
        .unwrap()
        .expect("queued");
    assert_eq!(entry.attempts, 1);
    assert_eq!(entry.priority, 0);

    h.source.heal_item("abc");
    h.clock.advance_ms(FIVE_MIN_MS);
    let stats = h.pipeline.run(RunMode::QueueOnly).await.unwrap();
    assert_eq!(stats.queue_processed, 1);
    assert_eq!(tracked(&h, "abc").await.update_count, 1);
    assert!(h
        .repo
        .get_queue_entry("abc", QueueAction::Update)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn missing_fingerprint_is_repaired_without_advancing() {
    let h = Harness::new().await;
    let current = item("abc", "rust");
    h.source.set_current(current.clone());
    h.repo
        .upsert_tracked(&TrackedItem {
            item_id: "abc".into(),
            collection: "rust".into(),
            created_at_ms: current.created_at_ms,
            first_seen_at_ms: T0 - DAY_MS,
            last_updated_at_ms: T0 - DAY_MS,
            update_count: 0,
            status: ItemStatus::New,
            remote_doc_id: Some("old-doc".into()),
            content_fingerprint: String::new(),
        })
        .await
        .unwrap();

    let stats = h.pipeline.run(RunMode::Full).await.unwrap();

    assert_eq!(stats.repaired, 1);
    assert_eq!(
        h.docs.calls(),
        vec![
            DocCall::Delete("old-doc".into()),
            DocCall::Ingest("post_abc".into())
        ]
    );
    let t = tracked(&h, "abc").await;
    assert_eq!(t.content_fingerprint, fingerprint(&current));
    assert_eq!(t.remote_doc_id.as_deref(), Some("doc-1"));
    assert_eq!(t.update_count, 0);
    assert!(h.repo.items_missing_fingerprint().await.unwrap().is_empty());
}

#[tokio::test]
async fn items_older_than_the_update_window_are_not_tracked() {
    let h = Harness::new().await;
    let mut old = item("old", "rust");
    old.created_at_ms = T0 - 3 * DAY_MS;
    h.source.publish(old);
    h.source.publish(item("fresh", "rust"));

    let stats = h.pipeline.run(RunMode::ScrapeOnly).await.unwrap();

    assert_eq!(stats.items_fetched, 2);
    assert_eq!(stats.newly_tracked, 1);
    assert!(h.repo.get_tracked("old").await.unwrap().is_none());
    assert!(h.repo.get_tracked("fresh").await.unwrap().is_some());
}

#[tokio::test]
async fn failing_collection_does_not_stop_the_others() {
    let mut cfg = test_config();
    cfg.source.collections = vec!["rust".into(), "golang".into()];
    let h = Harness::with_config(cfg).await;
    h.source.publish(item("abc", "rust"));
    h.source
        .failing_collections
        .lock()
        .unwrap()
        .push("golang".into());

    let stats = h.pipeline.run(RunMode::Full).await.unwrap();

    assert_eq!(stats.failed_collections, vec!["golang".to_string()]);
    assert_eq!(stats.newly_tracked, 1);
}

#[tokio::test]
async fn dry_run_counts_without_touching_anything() {
    let mut cfg = test_config();
    cfg.source.collections = vec!["rust".into(), "golang".into()];
    let h = Harness::with_config(cfg).await;
    h.source.publish(item("a1", "rust"));
    h.source.publish(item("a2", "rust"));
    h.source.publish(item("b1", "golang"));

    let stats = h.pipeline.run(RunMode::DryRun).await.unwrap();

    assert_eq!(stats.items_fetched, 3);
    assert_eq!(stats.by_collection["rust"].fetched, 2);
    assert_eq!(stats.by_collection["golang"].fetched, 1);
    assert!(stats.store.is_none());
    assert!(h.docs.calls().is_empty());
    assert_eq!(h.repo.stats().await.unwrap().total_tracked, 0);
}

#[tokio::test]
async fn retention_cleanup_drops_items_first_seen_long_ago() {
    let h = Harness::new().await;
    h.source.publish(item("abc", "rust"));
    h.pipeline.run(RunMode::Full).await.unwrap();
    h.source.clear_listing();

    h.clock.advance_ms(31 * DAY_MS);
    let stats = h.pipeline.run(RunMode::Full).await.unwrap();

    assert_eq!(stats.cleaned_up, 1);
    assert!(h.repo.get_tracked("abc").await.unwrap().is_none());
    assert!(h.repo.get_cached("abc").await.unwrap().is_none());
}

#[tokio::test]
async fn store_failure_aborts_the_run() {
    // No migration: every query hits a missing table.
    let repo = Arc::new(SqliteRepo::in_memory(chrono_tz::UTC).await.unwrap());
    let ctx = AppContext {
        cfg: test_config(),
        repo,
        source: Arc::new(FakeSource::default()),
        documents: Arc::new(FakeDocuments::default()),
        clock: Arc::new(ManualClock::new(T0)),
        rng: Arc::new(MutexRng::from_seed(1)),
    };
    let pipeline = Pipeline::new(ctx);

    let err = pipeline.run(RunMode::UpdateOnly).await.unwrap_err();
    assert!(matches!(err, SyncError::Store(_)));
    assert!(err.is_fatal());
}
