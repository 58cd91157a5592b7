//! Per-item work: registration of new items, one lifecycle step, repair, freeze and the
//! hard-delete path for items that disappeared upstream.
use tracing::{debug, info, warn};

use crate::app::retry::retry_async;
use crate::domain::document::{document_metadata, render_document};
use crate::domain::error::SyncError;
use crate::domain::fingerprint::{decide_sync, fingerprint, SyncDecision, SyncInputs};
use crate::domain::lifecycle::{
    complete_cycle, decide_cycle, freeze, record_reingest, CycleAction,
};
use crate::domain::model::{RetryPolicy, SourceItem, TrackedItem};
use crate::ports::{
    clock::Clock, documents::DocumentStore, random::RandomSource, repo::Repo,
    source::SourceFetcher,
};

use super::stats::RunStats;
use super::Pipeline;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvanceOutcome {
    Skipped(CycleAction),
    Accumulated,
    Synced(SyncDecision),
    /// Metadata patch was refused; treated as "no changes" for this cycle.
    PatchFailed,
    Gone,
}

impl AdvanceOutcome {
    pub fn made_remote_calls(&self) -> bool {
        matches!(
            self,
            AdvanceOutcome::Synced(_) | AdvanceOutcome::PatchFailed | AdvanceOutcome::Gone
        )
    }
}

impl<R, S, D, C, G> Pipeline<R, S, D, C, G>
where
    R: Repo,
    S: SourceFetcher,
    D: DocumentStore,
    C: Clock,
    G: RandomSource,
{
    /// Tracks a freshly fetched item and sends it to the document store. The tracking
    /// record and the cached snapshot are written first, so a failed ingest leaves an
    /// item with no document id for the queue to pick up.
    pub(super) async fn register_and_ingest(
        &self,
        item: &SourceItem,
        stats: &mut RunStats,
    ) -> Result<(), SyncError> {
        let repo = &self.ctx.repo;
        if repo
            .get_tracked(&item.item_id)
            .await
            .map_err(SyncError::Store)?
            .is_some()
        {
            return Ok(());
        }

        let now = self.now().await;
        let mut tracked = TrackedItem::first_seen(item, fingerprint(item), now);
        repo.upsert_tracked(&tracked).await.map_err(SyncError::Store)?;
        repo.save_cached(item, tracked.update_count, now)
            .await
            .map_err(SyncError::Store)?;
        stats.newly_tracked += 1;
        stats.collection(&item.collection).new += 1;
        info!(
            item_id = %item.item_id,
            collection = %item.collection,
            replies = item.replies.len(),
            "New item tracked"
        );

        let doc_id = self
            .ingest_document(item, &self.ctx.cfg.documents.ingest_retry)
            .await?;
        tracked.remote_doc_id = Some(doc_id);
        repo.upsert_tracked(&tracked).await.map_err(SyncError::Store)?;
        stats.documents_ingested += 1;
        Ok(())
    }

    /// One daily lifecycle step for a non-frozen item.
    pub(super) async fn advance_item(
        &self,
        mut tracked: TrackedItem,
        stats: &mut RunStats,
    ) -> Result<AdvanceOutcome, SyncError> {
        let now = self.now().await;
        let action = decide_cycle(&tracked, self.thresholds, &self.gate, now);
        match action {
            CycleAction::Frozen
            | CycleAction::AwaitingFreeze
            | CycleAction::AlreadyProcessedToday => {
                debug!(item_id = %tracked.item_id, action = action.as_str(), "No step");
                Ok(AdvanceOutcome::Skipped(action))
            }
            CycleAction::Accumulate => {
                complete_cycle(&mut tracked, now);
                self.ctx
                    .repo
                    .upsert_tracked(&tracked)
                    .await
                    .map_err(SyncError::Store)?;
                stats.accumulated += 1;
                debug!(
                    item_id = %tracked.item_id,
                    update_count = tracked.update_count,
                    "Accumulating"
                );
                Ok(AdvanceOutcome::Accumulated)
            }
            CycleAction::Refresh => self.refresh(tracked, stats).await,
        }
    }

    async fn refresh(
        &self,
        mut tracked: TrackedItem,
        stats: &mut RunStats,
    ) -> Result<AdvanceOutcome, SyncError> {
        let repo = &self.ctx.repo;
        info!(
            item_id = %tracked.item_id,
            update_count = tracked.update_count,
            "Refreshing"
        );

        let Some(current) = self.ctx.source.fetch_one(&tracked.item_id).await? else {
            self.handle_gone(&tracked, stats).await?;
            return Ok(AdvanceOutcome::Gone);
        };

        let previous = repo
            .get_cached(&tracked.item_id)
            .await
            .map_err(SyncError::Store)?;
        let new_fp = fingerprint(&current);
        let decision = decide_sync(&SyncInputs {
            remote_doc_id: tracked.remote_doc_id.as_deref(),
            stored_fingerprint: &tracked.content_fingerprint,
            new_fingerprint: &new_fp,
            always_reingest: self.ctx.cfg.lifecycle.always_reingest_on_refresh,
            previous: previous.as_ref().map(|c| &c.item),
            current: &current,
        });

        let now = self.now().await;
        let next_count = tracked.update_count + 1;
        let mut outcome = AdvanceOutcome::Synced(decision);

        match decision {
            SyncDecision::Ingest => {
                repo.save_cached(&current, next_count, now)
                    .await
                    .map_err(SyncError::Store)?;
                let doc_id = self
                    .ingest_document(&current, &self.ctx.cfg.documents.ingest_retry)
                    .await?;
                record_reingest(&mut tracked, doc_id, new_fp);
                stats.documents_ingested += 1;
            }
            SyncDecision::Reingest => {
                repo.save_cached(&current, next_count, now)
                    .await
                    .map_err(SyncError::Store)?;
                let old = tracked.remote_doc_id.clone().unwrap_or_default();
                let doc_id = self.reingest_document(&old, &current).await?;
                record_reingest(&mut tracked, doc_id, new_fp);
                stats.documents_reingested += 1;
            }
            SyncDecision::PatchMetadata => {
                let doc_id = tracked.remote_doc_id.clone().unwrap_or_default();
                let metadata = document_metadata(&current, &self.ctx.cfg.timezone);
                if self.ctx.documents.patch_metadata(&doc_id, &metadata).await {
                    repo.save_cached(&current, next_count, now)
                        .await
                        .map_err(SyncError::Store)?;
                    stats.metadata_patched += 1;
                } else {
                    // Old snapshot stays cached so the next cycle sees the drift again.
                    warn!(
                        item_id = %tracked.item_id,
                        doc_id = %doc_id,
                        "Metadata patch failed, no changes applied"
                    );
                    stats.errors += 1;
                    outcome = AdvanceOutcome::PatchFailed;
                }
            }
            SyncDecision::Unchanged => {
                repo.save_cached(&current, next_count, now)
                    .await
                    .map_err(SyncError::Store)?;
                stats.skipped_unchanged += 1;
            }
        }

        complete_cycle(&mut tracked, now);
        repo.upsert_tracked(&tracked).await.map_err(SyncError::Store)?;
        info!(
            item_id = %tracked.item_id,
            decision = decision.as_str(),
            update_count = tracked.update_count,
            status = tracked.status.as_str(),
            "Refreshed"
        );
        Ok(outcome)
    }

    /// Re-fetches an item whose fingerprint was never stored, re-sends it in full and
    /// records the fingerprint. The lifecycle counter is left alone.
    pub(super) async fn repair_item(
        &self,
        mut tracked: TrackedItem,
        stats: &mut RunStats,
    ) -> Result<(), SyncError> {
        let repo = &self.ctx.repo;
        let Some(current) = self.ctx.source.fetch_one(&tracked.item_id).await? else {
            return self.handle_gone(&tracked, stats).await;
        };

        let now = self.now().await;
        repo.save_cached(&current, tracked.update_count, now)
            .await
            .map_err(SyncError::Store)?;

        let doc_id = match tracked.remote_doc_id.clone() {
            Some(old) => {
                let d = self.reingest_document(&old, &current).await?;
                stats.documents_reingested += 1;
                d
            }
            None => {
                let d = self
                    .ingest_document(&current, &self.ctx.cfg.documents.ingest_retry)
                    .await?;
                stats.documents_ingested += 1;
                d
            }
        };

        tracked.remote_doc_id = Some(doc_id);
        tracked.content_fingerprint = fingerprint(&current);
        tracked.last_updated_at_ms = now;
        repo.upsert_tracked(&tracked).await.map_err(SyncError::Store)?;
        stats.repaired += 1;
        info!(item_id = %tracked.item_id, fingerprint = %tracked.content_fingerprint, "Fingerprint repaired");
        Ok(())
    }

    pub(super) async fn freeze_item(
        &self,
        mut tracked: TrackedItem,
        stats: &mut RunStats,
    ) -> Result<(), SyncError> {
        let now = self.now().await;
        freeze(&mut tracked, now);
        self.ctx
            .repo
            .upsert_tracked(&tracked)
            .await
            .map_err(SyncError::Store)?;
        stats.frozen += 1;
        info!(
            item_id = %tracked.item_id,
            update_count = tracked.update_count,
            "Frozen"
        );
        Ok(())
    }

    /// Upstream deletion: drop the remote document (best effort) and every local record.
    pub(super) async fn handle_gone(
        &self,
        tracked: &TrackedItem,
        stats: &mut RunStats,
    ) -> Result<(), SyncError> {
        warn!(item_id = %tracked.item_id, "Item gone upstream, deleting");
        if let Some(doc_id) = &tracked.remote_doc_id {
            if !self.delete_document(doc_id).await {
                warn!(item_id = %tracked.item_id, doc_id = %doc_id, "Remote delete failed");
            }
        }
        self.ctx
            .repo
            .delete_item(&tracked.item_id)
            .await
            .map_err(SyncError::Store)?;
        stats.deleted += 1;
        Ok(())
    }

    pub(super) async fn ingest_document(
        &self,
        item: &SourceItem,
        policy: &RetryPolicy,
    ) -> Result<String, SyncError> {
        let doc = render_document(item, &self.ctx.cfg.timezone);
        retry_async(policy, self.ctx.rng.as_ref(), "ingest", || {
            self.ctx.documents.ingest(&doc)
        })
        .await
        .map_err(SyncError::Document)
    }

    /// Delete-then-ingest. A failed delete is tolerated; the fresh ingest is what counts.
    async fn reingest_document(&self, old_doc_id: &str, item: &SourceItem) -> Result<String, SyncError> {
        if !old_doc_id.is_empty() && !self.delete_document(old_doc_id).await {
            warn!(item_id = %item.item_id, doc_id = old_doc_id, "Delete before re-ingest failed");
        }
        self.ingest_document(item, &self.ctx.cfg.documents.reingest_retry)
            .await
    }

    /// `true` once the store confirms the delete within `delete_retry`.
    async fn delete_document(&self, doc_id: &str) -> bool {
        let policy = &self.ctx.cfg.documents.delete_retry;
        retry_async(policy, self.ctx.rng.as_ref(), "delete", || async move {
            if self.ctx.documents.delete(doc_id).await {
                Ok(())
            } else {
                Err(format!("delete {doc_id} refused"))
            }
        })
        .await
        .is_ok()
    }
}
