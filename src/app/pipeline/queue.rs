//! Drains the durable retry queue: highest priority first, oldest first within a
//! priority, one entry at a time with a fixed pause in between.
use tracing::{debug, info, warn};

use crate::domain::error::SyncError;
use crate::domain::fingerprint::fingerprint;
use crate::domain::model::{QueueAction, QueueEntry};
use crate::ports::{
    clock::Clock, documents::DocumentStore, random::RandomSource, repo::Repo,
    source::SourceFetcher,
};

use super::stats::RunStats;
use super::Pipeline;

impl<R, S, D, C, G> Pipeline<R, S, D, C, G>
where
    R: Repo,
    S: SourceFetcher,
    D: DocumentStore,
    C: Clock,
    G: RandomSource,
{
    pub(super) async fn drain_queue(&self, stats: &mut RunStats) -> Result<(), SyncError> {
        let qcfg = &self.ctx.cfg.queue;
        let now = self.now().await;
        let entries = self
            .ctx
            .repo
            .eligible_queue_entries(now, qcfg.drain_batch)
            .await
            .map_err(SyncError::Store)?;
        if entries.is_empty() {
            info!("Queue empty");
            return Ok(());
        }
        info!(count = entries.len(), "Draining queue");

        for (i, entry) in entries.iter().enumerate() {
            if i > 0 {
                Self::pause(qcfg.pause_ms).await;
            }

            let res = match entry.action {
                QueueAction::Ingest => self.retry_ingest(entry, stats).await,
                QueueAction::Update => self.retry_update(entry, stats).await,
            };

            match res {
                Ok(()) => {
                    self.ctx
                        .repo
                        .mark_queue_success(entry.id)
                        .await
                        .map_err(SyncError::Store)?;
                    stats.queue_processed += 1;
                    info!(
                        entry_id = entry.id,
                        item_id = %entry.item_id,
                        action = entry.action.as_str(),
                        "Queue entry done"
                    );
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    let now = self.now().await;
                    self.ctx
                        .repo
                        .mark_queue_failure(entry.id, &e.to_string(), now, qcfg.base_delay_ms())
                        .await
                        .map_err(SyncError::Store)?;
                    stats.queue_failed += 1;
                    stats.errors += 1;
                    warn!(
                        entry_id = entry.id,
                        item_id = %entry.item_id,
                        action = entry.action.as_str(),
                        attempts = entry.attempts + 1,
                        error = %e,
                        "Queue entry failed"
                    );
                }
            }
        }
        Ok(())
    }

    /// First ingest that never went through. Resolved without a call when the item is
    /// gone from the store or already has a document.
    async fn retry_ingest(&self, entry: &QueueEntry, stats: &mut RunStats) -> Result<(), SyncError> {
        let repo = &self.ctx.repo;
        let Some(mut tracked) = repo
            .get_tracked(&entry.item_id)
            .await
            .map_err(SyncError::Store)?
        else {
            debug!(item_id = %entry.item_id, "Queued item no longer tracked");
            return Ok(());
        };
        if tracked.remote_doc_id.is_some() {
            debug!(item_id = %entry.item_id, "Queued item already ingested");
            return Ok(());
        }

        let cached = repo
            .get_cached(&entry.item_id)
            .await
            .map_err(SyncError::Store)?;
        let item = match cached {
            Some(c) => c.item,
            None => {
                let Some(item) = self.ctx.source.fetch_one(&entry.item_id).await? else {
                    return self.handle_gone(&tracked, stats).await;
                };
                let now = self.now().await;
                repo.save_cached(&item, tracked.update_count, now)
                    .await
                    .map_err(SyncError::Store)?;
                tracked.content_fingerprint = fingerprint(&item);
                item
            }
        };

        let doc_id = self
            .ingest_document(&item, &self.ctx.cfg.documents.ingest_retry)
            .await?;
        tracked.remote_doc_id = Some(doc_id);
        repo.upsert_tracked(&tracked).await.map_err(SyncError::Store)?;
        stats.documents_ingested += 1;
        Ok(())
    }

    /// Re-runs the item's lifecycle step. Failures go back to the caller so the entry
    /// itself is backed off; no second entry is created.
    async fn retry_update(&self, entry: &QueueEntry, stats: &mut RunStats) -> Result<(), SyncError> {
        let Some(tracked) = self
            .ctx
            .repo
            .get_tracked(&entry.item_id)
            .await
            .map_err(SyncError::Store)?
        else {
            debug!(item_id = %entry.item_id, "Queued item no longer tracked");
            return Ok(());
        };
        self.advance_item(tracked, stats).await.map(|_| ())
    }
}
