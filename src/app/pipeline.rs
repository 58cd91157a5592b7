//! The orchestrator. A run is an ordered list of phases over one `RunStats`
//! accumulator; items inside a phase are handled one at a time and an item's failure
//! never stops the phase. Only persistent-store failures abort the run.
mod actions;
mod queue;
pub mod stats;

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::app::context::AppContext;
use crate::domain::error::SyncError;
use crate::domain::lifecycle::{DailyGate, Thresholds};
use crate::domain::model::QueueAction;
use crate::infra::time::format_epoch_ms;
use crate::ports::{
    clock::Clock, documents::DocumentStore, random::RandomSource, repo::Repo,
    source::SourceFetcher,
};

use self::stats::RunStats;

const DAY_MS: i64 = 86_400_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Every phase, then retention cleanup.
    Full,
    ScrapeOnly,
    UpdateOnly,
    QueueOnly,
    /// Fetch and count per collection; no store is touched.
    DryRun,
}

impl RunMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunMode::Full => "full",
            RunMode::ScrapeOnly => "scrape-only",
            RunMode::UpdateOnly => "update-only",
            RunMode::QueueOnly => "queue-only",
            RunMode::DryRun => "dry-run",
        }
    }

    pub fn phases(&self) -> &'static [Phase] {
        match self {
            RunMode::Full => &[
                Phase::DrainQueue,
                Phase::RepairFingerprints,
                Phase::IngestNew,
                Phase::AdvanceTracked,
                Phase::Freeze,
                Phase::DrainQueue,
                Phase::Cleanup,
            ],
            RunMode::ScrapeOnly => &[Phase::IngestNew],
            RunMode::UpdateOnly => &[Phase::DrainQueue, Phase::AdvanceTracked, Phase::Freeze],
            RunMode::QueueOnly => &[Phase::DrainQueue],
            RunMode::DryRun => &[Phase::Preview],
        }
    }

    pub fn touches_store(&self) -> bool {
        !matches!(self, RunMode::DryRun)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    DrainQueue,
    RepairFingerprints,
    IngestNew,
    AdvanceTracked,
    Freeze,
    Cleanup,
    Preview,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::DrainQueue => "drain-queue",
            Phase::RepairFingerprints => "repair-fingerprints",
            Phase::IngestNew => "ingest-new",
            Phase::AdvanceTracked => "advance-tracked",
            Phase::Freeze => "freeze",
            Phase::Cleanup => "cleanup",
            Phase::Preview => "preview",
        }
    }
}

pub struct Pipeline<R, S, D, C, G>
where
    R: Repo,
    S: SourceFetcher,
    D: DocumentStore,
    C: Clock,
    G: RandomSource,
{
    ctx: AppContext<R, S, D, C, G>,
    gate: DailyGate,
    thresholds: Thresholds,
}

impl<R, S, D, C, G> Pipeline<R, S, D, C, G>
where
    R: Repo,
    S: SourceFetcher,
    D: DocumentStore,
    C: Clock,
    G: RandomSource,
{
    pub fn new(ctx: AppContext<R, S, D, C, G>) -> Self {
        let gate = DailyGate::new(ctx.cfg.timezone);
        let thresholds = Thresholds {
            refresh_at: ctx.cfg.lifecycle.refresh_at,
            freeze_at: ctx.cfg.lifecycle.freeze_at,
        };
        Self {
            ctx,
            gate,
            thresholds,
        }
    }

    pub async fn run(&self, mode: RunMode) -> Result<RunStats, SyncError> {
        let started = self.now().await;
        let mut stats = RunStats::new(mode.as_str(), started);
        info!(
            mode = mode.as_str(),
            collections = ?self.ctx.cfg.source.collections,
            refresh_at = self.thresholds.refresh_at,
            freeze_at = self.thresholds.freeze_at,
            started = %format_epoch_ms(started, &self.ctx.cfg.timezone),
            "Run starting"
        );

        for phase in mode.phases() {
            let phase_started = std::time::Instant::now();
            info!(phase = phase.as_str(), "Phase start");
            let res = match phase {
                Phase::DrainQueue => self.drain_queue(&mut stats).await,
                Phase::RepairFingerprints => self.repair_fingerprints(&mut stats).await,
                Phase::IngestNew => self.ingest_new(&mut stats).await,
                Phase::AdvanceTracked => self.advance_tracked(&mut stats).await,
                Phase::Freeze => self.freeze_due(&mut stats).await,
                Phase::Cleanup => self.cleanup(&mut stats).await,
                Phase::Preview => self.preview(&mut stats).await,
            };
            if let Err(e) = res {
                warn!(phase = phase.as_str(), error = %e, "Run aborted");
                return Err(e);
            }
            info!(
                phase = phase.as_str(),
                elapsed_ms = phase_started.elapsed().as_millis() as u64,
                errors = stats.errors,
                "Phase done"
            );
        }

        stats.completed_at_ms = Some(self.now().await);
        if mode.touches_store() {
            let store = self.ctx.repo.stats().await.map_err(SyncError::Store)?;
            info!(
                total_tracked = store.total_tracked,
                by_status = ?store.by_status,
                total_replies = store.total_replies,
                queue_pending = store.queue_pending,
                queue_abandoned = store.queue_abandoned,
                "Store totals"
            );
            stats.store = Some(store);
        }
        info!(
            mode = mode.as_str(),
            duration_ms = stats.duration_ms().unwrap_or_default(),
            fetched = stats.items_fetched,
            new = stats.newly_tracked,
            ingested = stats.documents_ingested,
            reingested = stats.documents_reingested,
            patched = stats.metadata_patched,
            frozen = stats.frozen,
            deleted = stats.deleted,
            errors = stats.errors,
            queued = stats.queued_for_retry,
            "Run complete"
        );
        Ok(stats)
    }

    async fn now(&self) -> i64 {
        self.ctx.clock.now_epoch_ms().await
    }

    async fn pause(ms: u64) {
        if ms > 0 {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
    }

    /// Per-item error policy: store failures propagate, everything else is counted and
    /// optionally parked in the retry queue.
    async fn absorb(
        &self,
        stats: &mut RunStats,
        err: SyncError,
        item_id: &str,
        collection: &str,
        requeue: Option<QueueAction>,
    ) -> Result<(), SyncError> {
        if err.is_fatal() {
            return Err(err);
        }
        stats.errors += 1;
        warn!(item_id, error = %err, "Item failed");
        if let Some(action) = requeue {
            let now = self.now().await;
            self.ctx
                .repo
                .enqueue(
                    item_id,
                    collection,
                    action,
                    action.default_priority(),
                    self.ctx.cfg.queue.max_attempts,
                    now,
                )
                .await
                .map_err(SyncError::Store)?;
            stats.queued_for_retry += 1;
        }
        Ok(())
    }

    async fn repair_fingerprints(&self, stats: &mut RunStats) -> Result<(), SyncError> {
        let items = self
            .ctx
            .repo
            .items_missing_fingerprint()
            .await
            .map_err(SyncError::Store)?;
        if items.is_empty() {
            debug!("No fingerprints to repair");
            return Ok(());
        }
        info!(count = items.len(), "Repairing fingerprints");

        for tracked in items {
            let (id, collection) = (tracked.item_id.clone(), tracked.collection.clone());
            if let Err(e) = self.repair_item(tracked, stats).await {
                // Fingerprint stays empty, so the next run repairs again.
                self.absorb(stats, e, &id, &collection, None).await?;
            }
        }
        Ok(())
    }

    async fn ingest_new(&self, stats: &mut RunStats) -> Result<(), SyncError> {
        let src = &self.ctx.cfg.source;
        let batch = self
            .ctx
            .source
            .fetch_recent(&src.collections, src.window_hours)
            .await;
        stats.items_fetched += batch.items.len() as u64;
        stats.failed_collections.extend(batch.failed_collections);
        for item in &batch.items {
            stats.collection(&item.collection).fetched += 1;
        }

        let window_days = self.ctx.cfg.lifecycle.update_window_days;
        for item in &batch.items {
            let now = self.now().await;
            if !item.within_window(window_days, now) {
                debug!(item_id = %item.item_id, age_days = item.age_days(now), "Outside update window");
                continue;
            }
            if let Err(e) = self.register_and_ingest(item, stats).await {
                self.absorb(stats, e, &item.item_id, &item.collection, Some(QueueAction::Ingest))
                    .await?;
            }
        }

        info!(
            fetched = stats.items_fetched,
            new = stats.newly_tracked,
            failed_collections = stats.failed_collections.len(),
            "Ingest phase complete"
        );
        Ok(())
    }

    async fn advance_tracked(&self, stats: &mut RunStats) -> Result<(), SyncError> {
        let items = self
            .ctx
            .repo
            .items_to_advance(self.thresholds.freeze_at)
            .await
            .map_err(SyncError::Store)?;
        info!(count = items.len(), "Items to advance");

        let pause_ms = self.ctx.cfg.lifecycle.update_pause_ms;
        for tracked in items {
            let (id, collection) = (tracked.item_id.clone(), tracked.collection.clone());
            match self.advance_item(tracked, stats).await {
                Ok(outcome) => {
                    if outcome.made_remote_calls() {
                        Self::pause(pause_ms).await;
                    }
                }
                Err(e) => {
                    self.absorb(stats, e, &id, &collection, Some(QueueAction::Update))
                        .await?;
                    Self::pause(pause_ms).await;
                }
            }
        }
        Ok(())
    }

    async fn freeze_due(&self, stats: &mut RunStats) -> Result<(), SyncError> {
        let items = self
            .ctx
            .repo
            .items_to_freeze(self.thresholds.freeze_at)
            .await
            .map_err(SyncError::Store)?;
        info!(count = items.len(), "Items to freeze");
        for tracked in items {
            self.freeze_item(tracked, stats).await?;
        }
        Ok(())
    }

    async fn cleanup(&self, stats: &mut RunStats) -> Result<(), SyncError> {
        let days = self.ctx.cfg.lifecycle.retention_days;
        if days == 0 {
            debug!("Retention cleanup disabled");
            return Ok(());
        }
        let cutoff = self.now().await - i64::from(days) * DAY_MS;
        let removed = self
            .ctx
            .repo
            .delete_older_than(cutoff)
            .await
            .map_err(SyncError::Store)?;
        stats.cleaned_up += removed;
        if removed > 0 {
            info!(removed, days, "Retention cleanup");
        }
        Ok(())
    }

    async fn preview(&self, stats: &mut RunStats) -> Result<(), SyncError> {
        let src = &self.ctx.cfg.source;
        let batch = self
            .ctx
            .source
            .fetch_recent(&src.collections, src.window_hours)
            .await;
        stats.items_fetched += batch.items.len() as u64;
        stats.failed_collections.extend(batch.failed_collections);
        for item in &batch.items {
            stats.collection(&item.collection).fetched += 1;
        }
        for (name, c) in &stats.by_collection {
            info!(collection = %name, fetched = c.fetched, "Dry run");
        }
        Ok(())
    }
}
