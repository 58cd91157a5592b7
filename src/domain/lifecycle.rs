//! Per-item lifecycle: NEW/UPDATING items advance one step per daily cycle until the
//! freeze threshold, after which they are FROZEN for good.
//!
//! Counter progression with the defaults (refresh_at = 0, freeze_at = 2): -1 on first
//! sight, the next day accumulates to 0, the two days after run refresh checks
//! (0 -> 1 -> 2) and the freeze sweep picks the item up at 2.
use chrono::{DateTime, NaiveDate};
use chrono_tz::Tz;

use crate::domain::model::{ItemStatus, TrackedItem};

/// Daily idempotency rule: an item is processed at most once per calendar day in a
/// fixed reference timezone.
#[derive(Debug, Clone, Copy)]
pub struct DailyGate {
    zone: Tz,
}

impl DailyGate {
    pub fn new(zone: Tz) -> Self {
        Self { zone }
    }

    pub fn local_date(&self, ms: i64) -> NaiveDate {
        DateTime::from_timestamp_millis(ms)
            .unwrap_or_default()
            .with_timezone(&self.zone)
            .date_naive()
    }

    pub fn should_process_today(&self, last_updated_ms: i64, now_ms: i64) -> bool {
        self.local_date(last_updated_ms) != self.local_date(now_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleAction {
    /// Terminal; nothing left to do.
    Frozen,
    /// Counter already at the freeze threshold; the freeze sweep owns it.
    AwaitingFreeze,
    /// Already handled in today's run.
    AlreadyProcessedToday,
    /// Below the refresh threshold: bump the counter, no remote calls.
    Accumulate,
    /// Re-fetch and run the change detector.
    Refresh,
}

impl CycleAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            CycleAction::Frozen => "frozen",
            CycleAction::AwaitingFreeze => "awaiting-freeze",
            CycleAction::AlreadyProcessedToday => "already-processed-today",
            CycleAction::Accumulate => "accumulate",
            CycleAction::Refresh => "refresh",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Thresholds {
    pub refresh_at: i64,
    pub freeze_at: i64,
}

pub fn decide_cycle(
    item: &TrackedItem,
    thresholds: Thresholds,
    gate: &DailyGate,
    now_ms: i64,
) -> CycleAction {
    if item.is_frozen() {
        return CycleAction::Frozen;
    }
    if item.update_count >= thresholds.freeze_at {
        return CycleAction::AwaitingFreeze;
    }
    if !gate.should_process_today(item.last_updated_at_ms, now_ms) {
        return CycleAction::AlreadyProcessedToday;
    }
    if item.update_count < thresholds.refresh_at {
        CycleAction::Accumulate
    } else {
        CycleAction::Refresh
    }
}

/// Closes one processing cycle for the item.
pub fn complete_cycle(item: &mut TrackedItem, now_ms: i64) {
    item.update_count += 1;
    item.last_updated_at_ms = now_ms;
}

/// Records a successful full re-ingest.
pub fn record_reingest(item: &mut TrackedItem, doc_id: String, fingerprint: String) {
    item.remote_doc_id = Some(doc_id);
    item.content_fingerprint = fingerprint;
    if item.status == ItemStatus::New {
        item.status = ItemStatus::Updating;
    }
}

pub fn should_freeze(item: &TrackedItem, freeze_at: i64) -> bool {
    !item.is_frozen() && item.update_count >= freeze_at
}

/// Freezing only stops tracking; the indexed document stays where it is.
pub fn freeze(item: &mut TrackedItem, now_ms: i64) {
    item.status = ItemStatus::Frozen;
    item.last_updated_at_ms = now_ms;
}
