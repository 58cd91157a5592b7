//! Content fingerprint and the ingest / patch / skip decision built on top of it.
//!
//! The fingerprint covers what a reader of the indexed document would notice: the
//! title, the leading part of the body, and which replies exist together with what they
//! say. Scores, reply counts and vote ratios are left out; they move on every fetch and
//! reply additions already show up through the reply id set.
use serde_json::json;

use crate::domain::hashing::{prefix_chars, sha256_hex};
use crate::domain::model::SourceItem;

const BODY_PREFIX_CHARS: usize = 2000;
const REPLY_PREFIX_CHARS: usize = 500;
const REPLY_HASH_LEN: usize = 8;
const FINGERPRINT_LEN: usize = 16;

pub fn fingerprint(item: &SourceItem) -> String {
    let mut replies: Vec<_> = item.replies.iter().collect();
    replies.sort_by(|a, b| a.reply_id.cmp(&b.reply_id));

    let reply_data: Vec<_> = replies
        .iter()
        .map(|r| {
            let body_hash = sha256_hex(prefix_chars(&r.body, REPLY_PREFIX_CHARS).as_bytes());
            json!({
                "id": r.reply_id,
                "body_hash": &body_hash[..REPLY_HASH_LEN],
            })
        })
        .collect();

    // serde_json maps are ordered by key, so the serialization is canonical.
    let canonical = json!({
        "title": item.title,
        "body": prefix_chars(&item.body, BODY_PREFIX_CHARS),
        "replies": reply_data,
    });

    let digest = sha256_hex(canonical.to_string().as_bytes());
    digest[..FINGERPRINT_LEN].to_string()
}

/// True when only the engagement counters moved between two snapshots.
pub fn volatile_metadata_changed(previous: &SourceItem, current: &SourceItem) -> bool {
    previous.score != current.score
        || previous.reply_count != current.reply_count
        || previous.upvote_ratio != current.upvote_ratio
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncDecision {
    /// No remote document yet.
    Ingest,
    /// Delete the old document and ingest fresh content.
    Reingest,
    /// Content unchanged, engagement counters moved.
    PatchMetadata,
    /// Nothing to send.
    Unchanged,
}

impl SyncDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncDecision::Ingest => "ingest",
            SyncDecision::Reingest => "reingest",
            SyncDecision::PatchMetadata => "patch-metadata",
            SyncDecision::Unchanged => "unchanged",
        }
    }
}

pub struct SyncInputs<'a> {
    pub remote_doc_id: Option<&'a str>,
    pub stored_fingerprint: &'a str,
    pub new_fingerprint: &'a str,
    pub always_reingest: bool,
    pub previous: Option<&'a SourceItem>,
    pub current: &'a SourceItem,
}

pub fn decide_sync(inputs: &SyncInputs<'_>) -> SyncDecision {
    if inputs.remote_doc_id.is_none() {
        return SyncDecision::Ingest;
    }
    if inputs.always_reingest || inputs.new_fingerprint != inputs.stored_fingerprint {
        return SyncDecision::Reingest;
    }
    match inputs.previous {
        Some(prev) if volatile_metadata_changed(prev, inputs.current) => {
            SyncDecision::PatchMetadata
        }
        _ => SyncDecision::Unchanged,
    }
}
