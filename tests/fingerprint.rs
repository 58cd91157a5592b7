mod common;

use common::*;
use postmirror::domain::fingerprint::{decide_sync, fingerprint, SyncDecision, SyncInputs};

#[test]
fn fingerprint_is_short_hex_and_stable() {
    let fp = fingerprint(&item("abc", "rust"));
    assert_eq!(fp.len(), 16);
    assert!(fp.chars().all(|c| c.is_ascii_hexdigit()));
    assert_eq!(fp, fingerprint(&item("abc", "rust")));
}

#[test]
fn engagement_counters_do_not_move_the_fingerprint() {
    let base = item("abc", "rust");
    let mut busy = base.clone();
    busy.score = 5_000;
    busy.reply_count = 900;
    busy.upvote_ratio = 0.51;
    busy.replies[0].score = 1_000;
    assert_eq!(fingerprint(&base), fingerprint(&busy));
}

#[test]
fn reply_order_does_not_matter() {
    let base = item("abc", "rust");
    let mut swapped = base.clone();
    swapped.replies.reverse();
    assert_eq!(fingerprint(&base), fingerprint(&swapped));
}

#[test]
fn content_changes_move_the_fingerprint() {
    let base = item("abc", "rust");
    let fp = fingerprint(&base);

    let mut title = base.clone();
    title.title.push_str(" (updated)");
    assert_ne!(fp, fingerprint(&title));

    let mut body = base.clone();
    body.body = "edited body".into();
    assert_ne!(fp, fingerprint(&body));

    let mut new_reply = base.clone();
    new_reply.replies.push(reply("c3", "hello", 0));
    assert_ne!(fp, fingerprint(&new_reply));

    let mut edited_reply = base.clone();
    edited_reply.replies[1].body = "second, edited".into();
    assert_ne!(fp, fingerprint(&edited_reply));
}

#[test]
fn only_the_leading_part_of_long_text_counts() {
    let mut a = item("abc", "rust");
    a.body = "x".repeat(2_000);
    let mut b = a.clone();
    b.body.push_str("tail that is past the prefix");
    assert_eq!(fingerprint(&a), fingerprint(&b));

    let mut c = item("abc", "rust");
    c.replies[0].body = "é".repeat(500);
    let mut d = c.clone();
    d.replies[0].body.push('!');
    assert_eq!(fingerprint(&c), fingerprint(&d));
}

fn decide(
    doc: Option<&str>,
    stored: &str,
    always: bool,
    previous: Option<&postmirror::domain::model::SourceItem>,
    current: &postmirror::domain::model::SourceItem,
) -> SyncDecision {
    let new_fp = fingerprint(current);
    decide_sync(&SyncInputs {
        remote_doc_id: doc,
        stored_fingerprint: stored,
        new_fingerprint: &new_fp,
        always_reingest: always,
        previous,
        current,
    })
}

#[test]
fn decision_table() {
    let prev = item("abc", "rust");
    let fp = fingerprint(&prev);

    assert_eq!(decide(None, &fp, false, Some(&prev), &prev), SyncDecision::Ingest);
    assert_eq!(decide(Some("d"), &fp, false, Some(&prev), &prev), SyncDecision::Unchanged);
    assert_eq!(decide(Some("d"), &fp, true, Some(&prev), &prev), SyncDecision::Reingest);
    assert_eq!(decide(Some("d"), "stale", false, Some(&prev), &prev), SyncDecision::Reingest);

    let mut scored = prev.clone();
    scored.score += 1;
    assert_eq!(
        decide(Some("d"), &fp, false, Some(&prev), &scored),
        SyncDecision::PatchMetadata
    );
    // Without a cached snapshot there is nothing to compare counters against.
    assert_eq!(decide(Some("d"), &fp, false, None, &scored), SyncDecision::Unchanged);
}
