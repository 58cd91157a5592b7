//! Renders a cached item into the text document and searchable metadata sent to the
//! document store.
use chrono::DateTime;
use chrono_tz::Tz;
use serde_json::{json, Map, Value};

use crate::domain::model::SourceItem;

#[derive(Debug, Clone, PartialEq)]
pub struct DocumentContent {
    pub name: String,
    pub content_type: &'static str,
    pub body: String,
    pub metadata: Map<String, Value>,
}

pub fn document_name(item: &SourceItem) -> String {
    format!("post_{}", item.item_id)
}

pub fn full_url(item: &SourceItem) -> String {
    format!("https://reddit.com{}", item.permalink)
}

fn external_url(item: &SourceItem) -> Option<&str> {
    let full = full_url(item);
    if !item.is_self && !item.url.is_empty() && item.url != full {
        Some(item.url.as_str())
    } else {
        None
    }
}

/// "Jan 05, 2025 at 09:30 AM PST (2025-01-05 17:30 UTC)"
pub fn format_dual(ms: i64, zone: &Tz) -> String {
    let utc = DateTime::from_timestamp_millis(ms).unwrap_or_default();
    let local = utc.with_timezone(zone);
    format!(
        "{} ({})",
        local.format("%b %d, %Y at %I:%M %p %Z"),
        utc.format("%Y-%m-%d %H:%M UTC")
    )
}

pub fn document_metadata(item: &SourceItem, zone: &Tz) -> Map<String, Value> {
    let utc = DateTime::from_timestamp_millis(item.created_at_ms).unwrap_or_default();
    let local = utc.with_timezone(zone);

    let mut md = Map::new();
    md.insert("url".into(), json!(full_url(item)));
    md.insert("subreddit".into(), json!(item.collection));
    md.insert("author".into(), json!(item.author));
    md.insert("title".into(), json!(item.title));
    md.insert("score".into(), json!(item.score));
    md.insert("num_comments".into(), json!(item.reply_count));
    md.insert(
        "upvote_ratio_bp".into(),
        json!((item.upvote_ratio * 10_000.0).round() as i64),
    );
    md.insert("created_utc".into(), json!(utc.to_rfc3339()));
    md.insert("created_local".into(), json!(local.to_rfc3339()));
    md.insert(
        "date_local".into(),
        json!(local.format("%Y-%m-%d").to_string()),
    );
    md.insert("post_id".into(), json!(item.item_id));
    md.insert("is_self".into(), json!(item.is_self));
    if let Some(ext) = external_url(item) {
        md.insert("external_url".into(), json!(ext));
    }
    if let Some(flair) = &item.flair {
        md.insert("flair".into(), json!(flair));
    }
    md
}

pub fn render_document(item: &SourceItem, zone: &Tz) -> DocumentContent {
    let mut out = String::new();
    out.push_str(&format!("# [POST] {}\n\n", item.title));
    out.push_str(&format!("- Subreddit: r/{}\n", item.collection));
    out.push_str(&format!("- Author: u/{}\n", item.author));
    out.push_str(&format!(
        "- Posted: {}\n",
        format_dual(item.created_at_ms, zone)
    ));
    out.push_str(&format!("- URL: {}\n", full_url(item)));
    if let Some(ext) = external_url(item) {
        out.push_str(&format!("- External link: {ext}\n"));
    }
    out.push_str(&format!(
        "- Stats: {} upvotes, {} comments\n\n",
        item.score, item.reply_count
    ));

    out.push_str("## Post Content\n\n");
    if item.body.is_empty() {
        out.push_str("_Link post with no text._\n");
    } else {
        out.push_str(&item.body);
        out.push('\n');
    }

    if !item.replies.is_empty() {
        let mut replies: Vec<_> = item.replies.iter().collect();
        replies.sort_by(|a, b| b.score.cmp(&a.score));

        out.push_str(&format!(
            "\n## Community Discussion ({} comments)\n",
            replies.len()
        ));
        for (i, r) in replies.iter().enumerate() {
            let mut tags = Vec::new();
            if r.is_submitter {
                tags.push("OP".to_string());
            }
            if r.edited {
                tags.push("edited".to_string());
            }
            if r.depth > 0 {
                tags.push(format!("reply depth {}", r.depth));
            }
            let tags = if tags.is_empty() {
                String::new()
            } else {
                format!(" [{}]", tags.join(", "))
            };
            out.push_str(&format!(
                "\n### Comment #{} by u/{} ({} points){}\n",
                i + 1,
                r.author,
                r.score,
                tags
            ));
            out.push_str(&format!(
                "Posted: {}\n\n",
                format_dual(r.created_at_ms, zone)
            ));
            for line in r.body.lines() {
                out.push_str("> ");
                out.push_str(line);
                out.push('\n');
            }
        }
    }

    DocumentContent {
        name: document_name(item),
        content_type: "text/markdown",
        body: out,
        metadata: document_metadata(item, zone),
    }
}
