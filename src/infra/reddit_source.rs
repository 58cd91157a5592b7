//! Reqwest-backed `SourceFetcher` over the public Reddit JSON listings. Every HTTP
//! request passes through the shared `RateLimiter` and reports its outcome to it.
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::domain::error::FetchError;
use crate::domain::model::{Reply, SourceConfig, SourceItem};
use crate::infra::rate_limiter::RateLimiter;
use crate::ports::clock::Clock;
use crate::ports::source::SourceFetcher;

const PAGE_SIZE: usize = 100;
const HOT_LIMIT: usize = 50;

/// Bots and placeholder authors whose replies never make it into a document.
const EXCLUDED_AUTHORS: &[&str] = &[
    "automoderator",
    "moderatorbot",
    "botdefense",
    "remindmebot",
    "savevideo",
    "vredditdownloader",
    "[deleted]",
];

pub struct RedditSource<C: Clock> {
    client: reqwest::Client,
    base_url: String,
    limiter: Arc<RateLimiter>,
    clock: Arc<C>,
    max_replies: usize,
    fetch_replies: bool,
}

impl<C: Clock> RedditSource<C> {
    pub fn new(
        cfg: &SourceConfig,
        limiter: Arc<RateLimiter>,
        clock: Arc<C>,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .user_agent(cfg.user_agent.clone())
            .pool_idle_timeout(Duration::from_secs(120))
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            limiter,
            clock,
            max_replies: cfg.max_replies,
            fetch_replies: cfg.fetch_replies,
        })
    }

    /// `Ok(None)` only for 404. Every other non-success status is an error, 403 included:
    /// blocked user agents and private collections answer with it.
    async fn get_json(&self, url: &str) -> Result<Option<Value>, FetchError> {
        self.limiter.acquire().await;
        debug!(url, "HTTP GET start");

        let resp = match self.client.get(url).send().await {
            Ok(r) => r,
            Err(e) => {
                self.limiter.report_error(false).await;
                warn!(url, error = %e, "HTTP GET failed");
                return Err(FetchError::Transient(e.to_string()));
            }
        };

        let status = resp.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            self.limiter.report_error(true).await;
            return Err(FetchError::RateLimited(format!("{url}: HTTP 429")));
        }
        if status == StatusCode::NOT_FOUND {
            self.limiter.report_success().await;
            return Ok(None);
        }
        if !status.is_success() {
            self.limiter.report_error(false).await;
            return Err(FetchError::Transient(format!("{url}: HTTP {}", status.as_u16())));
        }

        match resp.json::<Value>().await {
            Ok(v) => {
                self.limiter.report_success().await;
                Ok(Some(v))
            }
            Err(e) => {
                self.limiter.report_error(false).await;
                Err(FetchError::Transient(format!("{url}: bad body: {e}")))
            }
        }
    }

    async fn listing(&self, url: &str) -> Result<(Vec<Value>, Option<String>), FetchError> {
        let body = self
            .get_json(url)
            .await?
            .ok_or_else(|| FetchError::Transient(format!("{url}: listing not found")))?;
        let data = &body["data"];
        let children = data["children"]
            .as_array()
            .map(|c| {
                c.iter()
                    .filter(|ch| ch["kind"] == "t3")
                    .map(|ch| ch["data"].clone())
                    .collect()
            })
            .unwrap_or_default();
        let after = data["after"].as_str().map(str::to_string);
        Ok((children, after))
    }

    async fn posts_in_window(
        &self,
        collection: &str,
        cutoff_ms: i64,
    ) -> Result<Vec<Value>, FetchError> {
        let mut by_id: HashMap<String, Value> = HashMap::new();
        let mut order: Vec<String> = Vec::new();
        let mut keep = |post: Value, by_id: &mut HashMap<String, Value>| {
            if let Some(id) = post["id"].as_str().map(str::to_string) {
                if !by_id.contains_key(&id) {
                    order.push(id.clone());
                }
                by_id.insert(id, post);
            }
        };

        let mut after: Option<String> = None;
        loop {
            let mut url = format!(
                "{}/r/{collection}/new.json?limit={PAGE_SIZE}&raw_json=1",
                self.base_url
            );
            if let Some(a) = &after {
                url.push_str(&format!("&after={a}"));
            }
            let (posts, next) = self.listing(&url).await?;
            let page_len = posts.len();

            let mut reached_cutoff = false;
            for post in posts {
                if created_ms(&post) < cutoff_ms {
                    reached_cutoff = true;
                    break;
                }
                keep(post, &mut by_id);
            }

            if reached_cutoff || page_len < PAGE_SIZE {
                break;
            }
            match next {
                Some(n) => after = Some(n),
                None => break,
            }
        }

        // High-engagement posts can be missing from the chronological pages.
        let hot_url = format!(
            "{}/r/{collection}/hot.json?limit={HOT_LIMIT}&raw_json=1",
            self.base_url
        );
        let (hot, _) = self.listing(&hot_url).await?;
        for post in hot {
            if created_ms(&post) >= cutoff_ms {
                keep(post, &mut by_id);
            }
        }

        Ok(order.into_iter().filter_map(|id| by_id.remove(&id)).collect())
    }

    /// Post listing plus its reply tree, or `None` on 404.
    async fn thread(&self, item_id: &str) -> Result<Option<(Value, Vec<Reply>)>, FetchError> {
        let url = format!(
            "{}/comments/{item_id}.json?limit=500&raw_json=1",
            self.base_url
        );
        let Some(body) = self.get_json(&url).await? else {
            return Ok(None);
        };
        let max = if self.fetch_replies { self.max_replies } else { 0 };
        parse_thread(&body, max).map(Some)
    }
}

/// Splits a `/comments/{id}.json` body into the post and at most `max_replies` replies.
/// A body without a post is a transient error, never a deletion.
pub fn parse_thread(body: &Value, max_replies: usize) -> Result<(Value, Vec<Reply>), FetchError> {
    let post = body[0]["data"]["children"][0]
        .get("data")
        .filter(|d| d.is_object())
        .cloned()
        .ok_or_else(|| FetchError::Transient("thread body has no post".to_string()))?;
    let mut replies = Vec::new();
    if let Some(children) = body[1]["data"]["children"].as_array() {
        collect_replies(children, max_replies, &mut replies);
    }
    Ok((post, replies))
}

fn created_ms(post: &Value) -> i64 {
    (post["created_utc"].as_f64().unwrap_or(0.0) * 1000.0) as i64
}

fn is_edited(v: &Value) -> bool {
    match v {
        Value::Bool(b) => *b,
        Value::Number(_) => true,
        _ => false,
    }
}

fn is_excluded_author(author: &str) -> bool {
    let lower = author.to_ascii_lowercase();
    EXCLUDED_AUTHORS.contains(&lower.as_str())
}

/// Depth-first walk of the reply tree. "more" stubs are skipped.
fn collect_replies(children: &[Value], max: usize, out: &mut Vec<Reply>) {
    for child in children {
        if out.len() >= max {
            return;
        }
        if child["kind"] != "t1" {
            continue;
        }
        let d = &child["data"];
        let author = d["author"].as_str().unwrap_or("[deleted]");
        if !is_excluded_author(author) {
            out.push(Reply {
                reply_id: d["id"].as_str().unwrap_or_default().to_string(),
                author: author.to_string(),
                body: d["body"].as_str().unwrap_or_default().to_string(),
                score: d["score"].as_i64().unwrap_or(0),
                created_at_ms: created_ms(d),
                parent_id: d["parent_id"].as_str().unwrap_or_default().to_string(),
                is_submitter: d["is_submitter"].as_bool().unwrap_or(false),
                edited: is_edited(&d["edited"]),
                depth: d["depth"].as_i64().unwrap_or(0),
            });
        }
        if let Some(nested) = d["replies"]["data"]["children"].as_array() {
            collect_replies(nested, max, out);
        }
    }
}

/// Removed or deleted upstream: no author, or a placeholder body.
pub fn is_gone(post: &Value) -> bool {
    let author = post["author"].as_str();
    if author.is_none() || author == Some("[deleted]") {
        return true;
    }
    matches!(post["selftext"].as_str(), Some("[deleted]") | Some("[removed]"))
}

pub fn to_source_item(post: &Value, replies: Vec<Reply>) -> SourceItem {
    let s = |key: &str| post[key].as_str().unwrap_or_default().to_string();
    SourceItem {
        item_id: s("id"),
        collection: s("subreddit"),
        author: post["author"].as_str().unwrap_or("[deleted]").to_string(),
        title: s("title"),
        body: s("selftext"),
        url: s("url"),
        permalink: s("permalink"),
        score: post["score"].as_i64().unwrap_or(0),
        upvote_ratio: post["upvote_ratio"].as_f64().unwrap_or(0.0),
        reply_count: post["num_comments"].as_i64().unwrap_or(0),
        created_at_ms: created_ms(post),
        edited: is_edited(&post["edited"]),
        flair: post["link_flair_text"]
            .as_str()
            .filter(|f| !f.is_empty())
            .map(str::to_string),
        is_self: post["is_self"].as_bool().unwrap_or(true),
        replies,
    }
}

#[async_trait::async_trait]
impl<C: Clock> SourceFetcher for RedditSource<C> {
    async fn fetch_window(
        &self,
        collection: &str,
        window_hours: u32,
    ) -> Result<Vec<SourceItem>, FetchError> {
        let cutoff_ms = self.clock.now_epoch_ms().await - i64::from(window_hours) * 3_600_000;
        let posts = self.posts_in_window(collection, cutoff_ms).await?;

        let mut items = Vec::with_capacity(posts.len());
        for post in posts {
            let id = post["id"].as_str().unwrap_or_default().to_string();
            // A thread that cannot be read keeps the post with no replies; the next
            // refresh sees the replies as a content change.
            let replies = if self.fetch_replies {
                match self.thread(&id).await {
                    Ok(Some((_, replies))) => replies,
                    Ok(None) => {
                        warn!(item_id = %id, "Thread not found, keeping post without replies");
                        Vec::new()
                    }
                    Err(e) => {
                        warn!(
                            item_id = %id,
                            error = %e,
                            "Reply fetch failed, keeping post without replies"
                        );
                        Vec::new()
                    }
                }
            } else {
                Vec::new()
            };
            items.push(to_source_item(&post, replies));
        }

        info!(collection, window_hours, items = items.len(), "Fetched window");
        Ok(items)
    }

    async fn fetch_one(&self, item_id: &str) -> Result<Option<SourceItem>, FetchError> {
        let Some((post, replies)) = self.thread(item_id).await? else {
            return Ok(None);
        };
        if is_gone(&post) {
            info!(item_id, "Item gone upstream");
            return Ok(None);
        }
        Ok(Some(to_source_item(&post, replies)))
    }
}
