//! Wraps a `SourceFetcher` with local retries and the pause between collections.
//! "Gone" (`Ok(None)`) is an answer, not a failure, so it is never retried.
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::app::retry::retry_async;
use crate::domain::error::FetchError;
use crate::domain::model::{RetryPolicy, SourceItem};
use crate::ports::random::RandomSource;
use crate::ports::source::{FetchBatch, SourceFetcher};

pub struct RetryingSource<F, G>
where
    F: SourceFetcher,
    G: RandomSource,
{
    inner: F,
    rng: Arc<G>,
    window_retry: RetryPolicy,
    item_retry: RetryPolicy,
    collection_pause: Duration,
}

impl<F, G> RetryingSource<F, G>
where
    F: SourceFetcher,
    G: RandomSource,
{
    pub fn new(
        inner: F,
        rng: Arc<G>,
        window_retry: RetryPolicy,
        item_retry: RetryPolicy,
        collection_pause: Duration,
    ) -> Self {
        Self {
            inner,
            rng,
            window_retry,
            item_retry,
            collection_pause,
        }
    }
}

#[async_trait::async_trait]
impl<F, G> SourceFetcher for RetryingSource<F, G>
where
    F: SourceFetcher,
    G: RandomSource,
{
    async fn fetch_window(
        &self,
        collection: &str,
        window_hours: u32,
    ) -> Result<Vec<SourceItem>, FetchError> {
        retry_async(&self.window_retry, self.rng.as_ref(), "fetch_window", || {
            self.inner.fetch_window(collection, window_hours)
        })
        .await
    }

    async fn fetch_one(&self, item_id: &str) -> Result<Option<SourceItem>, FetchError> {
        retry_async(&self.item_retry, self.rng.as_ref(), "fetch_one", || {
            self.inner.fetch_one(item_id)
        })
        .await
    }

    async fn fetch_recent(&self, collections: &[String], window_hours: u32) -> FetchBatch {
        let mut batch = FetchBatch::default();
        for (i, collection) in collections.iter().enumerate() {
            if i > 0 && !self.collection_pause.is_zero() {
                tokio::time::sleep(self.collection_pause).await;
            }
            match self.fetch_window(collection, window_hours).await {
                Ok(items) => {
                    info!(collection = %collection, items = items.len(), "Collection fetched");
                    batch.items.extend(items);
                }
                Err(e) => {
                    warn!(collection = %collection, error = %e, "Collection failed after retries");
                    batch.failed_collections.push(collection.clone());
                }
            }
        }
        batch
    }
}
