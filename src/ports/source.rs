//! Source fetcher abstraction: recent items per collection and single-item refresh.
use tracing::warn;

use crate::domain::error::FetchError;
use crate::domain::model::SourceItem;

#[derive(Debug, Clone, Default)]
pub struct FetchBatch {
    pub items: Vec<SourceItem>,
    pub failed_collections: Vec<String>,
}

#[async_trait::async_trait]
pub trait SourceFetcher: Send + Sync {
    /// Every item of `collection` created within the last `window_hours`.
    async fn fetch_window(
        &self,
        collection: &str,
        window_hours: u32,
    ) -> Result<Vec<SourceItem>, FetchError>;

    /// `Ok(None)` means the item is gone upstream (deleted or removed), which is
    /// distinct from a fetch error.
    async fn fetch_one(&self, item_id: &str) -> Result<Option<SourceItem>, FetchError>;

    /// Fetches every collection in turn. A collection that fails is reported in
    /// `failed_collections` and does not stop the others.
    async fn fetch_recent(&self, collections: &[String], window_hours: u32) -> FetchBatch {
        let mut batch = FetchBatch::default();
        for collection in collections {
            match self.fetch_window(collection, window_hours).await {
                Ok(items) => batch.items.extend(items),
                Err(e) => {
                    warn!(collection = %collection, error = %e, "Collection fetch failed");
                    batch.failed_collections.push(collection.clone());
                }
            }
        }
        batch
    }
}
