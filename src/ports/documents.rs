//! Document store abstraction: ingest, metadata patch, delete.
use serde_json::{Map, Value};

use crate::domain::document::DocumentContent;

#[async_trait::async_trait]
pub trait DocumentStore: Send + Sync {
    /// Returns the store's document id.
    async fn ingest(&self, doc: &DocumentContent) -> Result<String, String>;
    async fn patch_metadata(&self, doc_id: &str, metadata: &Map<String, Value>) -> bool;
    async fn delete(&self, doc_id: &str) -> bool;
}
