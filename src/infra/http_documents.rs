//! Reqwest-backed `DocumentStore` speaking a small JSON API:
//! `POST {base}/datastores/{id}/documents`, `PUT .../documents/{doc}/metadata`,
//! `DELETE .../documents/{doc}`, all with bearer auth.
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::domain::document::DocumentContent;
use crate::domain::model::DocumentStoreConfig;
use crate::ports::documents::DocumentStore;

pub struct HttpDocumentStore {
    client: reqwest::Client,
    documents_url: String,
    api_key: String,
}

#[derive(Serialize)]
struct IngestBody<'a> {
    name: &'a str,
    content_type: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct IngestResponse {
    id: String,
}

#[derive(Serialize)]
struct MetadataBody<'a> {
    custom_metadata: &'a Map<String, Value>,
}

impl HttpDocumentStore {
    pub fn new(cfg: &DocumentStoreConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;
        Ok(Self {
            client,
            documents_url: format!(
                "{}/datastores/{}/documents",
                cfg.base_url.trim_end_matches('/'),
                cfg.datastore_id
            ),
            api_key: cfg.api_key.clone(),
        })
    }

    async fn put_metadata(&self, doc_id: &str, metadata: &Map<String, Value>) -> Result<(), String> {
        let url = format!("{}/{doc_id}/metadata", self.documents_url);
        let resp = self
            .client
            .put(&url)
            .bearer_auth(&self.api_key)
            .json(&MetadataBody {
                custom_metadata: metadata,
            })
            .send()
            .await
            .map_err(|e| format!("metadata request error: {e}"))?;
        if !resp.status().is_success() {
            return Err(format!("metadata HTTP {}", resp.status().as_u16()));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl DocumentStore for HttpDocumentStore {
    async fn ingest(&self, doc: &DocumentContent) -> Result<String, String> {
        debug!(name = %doc.name, bytes = doc.body.len(), "Ingest start");
        let resp = self
            .client
            .post(&self.documents_url)
            .bearer_auth(&self.api_key)
            .json(&IngestBody {
                name: &doc.name,
                content_type: doc.content_type,
                content: &doc.body,
            })
            .send()
            .await
            .map_err(|e| format!("ingest request error: {e}"))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(format!("ingest HTTP {}: {body}", status.as_u16()));
        }
        let parsed: IngestResponse = resp
            .json()
            .await
            .map_err(|e| format!("ingest response error: {e}"))?;

        // The document exists at this point; missing metadata is patched next cycle.
        if let Err(e) = self.put_metadata(&parsed.id, &doc.metadata).await {
            warn!(doc_id = %parsed.id, error = %e, "Metadata set after ingest failed");
        }

        info!(name = %doc.name, doc_id = %parsed.id, "Document ingested");
        Ok(parsed.id)
    }

    async fn patch_metadata(&self, doc_id: &str, metadata: &Map<String, Value>) -> bool {
        match self.put_metadata(doc_id, metadata).await {
            Ok(()) => true,
            Err(e) => {
                warn!(doc_id, error = %e, "Metadata patch failed");
                false
            }
        }
    }

    async fn delete(&self, doc_id: &str) -> bool {
        let url = format!("{}/{doc_id}", self.documents_url);
        match self.client.delete(&url).bearer_auth(&self.api_key).send().await {
            Ok(resp) if resp.status().is_success() => {
                info!(doc_id, "Document deleted");
                true
            }
            Ok(resp) => {
                warn!(doc_id, status = resp.status().as_u16(), "Document delete failed");
                false
            }
            Err(e) => {
                warn!(doc_id, error = %e, "Document delete failed");
                false
            }
        }
    }
}
