use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("transient fetch error: {0}")]
    Transient(String),
    #[error("rate limited: {0}")]
    RateLimited(String),
}

/// Errors surfaced by per-item processing. Only `Store` aborts a run.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("store: {0}")]
    Store(String),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("document store: {0}")]
    Document(String),
}

impl SyncError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, SyncError::Store(_))
    }
}
