//! Infrastructure adapters: config loading, logging setup, source client, document store
//! client, SQLite repo, time, randomness.
pub mod clock;
pub mod config;
pub mod http_documents;
pub mod logging;
pub mod random;
pub mod rate_limiter;
pub mod reddit_source;
pub mod retrying_source;
pub mod sqlite_repo;
pub mod time;
