//! Loads the TOML configuration file and normalizes it into `AppConfig`.
use std::path::{Path, PathBuf};

use chrono_tz::Tz;
use serde::Deserialize;
use tokio::fs;

use crate::domain::model::{
    AppConfig, DocumentStoreConfig, LifecycleConfig, QueueConfig, RetryPolicy, SourceConfig,
};

pub const API_KEY_ENV: &str = "POSTMIRROR_DOCSTORE_API_KEY";
const DEFAULT_TIMEZONE: &str = "America/Los_Angeles";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("toml: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Deserialize)]
struct RawAppFile {
    #[serde(default)]
    app: RawApp,
    #[serde(default)]
    database: RawDatabase,
    source: RawSource,
    #[serde(default)]
    lifecycle: RawLifecycle,
    #[serde(default)]
    queue: RawQueue,
    document_store: RawDocumentStore,
    #[serde(default)]
    logging: RawLogging,
}

#[derive(Debug, Deserialize, Default)]
struct RawApp {
    timezone: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawDatabase {
    #[serde(default = "default_db_path")]
    path: String,
}

impl Default for RawDatabase {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawSource {
    collections: Vec<String>,
    #[serde(default = "default_window_hours")]
    window_hours: u32,
    #[serde(default = "default_source_base_url")]
    base_url: String,
    #[serde(default = "default_user_agent")]
    user_agent: String,
    #[serde(default = "default_max_replies")]
    max_replies: usize,
    #[serde(default = "default_true")]
    fetch_replies: bool,
    #[serde(default = "default_requests_per_minute")]
    requests_per_minute: u32,
    #[serde(default = "default_min_request_delay_ms")]
    min_request_delay_ms: u64,
    #[serde(default = "default_collection_pause_ms")]
    collection_pause_ms: u64,
    #[serde(default)]
    window_retry: RawRetry,
    #[serde(default)]
    item_retry: RawRetry,
}

#[derive(Debug, Deserialize, Default)]
struct RawRetry {
    max_attempts: Option<u32>,
    min_delay_ms: Option<u64>,
    max_delay_ms: Option<u64>,
    multiplier: Option<u64>,
    jitter: Option<bool>,
}

impl RawRetry {
    fn or(self, base: RetryPolicy) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts.unwrap_or(base.max_attempts),
            min_delay_ms: self.min_delay_ms.unwrap_or(base.min_delay_ms),
            max_delay_ms: self.max_delay_ms.unwrap_or(base.max_delay_ms),
            multiplier: self.multiplier.unwrap_or(base.multiplier),
            jitter: self.jitter.unwrap_or(base.jitter),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawLifecycle {
    #[serde(default)]
    refresh_at: i64,
    #[serde(default = "default_freeze_at")]
    freeze_at: i64,
    #[serde(default)]
    always_reingest_on_refresh: bool,
    #[serde(default = "default_update_window_days")]
    update_window_days: u32,
    #[serde(default = "default_retention_days")]
    retention_days: u32,
    #[serde(default = "default_update_pause_ms")]
    update_pause_ms: u64,
}

impl Default for RawLifecycle {
    fn default() -> Self {
        Self {
            refresh_at: 0,
            freeze_at: default_freeze_at(),
            always_reingest_on_refresh: false,
            update_window_days: default_update_window_days(),
            retention_days: default_retention_days(),
            update_pause_ms: default_update_pause_ms(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawQueue {
    #[serde(default = "default_queue_base_delay_minutes")]
    base_delay_minutes: u64,
    #[serde(default = "default_queue_max_attempts")]
    max_attempts: i64,
    #[serde(default = "default_drain_batch")]
    drain_batch: i64,
    #[serde(default = "default_queue_pause_ms")]
    pause_ms: u64,
}

impl Default for RawQueue {
    fn default() -> Self {
        Self {
            base_delay_minutes: default_queue_base_delay_minutes(),
            max_attempts: default_queue_max_attempts(),
            drain_batch: default_drain_batch(),
            pause_ms: default_queue_pause_ms(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawDocumentStore {
    base_url: String,
    datastore_id: String,
    api_key: Option<String>,
    #[serde(default)]
    ingest_retry: RawRetry,
    #[serde(default)]
    reingest_retry: RawRetry,
    #[serde(default)]
    delete_retry: RawRetry,
}

#[derive(Debug, Deserialize, Default)]
struct RawLogging {
    level: Option<String>,
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub async fn load(config_path: &Path) -> Result<AppConfig, ConfigError> {
        let content = fs::read_to_string(config_path).await?;
        let env_key = std::env::var(API_KEY_ENV).ok();
        Self::parse(&content, config_path, env_key)
    }

    /// Parses and validates file content. `env_api_key` is consulted only when the file
    /// carries no key.
    pub fn parse(
        content: &str,
        config_path: &Path,
        env_api_key: Option<String>,
    ) -> Result<AppConfig, ConfigError> {
        let raw: RawAppFile = toml::from_str(content)?;

        let tz_str = raw
            .app
            .timezone
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_TIMEZONE);
        let timezone: Tz = tz_str
            .parse()
            .map_err(|_| ConfigError::Invalid(format!("invalid timezone '{tz_str}'")))?;

        let log_level = normalize_log_level(raw.logging.level.as_deref().unwrap_or("info"))?;
        let db_path = resolve_db_path(config_path, &raw.database.path);

        let source = build_source(raw.source)?;
        let lifecycle = build_lifecycle(raw.lifecycle)?;
        let queue = build_queue(raw.queue)?;
        let documents = build_documents(raw.document_store, env_api_key)?;

        Ok(AppConfig {
            db_path,
            timezone,
            log_level,
            source,
            lifecycle,
            queue,
            documents,
        })
    }
}

fn build_source(raw: RawSource) -> Result<SourceConfig, ConfigError> {
    let mut collections: Vec<String> = Vec::new();
    for c in raw.collections {
        let name = c.trim();
        let name = name.strip_prefix("r/").unwrap_or(name).trim();
        if name.is_empty() {
            continue;
        }
        if !collections.iter().any(|x| x.eq_ignore_ascii_case(name)) {
            collections.push(name.to_string());
        }
    }
    if collections.is_empty() {
        return Err(ConfigError::Invalid(
            "source.collections must name at least one collection".into(),
        ));
    }
    if raw.window_hours == 0 {
        return Err(ConfigError::Invalid("source.window_hours must be > 0".into()));
    }

    Ok(SourceConfig {
        collections,
        window_hours: raw.window_hours,
        base_url: raw.base_url,
        user_agent: raw.user_agent,
        max_replies: raw.max_replies,
        fetch_replies: raw.fetch_replies,
        requests_per_minute: raw.requests_per_minute,
        min_request_delay_ms: raw.min_request_delay_ms,
        collection_pause_ms: raw.collection_pause_ms,
        window_retry: raw.window_retry.or(default_window_retry()),
        item_retry: raw.item_retry.or(default_item_retry()),
    })
}

fn build_lifecycle(raw: RawLifecycle) -> Result<LifecycleConfig, ConfigError> {
    if raw.freeze_at <= raw.refresh_at {
        return Err(ConfigError::Invalid(format!(
            "lifecycle.freeze_at ({}) must be greater than refresh_at ({})",
            raw.freeze_at, raw.refresh_at
        )));
    }
    Ok(LifecycleConfig {
        refresh_at: raw.refresh_at,
        freeze_at: raw.freeze_at,
        always_reingest_on_refresh: raw.always_reingest_on_refresh,
        update_window_days: raw.update_window_days,
        retention_days: raw.retention_days,
        update_pause_ms: raw.update_pause_ms,
    })
}

fn build_queue(raw: RawQueue) -> Result<QueueConfig, ConfigError> {
    if raw.max_attempts <= 0 {
        return Err(ConfigError::Invalid("queue.max_attempts must be > 0".into()));
    }
    if raw.drain_batch <= 0 {
        return Err(ConfigError::Invalid("queue.drain_batch must be > 0".into()));
    }
    Ok(QueueConfig {
        base_delay_minutes: raw.base_delay_minutes,
        max_attempts: raw.max_attempts,
        drain_batch: raw.drain_batch,
        pause_ms: raw.pause_ms,
    })
}

fn build_documents(
    raw: RawDocumentStore,
    env_api_key: Option<String>,
) -> Result<DocumentStoreConfig, ConfigError> {
    let base_url = raw.base_url.trim().trim_end_matches('/').to_string();
    if base_url.is_empty() {
        return Err(ConfigError::Invalid("document_store.base_url cannot be empty".into()));
    }
    let datastore_id = raw.datastore_id.trim().to_string();
    if datastore_id.is_empty() {
        return Err(ConfigError::Invalid(
            "document_store.datastore_id cannot be empty".into(),
        ));
    }
    let api_key = resolve_api_key(raw.api_key, env_api_key).ok_or_else(|| {
        ConfigError::Invalid(format!(
            "document_store.api_key missing (set it in the file or via {API_KEY_ENV})"
        ))
    })?;

    Ok(DocumentStoreConfig {
        base_url,
        datastore_id,
        api_key,
        ingest_retry: raw.ingest_retry.or(default_ingest_retry()),
        reingest_retry: raw.reingest_retry.or(default_reingest_retry()),
        delete_retry: raw.delete_retry.or(default_delete_retry()),
    })
}

/// File value first, environment second; blank strings count as absent.
pub fn resolve_api_key(file: Option<String>, env: Option<String>) -> Option<String> {
    file.into_iter()
        .chain(env)
        .map(|k| k.trim().to_string())
        .find(|k| !k.is_empty())
}

fn normalize_log_level(level: &str) -> Result<String, ConfigError> {
    let l = level.trim().to_ascii_lowercase();
    match l.as_str() {
        "error" | "warn" | "info" | "debug" | "trace" | "off" => Ok(l),
        _ => Err(ConfigError::Invalid(format!(
            "invalid logging.level '{level}', expected error|warn|info|debug|trace|off"
        ))),
    }
}

/// Relative database paths are taken from the config file's directory.
fn resolve_db_path(config_path: &Path, db_path: &str) -> PathBuf {
    let p = Path::new(db_path);
    if p.is_absolute() {
        return p.to_path_buf();
    }
    config_path
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join(p)
}

pub fn default_window_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 7,
        min_delay_ms: 4_000,
        max_delay_ms: 120_000,
        multiplier: 2,
        jitter: true,
    }
}

pub fn default_item_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 5,
        min_delay_ms: 4_000,
        max_delay_ms: 120_000,
        multiplier: 2,
        jitter: false,
    }
}

pub fn default_ingest_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 5,
        min_delay_ms: 4_000,
        max_delay_ms: 60_000,
        multiplier: 2,
        jitter: false,
    }
}

pub fn default_reingest_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        ..default_ingest_retry()
    }
}

/// Deletes are best effort, so the budget is short.
pub fn default_delete_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        min_delay_ms: 2_000,
        max_delay_ms: 10_000,
        multiplier: 2,
        jitter: false,
    }
}

fn default_db_path() -> String {
    "postmirror.db".to_string()
}

fn default_window_hours() -> u32 {
    26
}

fn default_source_base_url() -> String {
    "https://www.reddit.com".to_string()
}

fn default_user_agent() -> String {
    format!("postmirror/{}", env!("CARGO_PKG_VERSION"))
}

fn default_max_replies() -> usize {
    100
}

fn default_true() -> bool {
    true
}

fn default_requests_per_minute() -> u32 {
    30
}

fn default_min_request_delay_ms() -> u64 {
    2_000
}

fn default_collection_pause_ms() -> u64 {
    2_000
}

fn default_freeze_at() -> i64 {
    2
}

fn default_update_window_days() -> u32 {
    2
}

fn default_retention_days() -> u32 {
    30
}

fn default_update_pause_ms() -> u64 {
    500
}

fn default_queue_base_delay_minutes() -> u64 {
    5
}

fn default_queue_max_attempts() -> i64 {
    5
}

fn default_drain_batch() -> i64 {
    50
}

fn default_queue_pause_ms() -> u64 {
    1_000
}
