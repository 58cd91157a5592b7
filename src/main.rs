use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use postmirror::app::{
    context::AppContext,
    pipeline::{Pipeline, RunMode},
};
use postmirror::infra::{
    clock::SystemClock,
    config::ConfigLoader,
    http_documents::HttpDocumentStore,
    logging::{init_logging, BootError},
    random::MutexRng,
    rate_limiter::RateLimiter,
    reddit_source::RedditSource,
    retrying_source::RetryingSource,
    sqlite_repo::SqliteRepo,
};
use tracing::{error, info};

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Mirror forum posts and reply threads into a document store"
)]
struct Args {
    /// Path to config.toml (defaults to CONFIG_PATH or res/config.toml).
    config_path: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = ModeArg::Full)]
    mode: ModeArg,

    /// Shorthand for `--mode dry-run`.
    #[arg(long)]
    dry_run: bool,

    /// Overrides `source.window_hours` for this run.
    #[arg(long)]
    hours: Option<u32>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ModeArg {
    Full,
    ScrapeOnly,
    UpdateOnly,
    QueueOnly,
    DryRun,
}

impl From<ModeArg> for RunMode {
    fn from(m: ModeArg) -> Self {
        match m {
            ModeArg::Full => RunMode::Full,
            ModeArg::ScrapeOnly => RunMode::ScrapeOnly,
            ModeArg::UpdateOnly => RunMode::UpdateOnly,
            ModeArg::QueueOnly => RunMode::QueueOnly,
            ModeArg::DryRun => RunMode::DryRun,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), BootError> {
    let args = Args::parse();
    let mode = if args.dry_run {
        RunMode::DryRun
    } else {
        RunMode::from(args.mode)
    };

    let cfg_path = pick_config_path(args.config_path);
    let mut cfg = ConfigLoader::load(&cfg_path)
        .await
        .map_err(|e| BootError::Fatal(e.to_string()))?;
    if let Some(h) = args.hours.filter(|h| *h > 0) {
        cfg.source.window_hours = h;
    }
    init_logging(&cfg.log_level);

    info!(
        config = %cfg_path.display(),
        db_path = %cfg.db_path.display(),
        timezone = %cfg.timezone,
        collections = cfg.source.collections.len(),
        window_hours = cfg.source.window_hours,
        mode = mode.as_str(),
        "Loaded config"
    );

    let repo = SqliteRepo::open(&cfg.db_path, cfg.timezone, mode.touches_store())
        .await
        .map_err(BootError::Fatal)?;

    let rng = Arc::new(MutexRng::new());
    let limiter = Arc::new(RateLimiter::new(Duration::from_millis(
        cfg.source.effective_min_delay_ms(),
    )));
    let clock = Arc::new(SystemClock);
    let reddit = RedditSource::new(&cfg.source, limiter, clock.clone())
        .map_err(|e| BootError::Fatal(e.to_string()))?;
    let source = RetryingSource::new(
        reddit,
        rng.clone(),
        cfg.source.window_retry,
        cfg.source.item_retry,
        Duration::from_millis(cfg.source.collection_pause_ms),
    );
    let documents =
        HttpDocumentStore::new(&cfg.documents).map_err(|e| BootError::Fatal(e.to_string()))?;

    let ctx = AppContext {
        cfg,
        repo: Arc::new(repo),
        source: Arc::new(source),
        documents: Arc::new(documents),
        clock,
        rng,
    };

    let pipeline = Pipeline::new(ctx);
    match pipeline.run(mode).await {
        Ok(stats) => {
            let json = serde_json::to_string_pretty(&stats)
                .map_err(|e| BootError::Fatal(e.to_string()))?;
            println!("{json}");
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Fatal error");
            Err(BootError::Fatal(e.to_string()))
        }
    }
}

fn pick_config_path(arg: Option<PathBuf>) -> PathBuf {
    if let Some(p) = arg {
        return p;
    }
    if let Ok(p) = std::env::var("CONFIG_PATH") {
        if !p.trim().is_empty() {
            return PathBuf::from(p);
        }
    }
    PathBuf::from("res/config.toml")
}
