//! Watchlist screening node
//!
//! Loads configuration, warms the watchlist cache, and keeps it fresh on the
//! configured schedule until interrupted.
//!
//! Configuration is read from the file named by the first argument or
//! `WATCHLIST_CONFIG`; otherwise defaults plus `WATCHLIST_*` overrides.

use anyhow::Context;
use std::sync::Arc;
use watchlist_screening::{
    CacheStore, Config, FileSource, HttpSource, JsonFileBackend, MemoryBackend, Metrics,
    NameMatcher, RefreshCoordinator, RefreshSchedule, RefreshScheduler, ScreeningService,
    SnapshotBackend, UnConsolidatedParser, WatchlistSource,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = load_config()?;

    // Initialize tracing
    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(tracing::Level::INFO.into());
    if config.logging.json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    tracing::info!(source = %config.source.url, "Starting watchlist screening node");

    let metrics = Metrics::new().context("failed to create metrics")?;

    let backend: Box<dyn SnapshotBackend> = match &config.cache.snapshot_path {
        Some(path) => Box::new(JsonFileBackend::new(path)),
        None => Box::new(MemoryBackend),
    };
    let store = Arc::new(CacheStore::open(backend, config.cache.validity_window()));

    let source: Arc<dyn WatchlistSource> = match config.source.url.strip_prefix("file://") {
        Some(path) => Arc::new(FileSource::new(path)),
        None => Arc::new(HttpSource::new(&config.source).context("failed to build watchlist source")?),
    };

    let coordinator = Arc::new(RefreshCoordinator::new(
        store.clone(),
        source,
        Arc::new(UnConsolidatedParser::new()),
        metrics.clone(),
    ));

    coordinator.initialize().await;

    let service = ScreeningService::new(
        store,
        Some(coordinator.clone()),
        NameMatcher::new(config.matcher.clone()),
        metrics,
    );
    let metadata = service.cache_metadata();
    tracing::info!(
        records = service.cache_size(),
        version = metadata.as_ref().map(|m| m.source_version_tag.as_str()),
        "Watchlist cache ready"
    );

    let scheduler = match RefreshSchedule::from_config(&config.refresh)? {
        Some(schedule) => Some(
            RefreshScheduler::start(schedule, coordinator)
                .await
                .context("failed to start refresh scheduler")?,
        ),
        None => {
            tracing::warn!("Periodic refresh disabled");
            None
        }
    };

    tokio::signal::ctrl_c().await?;

    tracing::info!("Shutting down watchlist screening node");
    if let Some(scheduler) = scheduler {
        scheduler.shutdown().await?;
    }

    Ok(())
}

fn load_config() -> anyhow::Result<Config> {
    let path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("WATCHLIST_CONFIG").ok());

    match path {
        Some(path) => {
            let mut config = Config::from_file(&path)
                .with_context(|| format!("failed to load config from {}", path))?;
            config.apply_env()?;
            config.validate()?;
            Ok(config)
        }
        None => Ok(Config::from_env()?),
    }
}
