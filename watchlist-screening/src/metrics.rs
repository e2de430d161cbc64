//! Metrics collection for observability
//!
//! # Metrics
//!
//! - `watchlist_refresh_total{outcome}` - Refresh cycles by outcome
//! - `watchlist_refresh_duration_seconds` - Histogram of refresh cycle durations
//! - `watchlist_parse_skipped_entries_total` - Malformed entries skipped while parsing
//! - `watchlist_cached_records` - Records in the current snapshot
//! - `screening_queries_total` - Screening queries answered
//! - `screening_hits_total` - Screening queries with at least one match

use prometheus::{Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry};
use std::sync::Arc;

/// Metrics collector
#[derive(Clone)]
pub struct Metrics {
    /// Refresh cycles by outcome (`swapped`, `skipped_empty`, `failed`)
    pub refresh_total: IntCounterVec,

    /// Refresh duration histogram
    pub refresh_duration: Histogram,

    /// Skipped parse entries
    pub parse_skipped: IntCounter,

    /// Records in the current snapshot
    pub cached_records: IntGauge,

    /// Screening queries answered
    pub queries_total: IntCounter,

    /// Screening queries with a match
    pub hits_total: IntCounter,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl Metrics {
    /// Create new metrics collector with its own registry
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let refresh_total = IntCounterVec::new(
            Opts::new("watchlist_refresh_total", "Refresh cycles by outcome"),
            &["outcome"],
        )?;
        registry.register(Box::new(refresh_total.clone()))?;

        let refresh_duration = Histogram::with_opts(
            HistogramOpts::new(
                "watchlist_refresh_duration_seconds",
                "Histogram of refresh cycle durations",
            )
            .buckets(vec![0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]),
        )?;
        registry.register(Box::new(refresh_duration.clone()))?;

        let parse_skipped = IntCounter::new(
            "watchlist_parse_skipped_entries_total",
            "Malformed entries skipped while parsing",
        )?;
        registry.register(Box::new(parse_skipped.clone()))?;

        let cached_records =
            IntGauge::new("watchlist_cached_records", "Records in the current snapshot")?;
        registry.register(Box::new(cached_records.clone()))?;

        let queries_total = IntCounter::new("screening_queries_total", "Screening queries answered")?;
        registry.register(Box::new(queries_total.clone()))?;

        let hits_total =
            IntCounter::new("screening_hits_total", "Screening queries with at least one match")?;
        registry.register(Box::new(hits_total.clone()))?;

        Ok(Self {
            refresh_total,
            refresh_duration,
            parse_skipped,
            cached_records,
            queries_total,
            hits_total,
            registry,
        })
    }

    /// Record a finished refresh cycle
    pub fn record_refresh(&self, outcome: &str, duration_seconds: f64) {
        self.refresh_total.with_label_values(&[outcome]).inc();
        self.refresh_duration.observe(duration_seconds);
    }

    /// Record skipped entries from a parse pass
    pub fn record_parse_skipped(&self, skipped: usize) {
        self.parse_skipped.inc_by(skipped as u64);
    }

    /// Update the cached record gauge
    pub fn set_cached_records(&self, count: usize) {
        self.cached_records.set(count as i64);
    }

    /// Record an answered screening query
    pub fn record_query(&self, hit: bool) {
        self.queries_total.inc();
        if hit {
            self.hits_total.inc();
        }
    }

    /// Get metrics registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics")
            .field("queries_total", &self.queries_total.get())
            .field("cached_records", &self.cached_records.get())
            .finish()
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new().expect("Failed to create metrics")
    }
}
