//! Refresh coordinator
//!
//! Every refresh, scheduled, manual or at startup, goes through
//! [`RefreshCoordinator::refresh`]. One cycle runs at a time:
//!
//! ```text
//! Idle -> Fetching -> Parsing -> Validating -> Swapping -> Idle
//!            |                       |            |
//!            v                       v            v
//!          Failed              SkippedEmpty     Failed
//! ```
//!
//! A caller that arrives while a cycle is in flight waits for that cycle and
//! gets its report back (marked `coalesced`) instead of fetching again.
//! Refresh failures are reported, logged and contained here; the cache keeps
//! serving the last good snapshot.

use crate::error::Error;
use crate::metrics::Metrics;
use crate::parser::RecordParser;
use crate::source::{SourceDocument, WatchlistSource};
use crate::store::CacheStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Refresh cycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RefreshState {
    /// No cycle running
    Idle,
    /// Downloading the source document
    Fetching,
    /// Running the record parser
    Parsing,
    /// Checking the parse result before committing
    Validating,
    /// Committing the new snapshot
    Swapping,
    /// Cycle aborted; previous snapshot kept
    Failed,
    /// Parse produced no records; previous snapshot kept
    SkippedEmpty,
}

impl fmt::Display for RefreshState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RefreshState::Idle => "idle",
            RefreshState::Fetching => "fetching",
            RefreshState::Parsing => "parsing",
            RefreshState::Validating => "validating",
            RefreshState::Swapping => "swapping",
            RefreshState::Failed => "failed",
            RefreshState::SkippedEmpty => "skipped_empty",
        };
        write!(f, "{}", name)
    }
}

/// What started a refresh
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RefreshTrigger {
    /// Startup check found the cache invalid
    Startup,
    /// Periodic schedule tick
    Scheduled,
    /// Operator request
    Manual,
}

/// Stage at which a cycle failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureKind {
    /// Network failure or non-success status
    Fetch,
    /// Parser task did not complete
    Parse,
    /// Snapshot could not be committed
    CacheSwap,
}

/// Result of one refresh cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RefreshOutcome {
    /// New snapshot is live
    Swapped {
        /// Records in the new snapshot
        record_count: usize,
        /// Provenance of the new snapshot
        source_version_tag: String,
    },
    /// Parse yielded nothing; cache and metadata untouched
    SkippedEmpty {
        /// Malformed entries seen during the parse
        skipped_entries: usize,
    },
    /// Cycle aborted; cache and metadata untouched
    Failed {
        /// Failing stage
        kind: FailureKind,
        /// Error description
        reason: String,
    },
}

impl RefreshOutcome {
    /// Metric label
    pub fn label(&self) -> &'static str {
        match self {
            RefreshOutcome::Swapped { .. } => "swapped",
            RefreshOutcome::SkippedEmpty { .. } => "skipped_empty",
            RefreshOutcome::Failed { .. } => "failed",
        }
    }

    /// True when a new snapshot was committed
    pub fn is_swapped(&self) -> bool {
        matches!(self, RefreshOutcome::Swapped { .. })
    }
}

/// Report of a finished cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefreshReport {
    /// Sequence number of the cycle, starting at 1
    pub cycle: u64,
    /// What started the cycle
    pub trigger: RefreshTrigger,
    /// Cycle result
    pub outcome: RefreshOutcome,
    /// Cycle start
    pub started_at: DateTime<Utc>,
    /// Cycle end
    pub finished_at: DateTime<Utc>,
    /// True when the caller attached to a cycle another trigger started
    pub coalesced: bool,
}

/// Acknowledgement of a manual trigger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefreshAck {
    /// Always `refresh_initiated`
    pub status: String,
    /// A cycle was already in flight; the request attaches to it
    pub already_running: bool,
    /// When the request was accepted
    pub requested_at: DateTime<Utc>,
}

/// Drives refresh cycles against one source, parser and store
pub struct RefreshCoordinator {
    store: Arc<CacheStore>,
    source: Arc<dyn WatchlistSource>,
    parser: Arc<dyn RecordParser>,
    metrics: Metrics,
    in_flight: Mutex<()>,
    completed: AtomicU64,
    last_report: parking_lot::Mutex<Option<RefreshReport>>,
    state: parking_lot::RwLock<RefreshState>,
}

impl fmt::Debug for RefreshCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefreshCoordinator")
            .field("source", &self.source.source_id())
            .field("parser", &self.parser.format())
            .field("state", &self.state())
            .field("completed", &self.completed.load(Ordering::Acquire))
            .finish()
    }
}

impl RefreshCoordinator {
    /// Create coordinator
    pub fn new(
        store: Arc<CacheStore>,
        source: Arc<dyn WatchlistSource>,
        parser: Arc<dyn RecordParser>,
        metrics: Metrics,
    ) -> Self {
        metrics.set_cached_records(store.record_count());

        Self {
            store,
            source,
            parser,
            metrics,
            in_flight: Mutex::new(()),
            completed: AtomicU64::new(0),
            last_report: parking_lot::Mutex::new(None),
            state: parking_lot::RwLock::new(RefreshState::Idle),
        }
    }

    /// Store this coordinator writes to
    pub fn store(&self) -> &Arc<CacheStore> {
        &self.store
    }

    /// Current cycle state
    pub fn state(&self) -> RefreshState {
        *self.state.read()
    }

    /// Report of the most recent finished cycle
    pub fn last_report(&self) -> Option<RefreshReport> {
        self.last_report.lock().clone()
    }

    /// Number of cycles that have run to an outcome
    pub fn completed_cycles(&self) -> u64 {
        self.completed.load(Ordering::Acquire)
    }

    /// Populate the cache at startup if it is missing or stale
    ///
    /// Fail-open: a failed refresh is logged and startup continues with whatever
    /// the cache holds. Returns the report when a cycle ran.
    pub async fn initialize(&self) -> Option<RefreshReport> {
        if self.store.is_valid() {
            info!(
                records = self.store.record_count(),
                "Watchlist cache is valid, skipping startup refresh"
            );
            return None;
        }

        info!("Watchlist cache missing or stale, refreshing before serving");
        let report = self.refresh(RefreshTrigger::Startup).await;

        if !report.outcome.is_swapped() {
            warn!(
                outcome = report.outcome.label(),
                records = self.store.record_count(),
                "Startup refresh did not update the cache, serving existing data"
            );
        }

        Some(report)
    }

    /// Start a refresh in the background and return at once
    ///
    /// Must be called from within a Tokio runtime.
    pub fn trigger_manual(self: &Arc<Self>) -> RefreshAck {
        // Read before checking the lock, so a cycle seen running here is the one attached to
        let seen = self.completed.load(Ordering::Acquire);
        let already_running = self.in_flight.try_lock().is_err();
        info!(already_running, "Manual watchlist refresh requested");

        let coordinator = Arc::clone(self);
        tokio::spawn(async move {
            coordinator.refresh_after(seen, RefreshTrigger::Manual).await;
        });

        RefreshAck {
            status: "refresh_initiated".to_string(),
            already_running,
            requested_at: Utc::now(),
        }
    }

    /// Run one refresh cycle, or attach to the one in flight
    pub async fn refresh(&self, trigger: RefreshTrigger) -> RefreshReport {
        let seen = self.completed.load(Ordering::Acquire);
        self.refresh_after(seen, trigger).await
    }

    /// Attach to any cycle completed after `seen`, else run a new one
    async fn refresh_after(&self, seen: u64, trigger: RefreshTrigger) -> RefreshReport {
        let _guard = self.in_flight.lock().await;

        if self.completed.load(Ordering::Acquire) != seen {
            if let Some(report) = self.last_report() {
                debug!(
                    ?trigger,
                    cycle = report.cycle,
                    "Refresh request coalesced into in-flight cycle"
                );
                return RefreshReport {
                    coalesced: true,
                    ..report
                };
            }
        }

        let cycle = self.completed.load(Ordering::Acquire) + 1;
        let report = self.run_cycle(cycle, trigger).await;

        *self.last_report.lock() = Some(report.clone());
        self.completed.fetch_add(1, Ordering::AcqRel);

        report
    }

    async fn run_cycle(&self, cycle: u64, trigger: RefreshTrigger) -> RefreshReport {
        let started = Instant::now();
        let started_at = Utc::now();
        info!(cycle, ?trigger, source = self.source.source_id(), "Watchlist refresh started");

        self.set_state(RefreshState::Fetching);
        let outcome = match self.source.fetch().await {
            Ok(document) => self.ingest(document).await,
            Err(e) => {
                self.set_state(RefreshState::Failed);
                warn!(cycle, "Watchlist fetch failed, keeping current cache: {}", e);
                RefreshOutcome::Failed {
                    kind: FailureKind::Fetch,
                    reason: e.to_string(),
                }
            }
        };
        self.set_state(RefreshState::Idle);

        let elapsed = started.elapsed().as_secs_f64();
        self.metrics.record_refresh(outcome.label(), elapsed);
        self.metrics.set_cached_records(self.store.record_count());

        info!(
            cycle,
            outcome = outcome.label(),
            records = self.store.record_count(),
            elapsed_secs = elapsed,
            "Watchlist refresh finished"
        );

        RefreshReport {
            cycle,
            trigger,
            outcome,
            started_at,
            finished_at: Utc::now(),
            coalesced: false,
        }
    }

    async fn ingest(&self, document: SourceDocument) -> RefreshOutcome {
        self.set_state(RefreshState::Parsing);
        let version_tag = document.version_tag();
        let parser = Arc::clone(&self.parser);
        let parsed = tokio::task::spawn_blocking(move || {
            parser.parse(&document.text, document.fetched_at)
        })
        .await;

        let parsed = match parsed {
            Ok(parsed) => parsed,
            Err(e) => {
                self.set_state(RefreshState::Failed);
                error!("Watchlist parse task failed: {}", e);
                return RefreshOutcome::Failed {
                    kind: FailureKind::Parse,
                    reason: e.to_string(),
                };
            }
        };

        self.set_state(RefreshState::Validating);
        if parsed.skipped_entries > 0 {
            warn!(
                skipped = parsed.skipped_entries,
                "Skipped malformed watchlist entries"
            );
            self.metrics.record_parse_skipped(parsed.skipped_entries);
        }

        if parsed.records.is_empty() {
            self.set_state(RefreshState::SkippedEmpty);
            warn!(
                existing_records = self.store.record_count(),
                "Watchlist parse produced no records, keeping current cache"
            );
            return RefreshOutcome::SkippedEmpty {
                skipped_entries: parsed.skipped_entries,
            };
        }

        self.set_state(RefreshState::Swapping);
        let store = Arc::clone(&self.store);
        let swapped = tokio::task::spawn_blocking(move || {
            store.replace(parsed.records, version_tag, Utc::now())
        })
        .await
        .unwrap_or_else(|e| Err(Error::CacheSwap(format!("swap task failed: {}", e))));

        match swapped {
            Ok(metadata) => RefreshOutcome::Swapped {
                record_count: metadata.record_count,
                source_version_tag: metadata.source_version_tag,
            },
            Err(e) => {
                self.set_state(RefreshState::Failed);
                error!("Watchlist snapshot swap failed, keeping current cache: {}", e);
                RefreshOutcome::Failed {
                    kind: failure_kind(&e),
                    reason: e.to_string(),
                }
            }
        }
    }

    fn set_state(&self, next: RefreshState) {
        let previous = std::mem::replace(&mut *self.state.write(), next);
        debug!(from = %previous, to = %next, "Refresh state transition");
    }
}

fn failure_kind(error: &Error) -> FailureKind {
    match error {
        Error::Fetch(_) => FailureKind::Fetch,
        Error::ParseEntry(_) => FailureKind::Parse,
        Error::CacheSwap(_)
        | Error::Config(_)
        | Error::Scheduler(_)
        | Error::Serialization(_)
        | Error::Io(_)
        | Error::Other(_) => FailureKind::CacheSwap,
    }
}
