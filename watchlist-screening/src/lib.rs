//! Watchlist Screening
//!
//! Screens extracted names against a locally cached copy of a published
//! sanctions watchlist.
//!
//! # Architecture
//!
//! - **Snapshot cache**: immutable snapshots swapped whole; queries never see a partial list
//! - **Single-flight refresh**: scheduled and manual triggers share one fetch-parse-swap cycle
//! - **Fail-open startup**: a failed refresh keeps serving the last good snapshot
//! - **Multi-rule matcher**: exact, containment, token majority, long token substring
//!
//! # Invariants
//!
//! - `record_count` in cache metadata always equals the number of cached records
//! - An empty parse never replaces a populated cache
//! - Queries never touch the network and never fail

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod config;
pub mod error;
pub mod matcher;
pub mod metrics;
pub mod normalize;
pub mod parser;
pub mod refresh;
pub mod scheduler;
pub mod screening;
pub mod source;
pub mod store;
pub mod types;

// Re-exports
pub use config::Config;
pub use error::{Error, Result};
pub use matcher::{MatchRule, MatcherConfig, NameMatcher};
pub use metrics::Metrics;
pub use parser::{RecordParser, UnConsolidatedParser};
pub use refresh::{RefreshAck, RefreshCoordinator, RefreshOutcome, RefreshReport, RefreshTrigger};
pub use scheduler::{RefreshSchedule, RefreshScheduler};
pub use screening::ScreeningService;
pub use source::{FileSource, HttpSource, StaticSource, WatchlistSource};
pub use store::{CacheStore, JsonFileBackend, MemoryBackend, SnapshotBackend};
pub use types::{
    CacheMetadata, CacheSnapshot, SanctionMatch, ScreeningQuery, ScreeningResult,
    WatchlistRecord,
};
