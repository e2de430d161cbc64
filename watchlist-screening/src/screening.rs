//! Screening service

use crate::matcher::{NameKey, NameMatcher};
use crate::metrics::Metrics;
use crate::refresh::{RefreshAck, RefreshCoordinator};
use crate::store::CacheStore;
use crate::types::{CacheMetadata, SanctionMatch, ScreeningQuery, ScreeningResult};
use std::sync::Arc;
use tracing::{debug, info};

/// ScreeningService answers "is this name sanctioned?" from the cached watchlist
///
/// Queries never touch the network and never fail: a missing or unusable name,
/// or an empty cache, yields a clear result.
pub struct ScreeningService {
    store: Arc<CacheStore>,
    coordinator: Option<Arc<RefreshCoordinator>>,
    matcher: NameMatcher,
    metrics: Metrics,
}

impl std::fmt::Debug for ScreeningService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScreeningService")
            .field("store", &self.store)
            .field("matcher", &self.matcher)
            .finish()
    }
}

impl ScreeningService {
    /// Create service over `store`; `coordinator` backs [`Self::trigger_refresh`]
    pub fn new(
        store: Arc<CacheStore>,
        coordinator: Option<Arc<RefreshCoordinator>>,
        matcher: NameMatcher,
        metrics: Metrics,
    ) -> Self {
        Self {
            store,
            coordinator,
            matcher,
            metrics,
        }
    }

    /// Screen a name against the current snapshot
    pub fn check_sanctions(&self, name: Option<&str>) -> ScreeningResult {
        let name = match name.map(str::trim) {
            Some(name) if !name.is_empty() => name,
            _ => {
                debug!("Empty screening query, returning clear");
                self.metrics.record_query(false);
                return ScreeningResult::clear();
            }
        };

        let query = NameKey::from_raw(name);
        if query.is_empty() {
            debug!(query = name, "Query has no alphanumeric content, returning clear");
            self.metrics.record_query(false);
            return ScreeningResult::clear();
        }

        // One snapshot for the whole scan, even if a refresh swaps mid-query
        let snapshot = self.store.snapshot();
        let matches: Vec<SanctionMatch> = snapshot
            .records()
            .iter()
            .filter_map(|record| {
                let rule = self.matcher.matches(query.view(), NameKey::of_record(record))?;
                debug!(
                    query = %query.normalized,
                    candidate = %record.core_name,
                    %rule,
                    "Watchlist match"
                );
                Some(SanctionMatch {
                    name: record.core_name.clone(),
                })
            })
            .collect();

        let result = ScreeningResult::from_matches(matches);
        self.metrics.record_query(result.is_sanctioned);

        if result.is_sanctioned {
            info!(
                matches = result.matches.len(),
                scanned = snapshot.len(),
                "Screening hit"
            );
        }

        result
    }

    /// Screen a query
    pub fn screen(&self, query: &ScreeningQuery) -> ScreeningResult {
        self.check_sanctions(query.name.as_deref())
    }

    /// Records in the current snapshot
    pub fn cache_size(&self) -> usize {
        self.store.record_count()
    }

    /// Metadata of the current snapshot, absent before the first successful refresh
    pub fn cache_metadata(&self) -> Option<CacheMetadata> {
        self.store.metadata()
    }

    /// Request a refresh without waiting for it
    ///
    /// Returns `None` when the service was built without a coordinator.
    pub fn trigger_refresh(&self) -> Option<RefreshAck> {
        self.coordinator.as_ref().map(|coordinator| coordinator.trigger_manual())
    }
}
