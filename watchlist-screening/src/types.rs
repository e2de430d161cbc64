//! Core types: watchlist records, cache snapshots and screening results

use crate::normalize::{extract_core_name, name_tokens, normalize};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single sanctioned individual as published on the watchlist
///
/// Records are immutable once built. A refresh replaces the whole set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WatchlistRecord {
    /// Opaque record identifier
    pub id: Uuid,

    /// Full source entry, possibly with trailing metadata
    pub raw_text: String,

    /// Primary name with trailing metadata cut off
    pub core_name: String,

    /// Normalized form of `core_name`
    pub normalized_name: String,

    /// Whitespace tokens of `core_name`, each normalized
    pub name_tokens: Vec<String>,

    /// When the record was built
    pub created_at: DateTime<Utc>,
}

impl WatchlistRecord {
    /// Build a record from a raw entry, deriving the core and normalized names
    pub fn new(raw_text: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        let raw_text = raw_text.into();
        let core_name = extract_core_name(&raw_text);
        let normalized_name = normalize(&core_name);
        let name_tokens = name_tokens(&core_name);

        Self {
            id: Uuid::new_v4(),
            raw_text,
            core_name,
            normalized_name,
            name_tokens,
            created_at,
        }
    }
}

/// Provenance of the current snapshot
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CacheMetadata {
    /// When the snapshot was committed
    pub last_updated_at: DateTime<Utc>,

    /// Number of records in the snapshot
    pub record_count: usize,

    /// Source identity, fetch time and content digest
    pub source_version_tag: String,
}

/// Immutable, internally consistent view of the watchlist
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CacheSnapshot {
    records: Vec<WatchlistRecord>,
    metadata: Option<CacheMetadata>,
}

impl CacheSnapshot {
    /// Build a snapshot; metadata is derived from the records so the count always agrees
    pub fn new(
        records: Vec<WatchlistRecord>,
        source_version_tag: impl Into<String>,
        last_updated_at: DateTime<Utc>,
    ) -> Self {
        let metadata = CacheMetadata {
            last_updated_at,
            record_count: records.len(),
            source_version_tag: source_version_tag.into(),
        };

        Self {
            records,
            metadata: Some(metadata),
        }
    }

    /// Snapshot with no records and no metadata
    pub fn empty() -> Self {
        Self::default()
    }

    /// Records in scan order
    pub fn records(&self) -> &[WatchlistRecord] {
        &self.records
    }

    /// Metadata, absent for the empty snapshot
    pub fn metadata(&self) -> Option<&CacheMetadata> {
        self.metadata.as_ref()
    }

    /// Number of records
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True when there are no records
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Check `record_count == records.len()`
    ///
    /// Snapshots loaded from disk are checked before being served.
    pub fn is_consistent(&self) -> bool {
        match &self.metadata {
            Some(meta) => meta.record_count == self.records.len(),
            None => self.records.is_empty(),
        }
    }
}

/// Inbound screening request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScreeningQuery {
    /// Candidate name extracted from a document; may be missing
    pub name: Option<String>,
}

impl ScreeningQuery {
    /// Query for a name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
        }
    }
}

/// One matched watchlist entry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SanctionMatch {
    /// Core name of the matched record
    pub name: String,
}

/// Screening answer
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScreeningResult {
    /// True when at least one record matched
    pub is_sanctioned: bool,

    /// Matches in snapshot scan order
    pub matches: Vec<SanctionMatch>,
}

impl ScreeningResult {
    /// The zero-result answer
    pub fn clear() -> Self {
        Self::default()
    }

    /// Build from collected matches
    pub fn from_matches(matches: Vec<SanctionMatch>) -> Self {
        Self {
            is_sanctioned: !matches.is_empty(),
            matches,
        }
    }
}
