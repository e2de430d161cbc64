//! Watchlist record parsing
//!
//! A [`RecordParser`] turns the plain text of a watchlist document into an
//! ordered, deduplicated set of [`WatchlistRecord`]s. The refresh coordinator
//! only depends on the trait, so other list formats can be added beside
//! [`UnConsolidatedParser`].

use crate::error::Error;
use crate::types::WatchlistRecord;
use chrono::{DateTime, Utc};
use regex::Regex;
use std::collections::HashSet;
use tracing::{debug, info};

/// Entries whose joined name is shorter than this are discarded
const MIN_NAME_CHARS: usize = 2;

/// Placeholder token the source uses for "not applicable"
const NOT_APPLICABLE: &str = "na";

/// Result of one parse pass
#[derive(Debug, Clone, Default)]
pub struct ParseOutcome {
    /// Surviving records, in source order
    pub records: Vec<WatchlistRecord>,

    /// Entries skipped because their structure was not recognised
    pub skipped_entries: usize,
}

/// Capability to extract watchlist records from document text
pub trait RecordParser: Send + Sync {
    /// Short label for logs and metrics
    fn format(&self) -> &'static str;

    /// Parse a whole document. Malformed entries are skipped and counted, never fatal.
    fn parse(&self, text: &str, parsed_at: DateTime<Utc>) -> ParseOutcome;
}

/// Parser for the UN Consolidated List text convention
///
/// ```text
/// Name: 1: <part> 2: <part> [3: <part>] [4: <part>] ... Name: 1: ...
/// ```
#[derive(Debug, Clone)]
pub struct UnConsolidatedParser {
    entry_marker: Regex,
    name_parts: Regex,
}

impl UnConsolidatedParser {
    /// Create parser
    pub fn new() -> Self {
        Self {
            entry_marker: Regex::new(r"(?i)\bName:").expect("entry marker pattern is valid"),
            name_parts: Regex::new(
                r"(?s)^\s*1:\s*(.*?)\s*2:\s*(.*?)(?:\s*3:\s*(.*?))?(?:\s*4:\s*(.*?))?\s*$",
            )
            .expect("name parts pattern is valid"),
        }
    }

    /// Split the document into entry bodies, each running to the next marker or end of input
    fn entry_bodies<'t>(&self, text: &'t str) -> Vec<&'t str> {
        let markers: Vec<_> = self.entry_marker.find_iter(text).collect();

        markers
            .iter()
            .enumerate()
            .map(|(i, marker)| {
                let end = markers.get(i + 1).map_or(text.len(), |next| next.start());
                &text[marker.end()..end]
            })
            .collect()
    }

    /// Joined name of one entry body
    fn entry_name(&self, body: &str) -> Result<String, Error> {
        let caps = self.name_parts.captures(body).ok_or_else(|| {
            let preview: String = body.chars().take(40).collect();
            Error::ParseEntry(format!("no numbered name parts in {:?}", preview.trim()))
        })?;

        let parts: Vec<String> = (1..=4)
            .map(|group| caps.get(group).map_or("", |m| m.as_str()))
            .map(clean_part)
            .filter(|part| !part.is_empty())
            .collect();

        Ok(parts.join(" "))
    }
}

impl Default for UnConsolidatedParser {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordParser for UnConsolidatedParser {
    fn format(&self) -> &'static str {
        "un-consolidated"
    }

    fn parse(&self, text: &str, parsed_at: DateTime<Utc>) -> ParseOutcome {
        let mut seen = HashSet::new();
        let mut outcome = ParseOutcome::default();
        let mut too_short = 0usize;
        let mut duplicates = 0usize;

        for body in self.entry_bodies(text) {
            let name = match self.entry_name(body) {
                Ok(name) => name,
                Err(e) => {
                    debug!("Skipping entry: {}", e);
                    outcome.skipped_entries += 1;
                    continue;
                }
            };

            if name.chars().count() < MIN_NAME_CHARS {
                too_short += 1;
                continue;
            }

            if !seen.insert(name.clone()) {
                duplicates += 1;
                continue;
            }

            outcome.records.push(WatchlistRecord::new(name, parsed_at));
        }

        info!(
            format = self.format(),
            records = outcome.records.len(),
            skipped = outcome.skipped_entries,
            too_short,
            duplicates,
            "Parsed watchlist document"
        );

        outcome
    }
}

/// Collapse whitespace, trim, and blank out the "na" placeholder
fn clean_part(part: &str) -> String {
    let collapsed = part.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.eq_ignore_ascii_case(NOT_APPLICABLE) {
        String::new()
    } else {
        collapsed
    }
}
