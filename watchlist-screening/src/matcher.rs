//! Fuzzy name matching
//!
//! Rules run cheapest and strictest first; the first rule that fires decides:
//!
//! 1. **Exact** - normalized names are equal
//! 2. **Containment** - one normalized name contains the other (OCR truncation, word order)
//! 3. **Token majority** - enough candidate tokens appear inside the query (names
//!    captured without spaces, e.g. `MUHAMMADHASSAN`)
//! 4. **Long token substring** - a query token of at least four characters appears
//!    inside the candidate (partial captures)

use crate::normalize::{name_tokens, normalize};
use crate::types::WatchlistRecord;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which rule produced a match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MatchRule {
    /// Normalized names are equal
    Exact,
    /// One normalized name contains the other
    Containment,
    /// Enough candidate tokens occur in the query
    TokenMajority,
    /// A long query token occurs in the candidate
    LongTokenSubstring,
}

impl fmt::Display for MatchRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchRule::Exact => write!(f, "exact"),
            MatchRule::Containment => write!(f, "containment"),
            MatchRule::TokenMajority => write!(f, "token_majority"),
            MatchRule::LongTokenSubstring => write!(f, "long_token_substring"),
        }
    }
}

/// A name prepared for matching: the joined normalized form plus its normalized tokens
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameKey {
    /// Whole name, normalized
    pub normalized: String,
    /// Whitespace tokens, each normalized
    pub tokens: Vec<String>,
}

impl NameKey {
    /// Prepare a raw name
    pub fn from_raw(raw: &str) -> Self {
        Self {
            normalized: normalize(raw),
            tokens: name_tokens(raw),
        }
    }

    /// Borrowed view of a record's precomputed key
    pub fn of_record(record: &WatchlistRecord) -> NameKeyRef<'_> {
        NameKeyRef {
            normalized: &record.normalized_name,
            tokens: &record.name_tokens,
        }
    }

    /// Borrowed view
    pub fn view(&self) -> NameKeyRef<'_> {
        NameKeyRef {
            normalized: &self.normalized,
            tokens: &self.tokens,
        }
    }

    /// True when nothing survived normalization
    pub fn is_empty(&self) -> bool {
        self.normalized.is_empty()
    }
}

/// Borrowed [`NameKey`], so records are matched without cloning
#[derive(Debug, Clone, Copy)]
#[allow(missing_docs)]
pub struct NameKeyRef<'a> {
    pub normalized: &'a str,
    pub tokens: &'a [String],
}

/// Matcher thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatcherConfig {
    /// Minimum fraction of candidate tokens found in the query (rule 3)
    pub token_majority_ratio: f64,

    /// Minimum query token length for the substring rule (rule 4)
    pub min_token_len: usize,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            token_majority_ratio: 0.5,
            min_token_len: 4,
        }
    }
}

/// Multi-rule name matcher
#[derive(Debug, Clone, Default)]
pub struct NameMatcher {
    config: MatcherConfig,
}

impl NameMatcher {
    /// Create matcher with the given thresholds
    pub fn new(config: MatcherConfig) -> Self {
        Self { config }
    }

    /// Return the first rule under which `query` matches `candidate`
    ///
    /// Empty normalized names never match: the empty string is a substring of everything.
    pub fn matches(&self, query: NameKeyRef<'_>, candidate: NameKeyRef<'_>) -> Option<MatchRule> {
        if query.normalized.is_empty() || candidate.normalized.is_empty() {
            return None;
        }

        if query.normalized == candidate.normalized {
            return Some(MatchRule::Exact);
        }

        if candidate.normalized.contains(query.normalized)
            || query.normalized.contains(candidate.normalized)
        {
            return Some(MatchRule::Containment);
        }

        if self.token_majority(query.normalized, candidate.tokens) {
            return Some(MatchRule::TokenMajority);
        }

        if self.long_token_substring(query.tokens, candidate.normalized) {
            return Some(MatchRule::LongTokenSubstring);
        }

        None
    }

    fn token_majority(&self, query: &str, candidate_tokens: &[String]) -> bool {
        if candidate_tokens.is_empty() {
            return false;
        }

        let found = candidate_tokens
            .iter()
            .filter(|token| query.contains(token.as_str()))
            .count();

        found as f64 / candidate_tokens.len() as f64 >= self.config.token_majority_ratio
    }

    fn long_token_substring(&self, query_tokens: &[String], candidate: &str) -> bool {
        query_tokens
            .iter()
            .any(|token| token.len() >= self.config.min_token_len && candidate.contains(token.as_str()))
    }
}
