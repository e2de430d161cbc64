//! Name canonicalization
//!
//! Every comparison in the matcher runs on the output of [`normalize`]: accents
//! folded to ASCII, uppercased, and everything outside `[A-Z0-9]` removed.

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Metadata markers that end the primary name of a watchlist entry, in priority order
const METADATA_MARKERS: &[&str] = &[
    " na Name",
    " Title:",
    " Designation:",
    " DOB:",
    " POB:",
    " a.k.a.:",
    " Nationality:",
    " Passport",
];

/// Canonical comparison form of a name
///
/// Idempotent: `normalize(&normalize(x)) == normalize(x)`.
pub fn normalize(raw: &str) -> String {
    raw.nfkd()
        .filter(|c| !is_combining_mark(*c))
        .map(|c| c.to_ascii_uppercase())
        .filter(|c| c.is_ascii_alphanumeric())
        .collect()
}

/// Cut trailing metadata (titles, DOB, aliases, ...) off a watchlist entry
///
/// Each marker found past the start of the working string truncates it; the
/// string only ever shrinks.
pub fn extract_core_name(raw: &str) -> String {
    let mut core = raw;

    for marker in METADATA_MARKERS {
        if let Some(index) = core.find(marker) {
            if index > 0 {
                core = &core[..index];
            }
        }
    }

    core.trim().to_string()
}

/// Whitespace tokens of a name, each normalized; tokens that normalize to nothing are dropped
pub fn name_tokens(name: &str) -> Vec<String> {
    name.split_whitespace()
        .map(normalize)
        .filter(|token| !token.is_empty())
        .collect()
}
