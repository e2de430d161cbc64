//! Error types for watchlist screening

use thiserror::Error;

/// Result type for screening operations
pub type Result<T> = std::result::Result<T, Error>;

/// Screening errors
///
/// None of these reach screening callers: the refresh coordinator contains every
/// refresh-path failure and reports it as a [`crate::RefreshOutcome`].
#[derive(Error, Debug)]
pub enum Error {
    /// Network failure or non-success status while downloading the watchlist
    #[error("Watchlist fetch failed: {0}")]
    Fetch(String),

    /// A single malformed watchlist entry
    #[error("Malformed watchlist entry: {0}")]
    ParseEntry(String),

    /// Committing a new snapshot failed; the previous snapshot is still current
    #[error("Cache swap failed: {0}")]
    CacheSwap(String),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Refresh scheduler error
    #[error("Scheduler error: {0}")]
    Scheduler(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Fetch(err.to_string())
    }
}

impl From<String> for Error {
    fn from(msg: String) -> Self {
        Error::Other(msg)
    }
}

impl From<&str> for Error {
    fn from(msg: &str) -> Self {
        Error::Other(msg.to_string())
    }
}
