//! Configuration for watchlist screening

use crate::matcher::MatcherConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Screening service configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Watchlist source configuration
    pub source: SourceConfig,

    /// Cache configuration
    pub cache: CacheConfig,

    /// Refresh schedule configuration
    pub refresh: RefreshConfig,

    /// Matcher thresholds
    pub matcher: MatcherConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Watchlist source configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// URL of the consolidated list
    pub url: String,

    /// Connect timeout (seconds)
    pub connect_timeout_secs: u64,

    /// Read timeout (seconds)
    pub read_timeout_secs: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            url: "https://scsanctions.un.org/resources/htm/en/consolidated.htm".to_string(),
            connect_timeout_secs: 30,
            read_timeout_secs: 30,
        }
    }
}

impl SourceConfig {
    /// Connect timeout
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Read timeout
    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }
}

/// Cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Snapshot validity window in hours (default: 24)
    pub validity_window_hours: i64,

    /// Where the snapshot is persisted; in-memory only when unset
    pub snapshot_path: Option<PathBuf>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            validity_window_hours: 24,
            snapshot_path: Some(PathBuf::from("./data/watchlist/snapshot.json")),
        }
    }
}

impl CacheConfig {
    /// Validity window as a chrono duration
    pub fn validity_window(&self) -> chrono::Duration {
        chrono::Duration::hours(self.validity_window_hours)
    }
}

/// Refresh schedule configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RefreshConfig {
    /// Cron schedule (6 fields, seconds first)
    /// Default: "0 0 2 * * *" = daily at 02:00 UTC
    pub schedule: String,

    /// Fixed interval in seconds; overrides `schedule` when set
    pub interval_secs: Option<u64>,

    /// Run the periodic refresh at all
    pub enabled: bool,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            schedule: "0 0 2 * * *".to_string(),
            interval_secs: None,
            enabled: true,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Emit JSON log lines
    pub json: bool,
}

impl Config {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> crate::Result<Self> {
        let mut config = Config::default();
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Override fields from `WATCHLIST_*` environment variables
    pub fn apply_env(&mut self) -> crate::Result<()> {
        if let Ok(url) = std::env::var("WATCHLIST_SOURCE_URL") {
            self.source.url = url;
        }

        if let Ok(hours) = std::env::var("WATCHLIST_VALIDITY_HOURS") {
            self.cache.validity_window_hours = parse_env("WATCHLIST_VALIDITY_HOURS", &hours)?;
        }

        if let Ok(path) = std::env::var("WATCHLIST_SNAPSHOT_PATH") {
            self.cache.snapshot_path = if path.is_empty() {
                None
            } else {
                Some(PathBuf::from(path))
            };
        }

        if let Ok(schedule) = std::env::var("WATCHLIST_REFRESH_SCHEDULE") {
            self.refresh.schedule = schedule;
        }

        if let Ok(secs) = std::env::var("WATCHLIST_REFRESH_INTERVAL_SECS") {
            self.refresh.interval_secs = Some(parse_env("WATCHLIST_REFRESH_INTERVAL_SECS", &secs)?);
        }

        if let Ok(json) = std::env::var("WATCHLIST_LOG_JSON") {
            self.logging.json = parse_env("WATCHLIST_LOG_JSON", &json)?;
        }

        Ok(())
    }

    /// Reject values the service cannot run with
    pub fn validate(&self) -> crate::Result<()> {
        if self.source.url.trim().is_empty() {
            return Err(crate::Error::Config("source.url must not be empty".to_string()));
        }

        if self.source.connect_timeout_secs == 0 || self.source.read_timeout_secs == 0 {
            return Err(crate::Error::Config("source timeouts must be positive".to_string()));
        }

        if self.cache.validity_window_hours <= 0 {
            return Err(crate::Error::Config(
                "cache.validity_window_hours must be positive".to_string(),
            ));
        }

        if self.refresh.interval_secs == Some(0) {
            return Err(crate::Error::Config("refresh.interval_secs must be positive".to_string()));
        }

        let ratio = self.matcher.token_majority_ratio;
        if !(ratio > 0.0 && ratio <= 1.0) {
            return Err(crate::Error::Config(format!(
                "matcher.token_majority_ratio must be in (0, 1], got {}",
                ratio
            )));
        }

        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, value: &str) -> crate::Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e| crate::Error::Config(format!("Invalid {}='{}': {}", name, value, e)))
}
