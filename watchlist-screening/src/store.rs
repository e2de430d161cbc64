//! Cache store
//!
//! The current [`CacheSnapshot`] sits behind an `Arc` that is swapped, never
//! mutated. Readers clone the `Arc` under a short read lock and scan without
//! holding it, so a refresh never blocks or tears an in-flight query.
//!
//! # Backends
//!
//! - [`MemoryBackend`] - nothing survives a restart
//! - [`JsonFileBackend`] - snapshot persisted as JSON, written to a temp file and
//!   renamed into place

use crate::error::{Error, Result};
use crate::types::{CacheMetadata, CacheSnapshot, WatchlistRecord};
use chrono::{DateTime, Duration, Utc};
use parking_lot::{Mutex, RwLock};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// Durable home of the snapshot
pub trait SnapshotBackend: Send + Sync {
    /// Load the last persisted snapshot, if any
    fn load(&self) -> Result<Option<CacheSnapshot>>;

    /// Persist a snapshot. Must leave the previous one intact on failure.
    fn persist(&self, snapshot: &CacheSnapshot) -> Result<()>;
}

/// Backend that keeps nothing
#[derive(Debug, Default, Clone, Copy)]
pub struct MemoryBackend;

impl SnapshotBackend for MemoryBackend {
    fn load(&self) -> Result<Option<CacheSnapshot>> {
        Ok(None)
    }

    fn persist(&self, _snapshot: &CacheSnapshot) -> Result<()> {
        Ok(())
    }
}

/// Snapshot stored as a JSON file
#[derive(Debug, Clone)]
pub struct JsonFileBackend {
    path: PathBuf,
}

impl JsonFileBackend {
    /// Create backend writing to `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Snapshot file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "snapshot".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl SnapshotBackend for JsonFileBackend {
    fn load(&self) -> Result<Option<CacheSnapshot>> {
        let content = match std::fs::read(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let snapshot: CacheSnapshot = serde_json::from_slice(&content)?;
        Ok(Some(snapshot))
    }

    fn persist(&self, snapshot: &CacheSnapshot) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            if !dir.as_os_str().is_empty() {
                std::fs::create_dir_all(dir)?;
            }
        }

        let temp = self.temp_path();
        let body = serde_json::to_vec(snapshot)?;
        std::fs::write(&temp, body)?;
        std::fs::rename(&temp, &self.path)?;
        Ok(())
    }
}

/// Holder of the current watchlist snapshot
pub struct CacheStore {
    current: RwLock<Arc<CacheSnapshot>>,
    backend: Box<dyn SnapshotBackend>,
    validity_window: Duration,
    writer: Mutex<()>,
}

impl std::fmt::Debug for CacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheStore")
            .field("record_count", &self.record_count())
            .field("validity_window", &self.validity_window)
            .finish()
    }
}

impl CacheStore {
    /// In-memory store, starting empty
    pub fn in_memory(validity_window: Duration) -> Self {
        Self {
            current: RwLock::new(Arc::new(CacheSnapshot::empty())),
            backend: Box::new(MemoryBackend),
            validity_window,
            writer: Mutex::new(()),
        }
    }

    /// Open a store over `backend`, loading any persisted snapshot
    ///
    /// An unreadable or inconsistent persisted snapshot is discarded with a
    /// warning; the store then starts empty and the next refresh repopulates it.
    pub fn open(backend: Box<dyn SnapshotBackend>, validity_window: Duration) -> Self {
        let snapshot = match backend.load() {
            Ok(Some(snapshot)) if snapshot.is_consistent() => {
                info!(
                    records = snapshot.len(),
                    version = snapshot.metadata().map(|m| m.source_version_tag.as_str()),
                    "Loaded persisted watchlist snapshot"
                );
                snapshot
            }
            Ok(Some(_)) => {
                warn!("Persisted watchlist snapshot is inconsistent, starting empty");
                CacheSnapshot::empty()
            }
            Ok(None) => CacheSnapshot::empty(),
            Err(e) => {
                warn!("Failed to load persisted watchlist snapshot: {}", e);
                CacheSnapshot::empty()
            }
        };

        Self {
            current: RwLock::new(Arc::new(snapshot)),
            backend,
            validity_window,
            writer: Mutex::new(()),
        }
    }

    /// Current snapshot. Cheap: one `Arc` clone.
    pub fn snapshot(&self) -> Arc<CacheSnapshot> {
        self.current.read().clone()
    }

    /// Number of cached records
    pub fn record_count(&self) -> usize {
        self.current.read().len()
    }

    /// Metadata of the current snapshot
    pub fn metadata(&self) -> Option<CacheMetadata> {
        self.current.read().metadata().cloned()
    }

    /// Configured validity window
    pub fn validity_window(&self) -> Duration {
        self.validity_window
    }

    /// True when the cache is populated and younger than the validity window
    pub fn is_valid(&self) -> bool {
        self.is_valid_at(Utc::now())
    }

    /// [`Self::is_valid`] evaluated at `now`
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        match self.metadata() {
            Some(meta) => {
                meta.record_count > 0 && now < meta.last_updated_at + self.validity_window
            }
            None => false,
        }
    }

    /// Replace the whole snapshot
    ///
    /// The new snapshot is persisted first; readers only see it once the backend
    /// has accepted it. On failure the previous snapshot stays current.
    ///
    /// Blocks on backend I/O. Refreshes go through
    /// [`crate::refresh::RefreshCoordinator`], which calls this off the async
    /// workers. Concurrent calls are serialized so the persisted and in-memory
    /// snapshots always agree.
    pub fn replace(
        &self,
        records: Vec<WatchlistRecord>,
        source_version_tag: impl Into<String>,
        updated_at: DateTime<Utc>,
    ) -> Result<CacheMetadata> {
        let _writer = self.writer.lock();
        let snapshot = CacheSnapshot::new(records, source_version_tag, updated_at);

        self.backend
            .persist(&snapshot)
            .map_err(|e| Error::CacheSwap(e.to_string()))?;

        let metadata = snapshot
            .metadata()
            .cloned()
            .ok_or_else(|| Error::CacheSwap("snapshot built without metadata".to_string()))?;

        *self.current.write() = Arc::new(snapshot);

        info!(
            records = metadata.record_count,
            version = %metadata.source_version_tag,
            "Watchlist snapshot swapped"
        );

        Ok(metadata)
    }
}
