//! Snapshot persistence.
//!
//! Continuous snapshots land under `timeSeries/<host>/<unix_ts>.json`, one
//! file per cycle; named snapshots under `collections/<label>-<host>.json`.
//! Directories are created lazily and idempotently. Persistence is best
//! effort: a failed write is reported to the caller but never stops the
//! owning worker's schedule.

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::snapshot::{Snapshot, SnapshotId};

/// Default directory for continuous snapshots.
pub const DEFAULT_TIME_SERIES_DIR: &str = "timeSeries";

/// Default directory for named snapshots.
pub const DEFAULT_COLLECTIONS_DIR: &str = "collections";

/// Errors writing or reading a snapshot.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The snapshot could not be encoded.
    #[error("failed to encode snapshot: {0}")]
    Serialize(#[from] serde_json::Error),

    /// The encoded snapshot could not be written (or read back).
    #[error("snapshot I/O failed: {0}")]
    Persist(#[from] std::io::Error),
}

/// Writes snapshots to their on-disk location.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    time_series_dir: PathBuf,
    collections_dir: PathBuf,
}

impl SnapshotStore {
    /// Store rooted at the conventional `timeSeries/` and `collections/`
    /// directories under `base`.
    pub fn new(base: impl AsRef<Path>) -> Self {
        let base = base.as_ref();
        Self {
            time_series_dir: base.join(DEFAULT_TIME_SERIES_DIR),
            collections_dir: base.join(DEFAULT_COLLECTIONS_DIR),
        }
    }

    /// Serialize and write one snapshot, returning the path written.
    ///
    /// The target directory is created on first use. The snapshot's
    /// identifier selects the layout: timestamps go to the per-host time
    /// series, labels to the shared collections directory.
    pub async fn write(&self, host: &str, snapshot: &Snapshot) -> Result<PathBuf, StoreError> {
        let path = match &snapshot.id {
            SnapshotId::Timestamp(ts) => {
                let dir = self.time_series_dir.join(host);
                tokio::fs::create_dir_all(&dir).await?;
                dir.join(format!("{}.json", ts))
            }
            SnapshotId::Named(label) => {
                tokio::fs::create_dir_all(&self.collections_dir).await?;
                self.collections_dir.join(format!("{}-{}.json", label, host))
            }
        };

        let encoded = serde_json::to_vec_pretty(snapshot)?;
        // Stage in the same directory and rename so an interrupted write
        // never leaves a truncated snapshot at the final path.
        let staging = path.with_extension("json.tmp");
        tokio::fs::write(&staging, encoded).await?;
        tokio::fs::rename(&staging, &path).await?;

        tracing::debug!(path = %path.display(), "Snapshot written");
        Ok(path)
    }

    /// Decode a previously written snapshot file.
    pub async fn read(&self, path: impl AsRef<Path>) -> Result<Snapshot, StoreError> {
        let bytes = tokio::fs::read(path.as_ref()).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}
