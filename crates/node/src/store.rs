//! Snapshot persistence.

use lottery_core::LotteryError;
use lottery_types::LotterySnapshot;
use parking_lot::Mutex;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

/// Errors reading or writing snapshots.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Filesystem failure.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// File involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    /// The stored snapshot could not be encoded or decoded.
    #[error("Snapshot encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
}

impl From<StoreError> for LotteryError {
    fn from(err: StoreError) -> Self {
        LotteryError::Storage(err.to_string())
    }
}

/// Durable home of the lottery aggregate.
///
/// `save` must be atomic: a crash during a write leaves either the previous
/// snapshot or the new one, never a mix.
pub trait RoundStore: Send + Sync {
    /// Load the latest snapshot, if one was ever saved.
    fn load(&self) -> Result<Option<LotterySnapshot>, StoreError>;

    /// Replace the stored snapshot.
    fn save(&self, snapshot: &LotterySnapshot) -> Result<(), StoreError>;
}

/// Keeps the snapshot in memory. Survives runner restarts within a process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    snapshot: Mutex<Option<LotterySnapshot>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Version of the stored snapshot.
    pub fn version(&self) -> Option<u64> {
        self.snapshot.lock().as_ref().map(|s| s.version)
    }
}

impl RoundStore for MemoryStore {
    fn load(&self) -> Result<Option<LotterySnapshot>, StoreError> {
        Ok(self.snapshot.lock().clone())
    }

    fn save(&self, snapshot: &LotterySnapshot) -> Result<(), StoreError> {
        *self.snapshot.lock() = Some(snapshot.clone());
        Ok(())
    }
}

/// Stores the snapshot as a JSON file.
///
/// Writes go to a sibling temp file which is synced and then renamed over
/// the target.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    tmp_path: PathBuf,
}

impl FileStore {
    /// Store at `path`. Parent directories are created on first save.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut tmp = path.clone().into_os_string();
        tmp.push(".tmp");
        Self {
            path,
            tmp_path: PathBuf::from(tmp),
        }
    }

    /// Target file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn io_err(path: &Path) -> impl FnOnce(io::Error) -> StoreError {
    let path = path.to_path_buf();
    move |source| StoreError::Io { path, source }
}

impl RoundStore for FileStore {
    fn load(&self) -> Result<Option<LotterySnapshot>, StoreError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                info!(path = %self.path.display(), "No snapshot found, starting fresh");
                return Ok(None);
            }
            Err(e) => return Err(io_err(&self.path)(e)),
        };
        let snapshot: LotterySnapshot = serde_json::from_slice(&bytes)?;
        info!(
            path = %self.path.display(),
            version = snapshot.version,
            round = snapshot.round.id.0,
            "Loaded snapshot"
        );
        Ok(Some(snapshot))
    }

    fn save(&self, snapshot: &LotterySnapshot) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err(parent))?;
        }

        let bytes = serde_json::to_vec_pretty(snapshot)?;
        {
            let mut file = fs::File::create(&self.tmp_path).map_err(io_err(&self.tmp_path))?;
            file.write_all(&bytes).map_err(io_err(&self.tmp_path))?;
            file.sync_all().map_err(io_err(&self.tmp_path))?;
        }
        fs::rename(&self.tmp_path, &self.path).map_err(io_err(&self.path))?;

        debug!(version = snapshot.version, "Snapshot saved");
        Ok(())
    }
}
