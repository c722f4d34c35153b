//! Pluggable persistence for the sync checkpoint.

use std::future::Future;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::model::SyncState;
use crate::Result;

/// Where the sync checkpoint lives.
///
/// `load` must treat missing or unreadable data as a cold start
/// (`Ok(None)`) rather than an error.
pub trait SyncStorage: Send + Sync + 'static {
    /// Loads the stored checkpoint.
    fn load(&self) -> impl Future<Output = Result<Option<SyncState>>> + Send;

    /// Replaces the stored checkpoint.
    fn save(&self, state: &SyncState) -> impl Future<Output = Result<()>> + Send;

    /// Deletes the stored checkpoint.
    fn clear(&self) -> impl Future<Output = Result<()>> + Send;
}

/// Checkpoint stored as pretty-printed JSON on disk.
#[derive(Debug, Clone)]
pub struct JsonFileStorage {
    path: PathBuf,
}

impl JsonFileStorage {
    /// Creates storage at `path`. Nothing is touched until first use.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// File location.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SyncStorage for JsonFileStorage {
    async fn load(&self) -> Result<Option<SyncState>> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                warn!("Sync state at {:?} unreadable ({}), starting cold", self.path, e);
                return Ok(None);
            }
        };

        match serde_json::from_str(&contents) {
            Ok(state) => Ok(Some(state)),
            Err(e) => {
                warn!("Sync state at {:?} corrupt ({}), starting cold", self.path, e);
                Ok(None)
            }
        }
    }

    async fn save(&self, state: &SyncState) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let contents = serde_json::to_string_pretty(state)?;

        // Write-then-rename so a crash never leaves a half-written file.
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, contents).await?;
        tokio::fs::rename(&tmp, &self.path).await?;

        debug!("Sync state saved to {:?}", self.path);
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Process-local checkpoint storage.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    state: Mutex<Option<SyncState>>,
}

impl MemoryStorage {
    /// Creates empty storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates storage pre-seeded with `state`.
    #[must_use]
    pub fn with_state(state: SyncState) -> Self {
        Self {
            state: Mutex::new(Some(state)),
        }
    }
}

impl SyncStorage for MemoryStorage {
    async fn load(&self) -> Result<Option<SyncState>> {
        Ok(self.state.lock().await.clone())
    }

    async fn save(&self, state: &SyncState) -> Result<()> {
        *self.state.lock().await = Some(state.clone());
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        *self.state.lock().await = None;
        Ok(())
    }
}
