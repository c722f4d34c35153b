//! Sync checkpoint owner.

use std::cmp::Ordering;

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::model::{ScanStrategy, SyncState, compare_cursors};
use super::storage::SyncStorage;
use crate::Result;

/// Outcome of a completed scan, ready to be committed.
#[derive(Debug, Clone, Default)]
pub struct ScanCommit {
    /// Newest cursor observed during the scan.
    pub cursor: Option<String>,
    /// Ids run through detection.
    pub processed_ids: Vec<String>,
    /// Subscriptions reported.
    pub subscription_count: usize,
    /// Messages examined.
    pub emails_scanned: usize,
}

/// Owns the sync checkpoint and its storage.
///
/// State is only mutated on commit, so a failed scan leaves the previous
/// checkpoint untouched.
#[derive(Debug)]
pub struct SyncStateStore<S: SyncStorage> {
    storage: S,
    state: Mutex<SyncState>,
}

impl<S: SyncStorage> SyncStateStore<S> {
    /// Loads the checkpoint from `storage`, falling back to a cold start.
    pub async fn load(storage: S) -> Self {
        let state = match storage.load().await {
            Ok(Some(state)) => {
                debug!(
                    "Loaded sync state: cursor={:?}, {} processed ids",
                    state.cursor,
                    state.processed_ids.len()
                );
                state
            }
            Ok(None) => SyncState::default(),
            Err(e) => {
                warn!("Failed to load sync state ({}), starting cold", e);
                SyncState::default()
            }
        };

        Self {
            storage,
            state: Mutex::new(state),
        }
    }

    /// Copy of the current checkpoint.
    pub async fn snapshot(&self) -> SyncState {
        self.state.lock().await.clone()
    }

    /// Picks the strategy for the next scan.
    pub async fn strategy(&self, force_full: bool) -> ScanStrategy {
        if force_full {
            return ScanStrategy::Full;
        }
        let state = self.state.lock().await;
        match &state.cursor {
            Some(cursor) if state.has_cursor() => ScanStrategy::Incremental {
                cursor: cursor.clone(),
            },
            _ => ScanStrategy::Full,
        }
    }

    /// Filters out ids that were already processed.
    pub async fn unprocessed(&self, ids: Vec<String>) -> Vec<String> {
        let state = self.state.lock().await;
        ids.into_iter()
            .filter(|id| !state.processed_ids.contains(id))
            .collect()
    }

    /// Records a completed full scan. The processed set is replaced.
    ///
    /// # Errors
    ///
    /// Returns an error if the checkpoint cannot be persisted; the
    /// in-memory state is left unchanged in that case.
    pub async fn commit_full_scan(&self, commit: ScanCommit) -> Result<()> {
        let mut state = self.state.lock().await;
        let mut next = state.clone();

        next.cursor = advance_cursor(state.cursor.as_deref(), commit.cursor);
        next.full_scan_at = Some(Utc::now());
        next.processed_ids = commit.processed_ids.into_iter().collect();
        next.last_subscription_count = commit.subscription_count;
        next.last_emails_scanned = commit.emails_scanned;

        self.storage.save(&next).await?;
        info!(
            "Committed full scan: cursor={:?}, {} processed ids",
            next.cursor,
            next.processed_ids.len()
        );
        *state = next;
        Ok(())
    }

    /// Records a completed incremental scan. Processed ids are merged.
    ///
    /// # Errors
    ///
    /// Returns an error if the checkpoint cannot be persisted; the
    /// in-memory state is left unchanged in that case.
    pub async fn commit_incremental(&self, commit: ScanCommit) -> Result<()> {
        let mut state = self.state.lock().await;
        let mut next = state.clone();

        next.cursor = advance_cursor(state.cursor.as_deref(), commit.cursor);
        next.incremental_sync_at = Some(Utc::now());
        next.processed_ids.extend(commit.processed_ids);
        next.last_subscription_count = commit.subscription_count;
        next.last_emails_scanned = commit.emails_scanned;

        self.storage.save(&next).await?;
        debug!("Committed incremental scan: cursor={:?}", next.cursor);
        *state = next;
        Ok(())
    }

    /// Forgets everything, forcing the next scan to be full.
    ///
    /// # Errors
    ///
    /// Returns an error if the stored checkpoint cannot be removed.
    pub async fn reset(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        self.storage.clear().await?;
        *state = SyncState::default();
        info!("Sync state reset");
        Ok(())
    }
}

/// Chooses the cursor to store. A candidate older than the current cursor
/// is ignored so the cursor never moves backwards.
fn advance_cursor(current: Option<&str>, candidate: Option<String>) -> Option<String> {
    let Some(candidate) = candidate.filter(|c| !c.is_empty()) else {
        return current.map(str::to_owned);
    };
    match current {
        Some(current) if compare_cursors(&candidate, current) == Some(Ordering::Less) => {
            warn!(
                "Ignoring cursor {} older than stored cursor {}",
                candidate, current
            );
            Some(current.to_owned())
        }
        _ => Some(candidate),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::super::storage::MemoryStorage;
    use super::*;

    fn commit(cursor: &str, ids: &[&str]) -> ScanCommit {
        ScanCommit {
            cursor: Some(cursor.to_owned()),
            processed_ids: ids.iter().map(|s| (*s).to_owned()).collect(),
            subscription_count: 1,
            emails_scanned: ids.len(),
        }
    }

    #[tokio::test]
    async fn test_cold_start_is_full() {
        let store = SyncStateStore::load(MemoryStorage::new()).await;
        assert_eq!(store.strategy(false).await, ScanStrategy::Full);
    }

    #[tokio::test]
    async fn test_cursor_enables_incremental() {
        let store = SyncStateStore::load(MemoryStorage::new()).await;
        store.commit_full_scan(commit("100", &["a", "b"])).await.unwrap();

        assert_eq!(
            store.strategy(false).await,
            ScanStrategy::Incremental {
                cursor: "100".into()
            }
        );
        assert_eq!(store.strategy(true).await, ScanStrategy::Full);
    }

    #[tokio::test]
    async fn test_cursor_never_regresses() {
        let store = SyncStateStore::load(MemoryStorage::new()).await;
        store.commit_full_scan(commit("200", &["a"])).await.unwrap();
        store.commit_incremental(commit("150", &["b"])).await.unwrap();

        let state = store.snapshot().await;
        assert_eq!(state.cursor.as_deref(), Some("200"));
        assert!(state.processed_ids.contains("b"));

        store.commit_incremental(commit("250", &[])).await.unwrap();
        assert_eq!(store.snapshot().await.cursor.as_deref(), Some("250"));
    }

    #[tokio::test]
    async fn test_missing_cursor_keeps_previous() {
        let store = SyncStateStore::load(MemoryStorage::new()).await;
        store.commit_full_scan(commit("10", &[])).await.unwrap();
        store
            .commit_incremental(ScanCommit::default())
            .await
            .unwrap();
        assert_eq!(store.snapshot().await.cursor.as_deref(), Some("10"));
    }

    #[tokio::test]
    async fn test_incremental_merges_full_replaces() {
        let store = SyncStateStore::load(MemoryStorage::new()).await;
        store.commit_full_scan(commit("1", &["a"])).await.unwrap();
        store.commit_incremental(commit("2", &["b"])).await.unwrap();
        assert_eq!(store.snapshot().await.processed_ids.len(), 2);

        let pending = store.unprocessed(vec!["a".into(), "c".into()]).await;
        assert_eq!(pending, vec!["c".to_owned()]);

        store.commit_full_scan(commit("3", &["z"])).await.unwrap();
        let state = store.snapshot().await;
        assert_eq!(state.processed_ids.len(), 1);
        assert!(state.full_scan_at.is_some());
        assert!(state.incremental_sync_at.is_some());
    }

    #[tokio::test]
    async fn test_reset_clears_storage() {
        let store = SyncStateStore::load(MemoryStorage::new()).await;
        store.commit_full_scan(commit("5", &["a"])).await.unwrap();
        store.reset().await.unwrap();

        assert_eq!(store.snapshot().await, SyncState::default());
        assert_eq!(store.strategy(false).await, ScanStrategy::Full);
    }

    #[tokio::test]
    async fn test_loads_seeded_state() {
        let seeded = SyncState {
            cursor: Some("77".into()),
            ..SyncState::default()
        };
        let store = SyncStateStore::load(MemoryStorage::with_state(seeded)).await;
        assert_eq!(
            store.strategy(false).await,
            ScanStrategy::Incremental {
                cursor: "77".into()
            }
        );
    }
}
