//! Scan orchestration.
//!
//! A scan picks a strategy from the sync checkpoint, fetches messages
//! through the resilient client, runs detection and only then commits the
//! new checkpoint. A scan that fails or is dropped part way leaves the
//! previous checkpoint in place.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::Serialize;
use subledger_gmail::{Error as ApiError, MailApi, Message};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::detection::{DetectionEngine, Subscription};
use crate::fetch::ResilientFetchClient;
use crate::sync::{ScanCommit, ScanStrategy, SyncStateStore, SyncStorage};
use crate::{Error, Result};

/// Result of one scan.
#[derive(Debug, Clone, Serialize)]
pub struct ScanReport {
    /// Strategy that actually ran. An expired cursor reports `Full`.
    pub strategy: ScanStrategy,
    /// Detected subscriptions, highest score first.
    pub subscriptions: Vec<Subscription>,
    /// Messages run through detection.
    pub emails_scanned: usize,
    /// Messages not seen by any earlier scan.
    pub new_messages: usize,
    /// Cursor stored by this scan.
    pub cursor: Option<String>,
}

/// Runs scans against one mailbox.
///
/// Scans are serialized: a forced full scan waits for any in-flight scan
/// before resetting state.
pub struct SubscriptionScanner<A: MailApi, S: SyncStorage> {
    client: ResilientFetchClient<A>,
    sync: SyncStateStore<S>,
    engine: DetectionEngine,
    scan_lock: Mutex<()>,
}

impl<A: MailApi, S: SyncStorage> SubscriptionScanner<A, S> {
    /// Assembles a scanner from its components.
    #[must_use]
    pub fn new(
        client: ResilientFetchClient<A>,
        sync: SyncStateStore<S>,
        engine: DetectionEngine,
    ) -> Self {
        Self {
            client,
            sync,
            engine,
            scan_lock: Mutex::new(()),
        }
    }

    /// Fetch client.
    #[must_use]
    pub const fn client(&self) -> &ResilientFetchClient<A> {
        &self.client
    }

    /// Sync checkpoint.
    #[must_use]
    pub const fn sync(&self) -> &SyncStateStore<S> {
        &self.sync
    }

    /// Detection engine.
    #[must_use]
    pub const fn engine(&self) -> &DetectionEngine {
        &self.engine
    }

    /// Runs a scan as of now.
    ///
    /// # Errors
    ///
    /// See [`Self::scan_at`].
    pub async fn scan(&self, force_full: bool) -> Result<ScanReport> {
        self.scan_at(force_full, Utc::now()).await
    }

    /// Runs a scan, judging staleness relative to `now`.
    ///
    /// A forced full scan first clears the checkpoint and the message cache.
    /// An expired cursor falls back to a full scan.
    ///
    /// # Errors
    ///
    /// Returns `Unauthorized` for the caller to refresh credentials, and
    /// any terminal fetch or persistence error. The checkpoint is not
    /// committed in either case.
    pub async fn scan_at(&self, force_full: bool, now: DateTime<Utc>) -> Result<ScanReport> {
        let _scan = self.scan_lock.lock().await;

        if force_full {
            self.reset_locked().await?;
        }

        let strategy = self.sync.strategy(force_full).await;
        info!("Starting {} scan", strategy.as_str());

        match strategy {
            ScanStrategy::Full => self.full_scan(now).await,
            ScanStrategy::Incremental { cursor } => {
                match self.incremental_scan(&cursor, now).await {
                    Err(Error::Api(ApiError::CursorExpired)) => {
                        warn!("History cursor {} expired, falling back to full scan", cursor);
                        self.full_scan(now).await
                    }
                    other => other,
                }
            }
        }
    }

    /// Clears the checkpoint and the message cache.
    ///
    /// # Errors
    ///
    /// Returns an error if the stored checkpoint cannot be removed.
    pub async fn reset(&self) -> Result<()> {
        let _scan = self.scan_lock.lock().await;
        self.reset_locked().await
    }

    async fn reset_locked(&self) -> Result<()> {
        self.sync.reset().await?;
        self.client.cache().clear().await;
        Ok(())
    }

    async fn full_scan(&self, now: DateTime<Utc>) -> Result<ScanReport> {
        let pruned = self.client.cache().prune().await;
        if pruned > 0 {
            info!("Pruned {} aged cache entries", pruned);
        }

        // Read before searching so changes made during the scan are picked
        // up by the next incremental pass.
        let cursor = self.client.current_cursor().await?;
        let fetched = self.client.full_scan().await?;

        let previous = self.sync.snapshot().await;
        let new_messages = fetched
            .messages
            .iter()
            .filter(|m| !previous.processed_ids.contains(&m.id))
            .count();

        let subscriptions = self.engine.detect(&fetched.messages, now);
        let commit = ScanCommit {
            cursor: Some(cursor),
            processed_ids: fetched.messages.iter().map(|m| m.id.clone()).collect(),
            subscription_count: subscriptions.len(),
            emails_scanned: fetched.messages.len(),
        };
        self.sync.commit_full_scan(commit).await?;

        let report = ScanReport {
            strategy: ScanStrategy::Full,
            subscriptions,
            emails_scanned: fetched.messages.len(),
            new_messages,
            cursor: self.sync.snapshot().await.cursor,
        };
        info!(
            "Full scan found {} subscriptions in {} messages",
            report.subscriptions.len(),
            report.emails_scanned
        );
        Ok(report)
    }

    async fn incremental_scan(&self, cursor: &str, now: DateTime<Utc>) -> Result<ScanReport> {
        let changes = self.client.changes_since(cursor).await?;
        let new_ids = self.sync.unprocessed(changes.ids).await;

        let (subscriptions, emails_scanned, new_messages) = if new_ids.is_empty() {
            (Vec::new(), 0, 0)
        } else {
            let fetched = self.client.fetch_messages(&new_ids).await?;
            let context = self.with_history(fetched.messages).await;
            let new_messages = new_ids.len();
            let subscriptions = self.engine.detect(&context, now);
            (subscriptions, context.len(), new_messages)
        };

        let commit = ScanCommit {
            cursor: changes.cursor,
            processed_ids: new_ids,
            subscription_count: subscriptions.len(),
            emails_scanned,
        };
        self.sync.commit_incremental(commit).await?;

        let report = ScanReport {
            strategy: ScanStrategy::Incremental {
                cursor: cursor.to_string(),
            },
            subscriptions,
            emails_scanned,
            new_messages,
            cursor: self.sync.snapshot().await.cursor,
        };
        info!(
            "Incremental scan: {} new messages, {} subscriptions",
            report.new_messages,
            report.subscriptions.len()
        );
        Ok(report)
    }

    /// Adds cached messages from the senders touched by `fresh`.
    async fn with_history(&self, fresh: Vec<Message>) -> Vec<Message> {
        let touched: HashSet<String> = fresh
            .iter()
            .filter_map(DetectionEngine::sender_domain)
            .collect();

        let mut by_id: HashMap<String, Message> = self
            .client
            .cache()
            .all_messages()
            .await
            .into_iter()
            .filter(|m| {
                DetectionEngine::sender_domain(m).is_some_and(|domain| touched.contains(&domain))
            })
            .map(|m| (m.id.clone(), m))
            .collect();
        by_id.extend(fresh.into_iter().map(|m| (m.id.clone(), m)));

        let mut messages: Vec<Message> = by_id.into_values().collect();
        messages.sort_by(|a, b| {
            a.internal_date
                .cmp(&b.internal_date)
                .then_with(|| a.id.cmp(&b.id))
        });
        messages
    }
}
