//! Sync checkpoint models.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Durable record of the last successful sync.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncState {
    /// History cursor usable for the next incremental scan.
    pub cursor: Option<String>,
    /// Completion time of the last full scan.
    pub full_scan_at: Option<DateTime<Utc>>,
    /// Completion time of the last incremental scan.
    pub incremental_sync_at: Option<DateTime<Utc>>,
    /// Message ids already run through detection.
    pub processed_ids: BTreeSet<String>,
    /// Subscriptions reported by the last scan.
    pub last_subscription_count: usize,
    /// Messages examined by the last scan.
    pub last_emails_scanned: usize,
}

impl SyncState {
    /// Whether an incremental scan is possible.
    #[must_use]
    pub fn has_cursor(&self) -> bool {
        self.cursor.as_deref().is_some_and(|c| !c.is_empty())
    }

    /// Completion time of the most recent scan of either kind.
    #[must_use]
    pub fn last_synced_at(&self) -> Option<DateTime<Utc>> {
        self.full_scan_at.max(self.incremental_sync_at)
    }
}

/// How the next scan will retrieve messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScanStrategy {
    /// Keyword search over the lookback window.
    Full,
    /// Changes since the stored cursor.
    Incremental {
        /// Cursor to resume from.
        cursor: String,
    },
}

impl ScanStrategy {
    /// Short label for logs and reports.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Incremental { .. } => "incremental",
        }
    }
}

/// Orders two cursors. Numeric cursors compare by value; anything else is
/// opaque and only equality is known.
#[must_use]
pub fn compare_cursors(a: &str, b: &str) -> Option<Ordering> {
    match (a.parse::<u64>(), b.parse::<u64>()) {
        (Ok(a), Ok(b)) => Some(a.cmp(&b)),
        _ if a == b => Some(Ordering::Equal),
        _ => None,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_cursor_ordering() {
        assert_eq!(compare_cursors("100", "99"), Some(Ordering::Greater));
        assert_eq!(compare_cursors("99", "100"), Some(Ordering::Less));
        assert_eq!(compare_cursors("abc", "abc"), Some(Ordering::Equal));
        assert_eq!(compare_cursors("abc", "100"), None);
    }

    #[test]
    fn test_state_deserializes_partial_json() {
        let state: SyncState = serde_json::from_str(r#"{"cursor": "42"}"#).unwrap();
        assert!(state.has_cursor());
        assert!(state.processed_ids.is_empty());
        assert!(state.last_synced_at().is_none());
    }

    #[test]
    fn test_empty_cursor_is_unusable() {
        let state = SyncState {
            cursor: Some(String::new()),
            ..SyncState::default()
        };
        assert!(!state.has_cursor());
    }
}
