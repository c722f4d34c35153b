//! Cache data models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use subledger_gmail::Message;

/// A cached message with the time it was stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// The cached message.
    pub message: Message,
    /// When the message was cached.
    pub cached_at: DateTime<Utc>,
}

impl CacheEntry {
    /// Wraps a message cached at `cached_at`.
    #[must_use]
    pub const fn new(message: Message, cached_at: DateTime<Utc>) -> Self {
        Self { message, cached_at }
    }
}

/// Hit/miss counters for the two cache tiers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Entries currently held in memory.
    pub memory_entries: usize,
    /// Lookups served from memory.
    pub memory_hits: u64,
    /// Lookups served from the durable tier.
    pub disk_hits: u64,
    /// Lookups that found nothing.
    pub misses: u64,
    /// Memory entries evicted by age, capacity or pressure.
    pub evictions: u64,
}
