//! Two-tier message cache: bounded memory tier over the durable store.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use subledger_gmail::Message;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::model::{CacheEntry, CacheStats};
use super::repository::MessageStore;

/// Configuration for [`MessageCache`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum entries held in memory.
    pub memory_capacity: usize,
    /// Age after which memory entries are dropped, in seconds.
    pub memory_ttl_secs: u64,
    /// Age after which durable entries are pruned, in days.
    pub disk_max_age_days: u32,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            memory_capacity: 1000,
            memory_ttl_secs: 3600,
            disk_max_age_days: 30,
        }
    }
}

impl CacheConfig {
    fn memory_ttl(&self) -> chrono::Duration {
        chrono::Duration::from_std(Duration::from_secs(self.memory_ttl_secs))
            .unwrap_or(chrono::Duration::MAX)
    }

    fn disk_max_age(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.disk_max_age_days))
    }
}

#[derive(Debug, Default)]
struct MemoryTier {
    entries: HashMap<String, CacheEntry>,
    stats: CacheStats,
}

impl MemoryTier {
    fn is_fresh(entry: &CacheEntry, now: DateTime<Utc>, ttl: chrono::Duration) -> bool {
        now.signed_duration_since(entry.cached_at) <= ttl
    }

    /// Looks up a fresh entry, dropping it if it has aged out.
    fn lookup(&mut self, id: &str, now: DateTime<Utc>, ttl: chrono::Duration) -> Option<Message> {
        let fresh = Self::is_fresh(self.entries.get(id)?, now, ttl);
        if fresh {
            self.stats.memory_hits += 1;
            self.entries.get(id).map(|e| e.message.clone())
        } else {
            self.entries.remove(id);
            self.stats.evictions += 1;
            None
        }
    }

    fn insert(&mut self, entry: CacheEntry, capacity: usize) {
        self.entries.insert(entry.message.id.clone(), entry);
        self.evict_over_capacity(capacity);
    }

    /// Drops oldest-cached entries until within capacity.
    fn evict_over_capacity(&mut self, capacity: usize) {
        let excess = self.entries.len().saturating_sub(capacity);
        if excess == 0 {
            return;
        }
        let mut by_age: Vec<(DateTime<Utc>, String)> = self
            .entries
            .values()
            .map(|e| (e.cached_at, e.message.id.clone()))
            .collect();
        by_age.sort();
        for (_, id) in by_age.into_iter().take(excess) {
            self.entries.remove(&id);
        }
        self.stats.evictions += excess as u64;
    }

    fn prune(&mut self, now: DateTime<Utc>, ttl: chrono::Duration) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, e| Self::is_fresh(e, now, ttl));
        let removed = before - self.entries.len();
        self.stats.evictions += removed as u64;
        removed
    }
}

/// Previously fetched message metadata, keyed by message id.
///
/// The memory tier is bounded by capacity and age; the durable tier (when
/// present) is unbounded and pruned by age. Durable-tier failures are logged
/// and treated as misses: the cache can always fall back to refetching.
#[derive(Debug)]
pub struct MessageCache {
    config: CacheConfig,
    memory: Mutex<MemoryTier>,
    store: Option<MessageStore>,
}

impl MessageCache {
    /// Creates a cache over an optional durable store.
    #[must_use]
    pub fn new(config: CacheConfig, store: Option<MessageStore>) -> Self {
        Self {
            config,
            memory: Mutex::new(MemoryTier::default()),
            store,
        }
    }

    /// Creates a cache without a durable tier.
    #[must_use]
    pub fn memory_only(config: CacheConfig) -> Self {
        Self::new(config, None)
    }

    /// Looks up one message.
    pub async fn get(&self, id: &str) -> Option<Message> {
        let now = Utc::now();
        {
            let mut memory = self.memory.lock().await;
            if let Some(message) = memory.lookup(id, now, self.config.memory_ttl()) {
                return Some(message);
            }
        }

        let entry = match &self.store {
            Some(store) => store.get(id).await.unwrap_or_else(|e| {
                warn!("Message cache read failed for {}: {}", id, e);
                None
            }),
            None => None,
        };

        let mut memory = self.memory.lock().await;
        match entry {
            Some(entry) => {
                memory.stats.disk_hits += 1;
                let message = entry.message.clone();
                memory.insert(entry, self.config.memory_capacity);
                Some(message)
            }
            None => {
                memory.stats.misses += 1;
                None
            }
        }
    }

    /// Splits `ids` into cached messages and ids that must be fetched.
    ///
    /// Missing ids keep their input order.
    pub async fn partition(&self, ids: &[String]) -> (Vec<Message>, Vec<String>) {
        let now = Utc::now();
        let ttl = self.config.memory_ttl();
        let mut cached = Vec::new();
        let mut remaining = Vec::new();
        {
            let mut memory = self.memory.lock().await;
            for id in ids {
                match memory.lookup(id, now, ttl) {
                    Some(message) => cached.push(message),
                    None => remaining.push(id.clone()),
                }
            }
        }

        let from_disk = match (&self.store, remaining.is_empty()) {
            (Some(store), false) => store.get_many(&remaining).await.unwrap_or_else(|e| {
                warn!("Message cache batch read failed: {}", e);
                Vec::new()
            }),
            _ => Vec::new(),
        };

        let mut memory = self.memory.lock().await;
        let mut found: HashMap<String, CacheEntry> = from_disk
            .into_iter()
            .map(|entry| (entry.message.id.clone(), entry))
            .collect();
        let mut missing = Vec::new();
        for id in remaining {
            match found.remove(&id) {
                Some(entry) => {
                    memory.stats.disk_hits += 1;
                    cached.push(entry.message.clone());
                    memory.insert(entry, self.config.memory_capacity);
                }
                None => {
                    memory.stats.misses += 1;
                    missing.push(id);
                }
            }
        }

        debug!(
            "Message cache: {} cached, {} to fetch",
            cached.len(),
            missing.len()
        );
        (cached, missing)
    }

    /// Stores freshly fetched messages in both tiers.
    pub async fn insert_many(&self, messages: &[Message]) {
        if messages.is_empty() {
            return;
        }
        let now = Utc::now();
        let entries: Vec<CacheEntry> = messages
            .iter()
            .map(|m| CacheEntry::new(m.clone(), now))
            .collect();

        if let Some(store) = &self.store
            && let Err(e) = store.put_many(&entries).await
        {
            warn!("Message cache write failed: {}", e);
        }

        let mut memory = self.memory.lock().await;
        for entry in entries {
            memory.insert(entry, self.config.memory_capacity);
        }
    }

    /// Every cached message, durable tier first, oldest first.
    pub async fn all_messages(&self) -> Vec<Message> {
        let mut by_id: HashMap<String, Message> = HashMap::new();
        if let Some(store) = &self.store {
            match store.all().await {
                Ok(entries) => {
                    by_id.extend(entries.into_iter().map(|e| (e.message.id.clone(), e.message)));
                }
                Err(e) => warn!("Message cache scan failed: {}", e),
            }
        }
        {
            let memory = self.memory.lock().await;
            for (id, entry) in &memory.entries {
                by_id
                    .entry(id.clone())
                    .or_insert_with(|| entry.message.clone());
            }
        }

        let mut messages: Vec<Message> = by_id.into_values().collect();
        messages.sort_by(|a, b| {
            a.internal_date
                .cmp(&b.internal_date)
                .then_with(|| a.id.cmp(&b.id))
        });
        messages
    }

    /// Drops aged-out entries from both tiers. Returns how many were removed.
    pub async fn prune(&self) -> u64 {
        let now = Utc::now();
        let memory_removed = self
            .memory
            .lock()
            .await
            .prune(now, self.config.memory_ttl());

        let disk_removed = match &self.store {
            Some(store) => store
                .prune_older_than(now - self.config.disk_max_age())
                .await
                .unwrap_or_else(|e| {
                    warn!("Message cache prune failed: {}", e);
                    0
                }),
            None => 0,
        };

        debug!(
            "Pruned {} memory and {} durable cache entries",
            memory_removed, disk_removed
        );
        memory_removed as u64 + disk_removed
    }

    /// Releases the memory tier; the durable tier is untouched.
    pub async fn handle_memory_pressure(&self) {
        let mut memory = self.memory.lock().await;
        let dropped = memory.entries.len();
        memory.entries.clear();
        memory.stats.evictions += dropped as u64;
        debug!("Memory pressure: dropped {} cached messages", dropped);
    }

    /// Removes every entry from both tiers.
    pub async fn clear(&self) {
        if let Some(store) = &self.store
            && let Err(e) = store.clear().await
        {
            warn!("Message cache clear failed: {}", e);
        }
        self.memory.lock().await.entries.clear();
    }

    /// Current counters.
    pub async fn stats(&self) -> CacheStats {
        let memory = self.memory.lock().await;
        CacheStats {
            memory_entries: memory.entries.len(),
            ..memory.stats
        }
    }
}
