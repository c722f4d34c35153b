//! Message cache.
//!
//! Previously fetched message metadata is kept so repeat scans skip the
//! network: a bounded in-memory tier in front of a durable `SQLite` tier.

mod message_cache;
mod model;
mod repository;

pub use message_cache::{CacheConfig, MessageCache};
pub use model::{CacheEntry, CacheStats};
pub use repository::MessageStore;
