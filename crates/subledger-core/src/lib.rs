//! # subledger-core
//!
//! Subscription detection over a user's mailbox.
//!
//! This crate provides:
//! - **Resilient fetching** - pacing, retry, circuit breaking and adaptive
//!   batch widths around every remote call
//! - **Message cache** - in-memory tier over a durable `SQLite` tier
//! - **Sync checkpoints** - history cursor and processed ids for incremental scans
//! - **Merchant reference data** - known merchant domains, prices and cadences
//! - **Detection** - candidate grouping and multi-signal scoring
//! - **Scan orchestration** - strategy choice, cursor-expiry fallback and
//!   commit-after-detection

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod cache;
pub mod config;
pub mod credentials;
pub mod detection;
mod error;
pub mod fetch;
pub mod merchant;
pub mod scanner;
pub mod sync;

pub use cache::{CacheConfig, CacheStats, MessageCache, MessageStore};
pub use config::Config;
pub use credentials::{
    CredentialError, CredentialResult, KeyringTokenStore, StaticTokenStore, TokenStore,
};
pub use detection::{Cadence, Confidence, DetectionEngine, DetectionSource, Subscription};
pub use error::{Error, Result};
pub use fetch::{ChangeSet, FetchOutcome, ResilienceGuard, ResilientFetchClient};
pub use merchant::{Merchant, MerchantCategory, MerchantDatabase};
pub use scanner::{ScanReport, SubscriptionScanner};
pub use sync::{JsonFileStorage, MemoryStorage, ScanStrategy, SyncState, SyncStateStore, SyncStorage};
