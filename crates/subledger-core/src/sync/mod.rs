//! Sync checkpointing.
//!
//! Tracks the history cursor and processed ids between scans so that
//! later scans only look at new mail.

mod model;
mod storage;
mod store;

pub use model::{ScanStrategy, SyncState, compare_cursors};
pub use storage::{JsonFileStorage, MemoryStorage, SyncStorage};
pub use store::{ScanCommit, SyncStateStore};
