//! Resilient remote fetching.
//!
//! Every remote call passes through a [`ResilienceGuard`]: circuit breaker
//! admission, request pacing, then classified retry. The
//! [`ResilientFetchClient`] layers pagination, the message cache and
//! concurrent detail batches on top.

mod client;
mod guard;

pub use client::{ChangeSet, FetchOutcome, ResilientFetchClient};
pub use guard::ResilienceGuard;
