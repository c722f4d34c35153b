//! Resilience primitives wrapped around every remote call.
//!
//! - [`RateLimiter`]: request pacing, `Retry-After`, exponential backoff
//! - [`CircuitBreaker`]: closed/open/half-open admission gate
//! - [`AdaptiveBatchSizer`]: concurrent fetch width

mod batch_sizer;
mod circuit_breaker;
mod rate_limiter;

pub use batch_sizer::{AdaptiveBatchSizer, BatchSizerConfig};
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use rate_limiter::{RateLimiter, RateLimiterConfig, parse_retry_after};
