//! Retry, backoff and circuit breaking around a single remote call.

use std::future::Future;
use std::sync::Arc;

use subledger_gmail::resilience::{
    AdaptiveBatchSizer, BatchSizerConfig, CircuitBreaker, CircuitBreakerConfig, CircuitState,
    RateLimiter, RateLimiterConfig,
};
use subledger_gmail::{Error as ApiError, Result as ApiResult};
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Shared handles to the rate limiter, circuit breaker and batch sizer.
///
/// Cloning is cheap; clones drive the same state, so concurrent batch
/// tasks each hold one.
#[derive(Debug, Clone)]
pub struct ResilienceGuard {
    limiter: Arc<RateLimiter>,
    breaker: Arc<Mutex<CircuitBreaker>>,
    sizer: Arc<Mutex<AdaptiveBatchSizer>>,
}

impl Default for ResilienceGuard {
    fn default() -> Self {
        Self::new(
            RateLimiterConfig::default(),
            CircuitBreakerConfig::default(),
            BatchSizerConfig::default(),
        )
    }
}

impl ResilienceGuard {
    /// Creates a guard with fresh state.
    #[must_use]
    pub fn new(
        rate_limit: RateLimiterConfig,
        circuit_breaker: CircuitBreakerConfig,
        batch: BatchSizerConfig,
    ) -> Self {
        Self {
            limiter: Arc::new(RateLimiter::new(rate_limit)),
            breaker: Arc::new(Mutex::new(CircuitBreaker::new(circuit_breaker))),
            sizer: Arc::new(Mutex::new(AdaptiveBatchSizer::new(batch))),
        }
    }

    /// Width for the next batch launch.
    pub async fn batch_size(&self) -> usize {
        self.sizer.lock().await.current_size()
    }

    /// Current circuit state.
    pub async fn circuit_state(&self) -> CircuitState {
        self.breaker.lock().await.state()
    }

    /// Runs `op` under admission control, pacing and retry.
    ///
    /// - 429: counted against the breaker and sizer, then retried after the
    ///   server's `Retry-After` or a computed backoff.
    /// - 401: counted as a failure and returned immediately.
    /// - Expired cursor or missing resource: the server answered, so the
    ///   breaker sees a success; the error is returned unretried.
    /// - Other transient failures: retried with backoff.
    ///
    /// # Errors
    ///
    /// Returns `CircuitOpen` without calling `op` when the breaker rejects,
    /// `MaxRetriesExceeded` once the retry ceiling is hit, or the first
    /// non-retryable error.
    pub async fn call<T, F, Fut>(&self, label: &str, mut op: F) -> ApiResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ApiResult<T>>,
    {
        loop {
            if !self.breaker.lock().await.can_proceed() {
                debug!("{}: circuit open, not calling", label);
                return Err(ApiError::CircuitOpen);
            }
            self.limiter.wait_for_next_request().await;

            let error = match op().await {
                Ok(value) => {
                    self.on_success().await;
                    return Ok(value);
                }
                Err(e) => e,
            };

            match error {
                ApiError::RateLimited { retry_after } => {
                    self.breaker.lock().await.record_failure();
                    self.sizer.lock().await.record_rate_limit();
                    // Armed before the give-up check; sibling calls share the deadline.
                    let armed = match retry_after.as_deref() {
                        Some(value) => self.limiter.parse_retry_after_header(value).await,
                        None => false,
                    };
                    let last_error = format!("rate limited (retry-after: {retry_after:?})");
                    self.give_up_if_exhausted(label, last_error).await?;

                    if armed {
                        self.limiter.record_retry().await;
                    } else {
                        self.limiter.apply_backoff().await;
                    }
                    warn!("{}: rate limited, retrying", label);
                }
                ApiError::Unauthorized => {
                    self.breaker.lock().await.record_failure();
                    return Err(ApiError::Unauthorized);
                }
                e @ (ApiError::CursorExpired | ApiError::NotFound(_)) => {
                    self.breaker.lock().await.record_success();
                    return Err(e);
                }
                e if e.is_retryable() => {
                    self.breaker.lock().await.record_failure();
                    self.sizer.lock().await.record_failure();
                    self.give_up_if_exhausted(label, e.to_string()).await?;
                    let delay = self.limiter.apply_backoff().await;
                    warn!("{}: {} (retried after {:?})", label, e, delay);
                }
                e => return Err(e),
            }
        }
    }

    async fn on_success(&self) {
        self.breaker.lock().await.record_success();
        self.sizer.lock().await.record_success();
        self.limiter.reset_retry_state().await;
    }

    async fn give_up_if_exhausted(&self, label: &str, last_error: String) -> ApiResult<()> {
        if !self.limiter.has_exceeded_max_retries().await {
            return Ok(());
        }
        let attempts = self.limiter.attempt().await + 1;
        warn!("{}: giving up after {} attempts", label, attempts);
        self.limiter.reset_attempts().await;
        Err(ApiError::MaxRetriesExceeded {
            attempts,
            last_error,
        })
    }
}
