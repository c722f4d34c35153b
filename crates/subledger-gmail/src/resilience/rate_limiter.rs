//! Request pacing, `Retry-After` handling and exponential backoff.

use std::time::Duration;

use chrono::{DateTime, NaiveDateTime, Utc};
use rand::Rng;
use tokio::sync::Mutex;
use tokio::time::{Instant, sleep};
use tracing::debug;

/// Default minimum spacing between requests.
pub const DEFAULT_MIN_INTERVAL: Duration = Duration::from_millis(100);

/// Default first backoff delay.
pub const DEFAULT_INITIAL_DELAY: Duration = Duration::from_secs(1);

/// Default backoff ceiling.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(32);

/// Default retry ceiling.
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// Upper bound of the positive jitter fraction.
const MAX_JITTER: f64 = 0.5;

/// Configuration for [`RateLimiter`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLimiterConfig {
    /// Minimum spacing between consecutive requests.
    pub min_interval: Duration,
    /// Backoff delay for the first retry.
    pub initial_delay: Duration,
    /// Backoff ceiling before jitter.
    pub max_delay: Duration,
    /// Attempts allowed before giving up.
    pub max_retries: u32,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            min_interval: DEFAULT_MIN_INTERVAL,
            initial_delay: DEFAULT_INITIAL_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

impl RateLimiterConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the minimum request spacing.
    #[must_use]
    pub const fn min_interval(mut self, interval: Duration) -> Self {
        self.min_interval = interval;
        self
    }

    /// Sets the first backoff delay.
    #[must_use]
    pub const fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Sets the backoff ceiling.
    #[must_use]
    pub const fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the retry ceiling.
    #[must_use]
    pub const fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }
}

#[derive(Debug, Default)]
struct State {
    /// Slot granted to the most recent caller.
    last_request: Option<Instant>,
    /// Server-announced earliest next request.
    retry_after: Option<Instant>,
    attempt: u32,
}

/// Throttles request cadence and computes backoff delays.
///
/// Each caller reserves the next free slot under the lock and then sleeps
/// outside it, so waiting callers never hold the limiter.
#[derive(Debug, Default)]
pub struct RateLimiter {
    config: RateLimiterConfig,
    state: Mutex<State>,
}

impl RateLimiter {
    /// Creates a rate limiter.
    #[must_use]
    pub fn new(config: RateLimiterConfig) -> Self {
        Self {
            config,
            state: Mutex::new(State::default()),
        }
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &RateLimiterConfig {
        &self.config
    }

    /// Waits until both the `Retry-After` deadline and the minimum spacing
    /// since the previous request have passed.
    pub async fn wait_for_next_request(&self) {
        let delay = {
            let mut state = self.state.lock().await;
            let now = Instant::now();
            let mut ready = now;
            if let Some(deadline) = state.retry_after {
                ready = ready.max(deadline);
            }
            if let Some(last) = state.last_request {
                ready = ready.max(last + self.config.min_interval);
            }
            state.last_request = Some(ready);
            ready.saturating_duration_since(now)
        };

        if !delay.is_zero() {
            debug!("Rate limiter pacing for {:?}", delay);
            sleep(delay).await;
        }
    }

    /// Backoff for `attempt` with the given jitter fraction in `[0, 0.5)`.
    #[must_use]
    pub fn backoff_delay(&self, attempt: u32, jitter: f64) -> Duration {
        let factor = 2_u32.saturating_pow(attempt);
        let base = self
            .config
            .initial_delay
            .saturating_mul(factor)
            .min(self.config.max_delay);
        base.mul_f64(1.0 + jitter.clamp(0.0, MAX_JITTER))
    }

    /// Sleeps for the current backoff delay and advances the attempt counter.
    ///
    /// Returns the delay slept.
    pub async fn apply_backoff(&self) -> Duration {
        let delay = {
            let mut state = self.state.lock().await;
            let jitter = rand::thread_rng().gen_range(0.0..MAX_JITTER);
            let delay = self.backoff_delay(state.attempt, jitter);
            state.attempt += 1;
            delay
        };
        debug!("Backing off for {:?}", delay);
        sleep(delay).await;
        delay
    }

    /// Counts a retry without sleeping; used when a `Retry-After` deadline
    /// already governs the next request.
    pub async fn record_retry(&self) {
        self.state.lock().await.attempt += 1;
    }

    /// Parses a `Retry-After` value and arms the deadline.
    ///
    /// Unparsable values leave any existing deadline untouched.
    pub async fn parse_retry_after_header(&self, value: &str) -> bool {
        let Some(wait) = parse_retry_after(value, Utc::now()) else {
            debug!("Ignoring unparsable Retry-After value {:?}", value);
            return false;
        };
        self.state.lock().await.retry_after = Some(Instant::now() + wait);
        debug!("Retry-After deadline set {:?} ahead", wait);
        true
    }

    /// True once the attempt counter reaches the retry ceiling.
    pub async fn has_exceeded_max_retries(&self) -> bool {
        self.state.lock().await.attempt >= self.config.max_retries
    }

    /// Current attempt counter.
    pub async fn attempt(&self) -> u32 {
        self.state.lock().await.attempt
    }

    /// Clears the attempt counter, keeping any `Retry-After` deadline.
    pub async fn reset_attempts(&self) {
        self.state.lock().await.attempt = 0;
    }

    /// Clears the attempt counter and any deadline after a success.
    pub async fn reset_retry_state(&self) {
        let mut state = self.state.lock().await;
        state.attempt = 0;
        state.retry_after = None;
    }
}

/// Parses a `Retry-After` value into a wait relative to `now`.
///
/// Accepts delta-seconds and the three HTTP-date forms: IMF-fixdate
/// (`Sun, 06 Nov 1994 08:49:37 GMT`), RFC 850 (`Sunday, 06-Nov-94 08:49:37 GMT`)
/// and asctime (`Sun Nov  6 08:49:37 1994`). Dates in the past yield zero.
#[must_use]
pub fn parse_retry_after(value: &str, now: DateTime<Utc>) -> Option<Duration> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    if let Ok(seconds) = value.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }

    let at = parse_http_date(value)?;
    Some((at - now).to_std().unwrap_or(Duration::ZERO))
}

fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(date) = DateTime::parse_from_rfc2822(value) {
        return Some(date.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(value, "%A, %d-%b-%y %H:%M:%S GMT") {
        return Some(naive.and_utc());
    }
    let collapsed = value.split_whitespace().collect::<Vec<_>>().join(" ");
    NaiveDateTime::parse_from_str(&collapsed, "%a %b %e %H:%M:%S %Y")
        .ok()
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn reference_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(1994, 11, 6, 8, 49, 0).unwrap()
    }

    #[test]
    fn test_parse_seconds() {
        assert_eq!(
            parse_retry_after("120", reference_now()),
            Some(Duration::from_secs(120))
        );
        assert_eq!(
            parse_retry_after(" 0 ", reference_now()),
            Some(Duration::ZERO)
        );
    }

    #[test]
    fn test_parse_http_dates() {
        let expected = Some(Duration::from_secs(37));
        assert_eq!(
            parse_retry_after("Sun, 06 Nov 1994 08:49:37 GMT", reference_now()),
            expected
        );
        assert_eq!(
            parse_retry_after("Sunday, 06-Nov-94 08:49:37 GMT", reference_now()),
            expected
        );
        assert_eq!(
            parse_retry_after("Sun Nov  6 08:49:37 1994", reference_now()),
            expected
        );
    }

    #[test]
    fn test_past_date_is_zero() {
        assert_eq!(
            parse_retry_after("Sun, 06 Nov 1994 08:00:00 GMT", reference_now()),
            Some(Duration::ZERO)
        );
    }

    #[test]
    fn test_parse_garbage() {
        assert_eq!(parse_retry_after("soon", reference_now()), None);
        assert_eq!(parse_retry_after("", reference_now()), None);
        assert_eq!(parse_retry_after("-5", reference_now()), None);
    }

    #[test]
    fn test_backoff_growth_and_cap() {
        let limiter = RateLimiter::new(
            RateLimiterConfig::new()
                .initial_delay(Duration::from_secs(1))
                .max_delay(Duration::from_secs(10)),
        );
        assert_eq!(limiter.backoff_delay(0, 0.0), Duration::from_secs(1));
        assert_eq!(limiter.backoff_delay(1, 0.0), Duration::from_secs(2));
        assert_eq!(limiter.backoff_delay(3, 0.0), Duration::from_secs(8));
        assert_eq!(limiter.backoff_delay(4, 0.0), Duration::from_secs(10));
        assert_eq!(limiter.backoff_delay(40, 0.0), Duration::from_secs(10));
        assert_eq!(limiter.backoff_delay(0, 0.5), Duration::from_millis(1500));
        assert_eq!(limiter.backoff_delay(0, 3.0), Duration::from_millis(1500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_min_interval_spacing() {
        let limiter = RateLimiter::new(
            RateLimiterConfig::new().min_interval(Duration::from_millis(100)),
        );
        let start = Instant::now();
        limiter.wait_for_next_request().await;
        limiter.wait_for_next_request().await;
        limiter.wait_for_next_request().await;
        assert!(start.elapsed() >= Duration::from_millis(200));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_after_deadline_respected() {
        let limiter = RateLimiter::new(RateLimiterConfig::new().min_interval(Duration::ZERO));
        assert!(limiter.parse_retry_after_header("3").await);
        let start = Instant::now();
        limiter.wait_for_next_request().await;
        assert!(start.elapsed() >= Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unparsable_retry_after_keeps_deadline() {
        let limiter = RateLimiter::new(RateLimiterConfig::new().min_interval(Duration::ZERO));
        assert!(limiter.parse_retry_after_header("2").await);
        assert!(!limiter.parse_retry_after_header("later").await);
        let start = Instant::now();
        limiter.wait_for_next_request().await;
        assert!(start.elapsed() >= Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_ceiling_and_reset() {
        let limiter = RateLimiter::new(
            RateLimiterConfig::new()
                .max_retries(2)
                .initial_delay(Duration::from_millis(10)),
        );
        assert!(!limiter.has_exceeded_max_retries().await);
        limiter.apply_backoff().await;
        assert!(!limiter.has_exceeded_max_retries().await);
        limiter.apply_backoff().await;
        assert!(limiter.has_exceeded_max_retries().await);

        limiter.reset_retry_state().await;
        assert_eq!(limiter.attempt().await, 0);
        assert!(!limiter.has_exceeded_max_retries().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_attempts_keeps_deadline() {
        let limiter = RateLimiter::new(
            RateLimiterConfig::new()
                .min_interval(Duration::ZERO)
                .initial_delay(Duration::from_millis(10)),
        );
        limiter.apply_backoff().await;
        assert!(limiter.parse_retry_after_header("4").await);

        limiter.reset_attempts().await;
        assert_eq!(limiter.attempt().await, 0);

        let start = Instant::now();
        limiter.wait_for_next_request().await;
        assert!(start.elapsed() >= Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_sleeps_with_jitter_bounds() {
        let limiter = RateLimiter::new(
            RateLimiterConfig::new().initial_delay(Duration::from_millis(100)),
        );
        let slept = limiter.apply_backoff().await;
        assert!(slept >= Duration::from_millis(100));
        assert!(slept < Duration::from_millis(150));
        let slept = limiter.apply_backoff().await;
        assert!(slept >= Duration::from_millis(200));
        assert!(slept < Duration::from_millis(300));
    }
}
