//! Consecutive-failure circuit breaker.

use std::time::Duration;

use tokio::time::Instant;
use tracing::{info, warn};

/// Circuit state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// All requests admitted.
    Closed,
    /// All requests rejected until the cooldown elapses.
    Open,
    /// A bounded number of probe requests admitted.
    HalfOpen,
}

/// Configuration for [`CircuitBreaker`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the circuit.
    pub failure_threshold: u32,
    /// Time spent open before probing.
    pub cooldown: Duration,
    /// Consecutive half-open successes that close the circuit.
    pub success_threshold: u32,
    /// Probe requests admitted while half-open.
    pub half_open_max_requests: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown: Duration::from_secs(60),
            success_threshold: 2,
            half_open_max_requests: 3,
        }
    }
}

impl CircuitBreakerConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the failure threshold.
    #[must_use]
    pub const fn failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    /// Sets the open-state cooldown.
    #[must_use]
    pub const fn cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    /// Sets the half-open success threshold.
    #[must_use]
    pub const fn success_threshold(mut self, threshold: u32) -> Self {
        self.success_threshold = threshold;
        self
    }
}

/// Gates request admission on recent failure history.
///
/// The open → half-open transition is checked lazily in
/// [`can_proceed`](Self::can_proceed); there is no background timer.
#[derive(Debug)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    half_open_admitted: u32,
    opened_at: Option<Instant>,
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}

impl CircuitBreaker {
    /// Creates a closed circuit breaker.
    #[must_use]
    pub const fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            state: CircuitState::Closed,
            failure_count: 0,
            success_count: 0,
            half_open_admitted: 0,
            opened_at: None,
        }
    }

    /// Current state, without the lazy cooldown check.
    #[must_use]
    pub const fn state(&self) -> CircuitState {
        self.state
    }

    /// Consecutive failures recorded while closed.
    #[must_use]
    pub const fn failure_count(&self) -> u32 {
        self.failure_count
    }

    /// Admission decision for the next request.
    pub fn can_proceed(&mut self) -> bool {
        self.can_proceed_at(Instant::now())
    }

    /// Admission decision evaluated at `now`.
    pub fn can_proceed_at(&mut self, now: Instant) -> bool {
        match self.state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let cooled = self
                    .opened_at
                    .is_none_or(|opened| now.saturating_duration_since(opened) >= self.config.cooldown);
                if !cooled {
                    return false;
                }
                info!("Circuit breaker cooldown elapsed, probing (half-open)");
                self.state = CircuitState::HalfOpen;
                self.success_count = 0;
                self.half_open_admitted = 1;
                true
            }
            CircuitState::HalfOpen => {
                if self.half_open_admitted < self.config.half_open_max_requests {
                    self.half_open_admitted += 1;
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Records a successful request.
    pub fn record_success(&mut self) {
        match self.state {
            CircuitState::Closed => self.failure_count = 0,
            CircuitState::HalfOpen => {
                self.success_count += 1;
                if self.success_count >= self.config.success_threshold {
                    info!("Circuit breaker closed after successful probes");
                    self.reset();
                } else {
                    // Each success frees a probe slot.
                    self.half_open_admitted = self.half_open_admitted.saturating_sub(1);
                }
            }
            CircuitState::Open => {}
        }
    }

    /// Records a failed request.
    pub fn record_failure(&mut self) {
        self.record_failure_at(Instant::now());
    }

    /// Records a failed request observed at `now`.
    pub fn record_failure_at(&mut self, now: Instant) {
        match self.state {
            CircuitState::Closed => {
                self.failure_count += 1;
                if self.failure_count >= self.config.failure_threshold {
                    warn!(
                        "Circuit breaker opened after {} consecutive failures",
                        self.failure_count
                    );
                    self.open(now);
                }
            }
            CircuitState::HalfOpen => {
                warn!("Probe failed, circuit breaker re-opened");
                self.open(now);
            }
            CircuitState::Open => self.opened_at = Some(now),
        }
    }

    /// Forces the breaker back to closed.
    pub fn reset(&mut self) {
        self.state = CircuitState::Closed;
        self.failure_count = 0;
        self.success_count = 0;
        self.half_open_admitted = 0;
        self.opened_at = None;
    }

    fn open(&mut self, now: Instant) {
        self.state = CircuitState::Open;
        self.opened_at = Some(now);
        self.success_count = 0;
        self.half_open_admitted = 0;
    }
}
