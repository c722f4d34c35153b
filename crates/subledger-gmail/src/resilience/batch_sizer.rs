//! Adaptive width for concurrent detail fetches.

use tracing::debug;

/// Configuration for [`AdaptiveBatchSizer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchSizerConfig {
    /// Lower bound on the width.
    pub min_size: usize,
    /// Upper bound on the width.
    pub max_size: usize,
    /// Starting width.
    pub initial_size: usize,
    /// Width removed on a rate limit.
    pub decrease_step: usize,
    /// Width added after a success streak.
    pub increase_step: usize,
    /// Successes needed before widening.
    pub success_streak: u32,
}

impl Default for BatchSizerConfig {
    fn default() -> Self {
        Self {
            min_size: 5,
            max_size: 20,
            initial_size: 15,
            decrease_step: 5,
            increase_step: 2,
            success_streak: 3,
        }
    }
}

/// Narrows fast on provider pressure, widens slowly on sustained success.
#[derive(Debug)]
pub struct AdaptiveBatchSizer {
    config: BatchSizerConfig,
    current: usize,
    streak: u32,
}

impl Default for AdaptiveBatchSizer {
    fn default() -> Self {
        Self::new(BatchSizerConfig::default())
    }
}

impl AdaptiveBatchSizer {
    /// Creates a sizer at the configured initial width.
    #[must_use]
    pub fn new(config: BatchSizerConfig) -> Self {
        let current = config
            .initial_size
            .clamp(config.min_size, config.max_size.max(config.min_size));
        Self {
            config,
            current,
            streak: 0,
        }
    }

    /// Width for the next batch launch.
    #[must_use]
    pub const fn current_size(&self) -> usize {
        self.current
    }

    /// Current success streak.
    #[must_use]
    pub const fn success_streak(&self) -> u32 {
        self.streak
    }

    /// Records a rate-limit response.
    pub fn record_rate_limit(&mut self) {
        self.streak = 0;
        let next = self
            .current
            .saturating_sub(self.config.decrease_step)
            .max(self.config.min_size);
        if next != self.current {
            debug!("Batch width {} -> {} after rate limit", self.current, next);
        }
        self.current = next;
    }

    /// Records a successful request.
    pub fn record_success(&mut self) {
        self.streak += 1;
        if self.streak >= self.config.success_streak {
            self.streak = 0;
            let next = (self.current + self.config.increase_step).min(self.config.max_size);
            if next != self.current {
                debug!("Batch width {} -> {} after success streak", self.current, next);
            }
            self.current = next;
        }
    }

    /// Records a non-rate-limit failure.
    pub fn record_failure(&mut self) {
        self.streak = 0;
    }
}
