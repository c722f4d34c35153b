//! Pipeline configuration.
//!
//! Every section is optional in JSON; missing fields take the defaults
//! below.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use subledger_gmail::resilience::{BatchSizerConfig, CircuitBreakerConfig, RateLimiterConfig};
use subledger_gmail::{MessageFormat, SearchQuery};

use crate::cache::CacheConfig;
use crate::{Error, Result};

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Request pacing and retry ceiling.
    pub rate_limit: RateLimitSettings,
    /// Circuit breaker thresholds.
    pub circuit_breaker: CircuitBreakerSettings,
    /// Concurrent fetch widths.
    pub batch: BatchSettings,
    /// Full-scan search.
    pub query: SearchQuery,
    /// Fetch behaviour outside the resilience layer.
    pub fetch: FetchSettings,
    /// Message cache tiers.
    pub cache: CacheConfig,
    /// Scoring thresholds and extra blocklist entries.
    pub detection: DetectionSettings,
}

impl Config {
    /// Parses configuration from JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is malformed.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::Config(e.to_string()))
    }

    /// Loads configuration from `path`. A missing file yields defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub async fn load(path: &Path) -> Result<Self> {
        match tokio::fs::read_to_string(path).await {
            Ok(contents) => Self::from_json(&contents)
                .map_err(|e| Error::Config(format!("{}: {e}", path.display()))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Serializable form of [`RateLimiterConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitSettings {
    /// Minimum spacing between requests, in milliseconds.
    pub min_interval_ms: u64,
    /// First backoff delay, in milliseconds.
    pub initial_delay_ms: u64,
    /// Backoff ceiling, in milliseconds.
    pub max_delay_ms: u64,
    /// Attempts before giving up.
    pub max_retries: u32,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            min_interval_ms: 100,
            initial_delay_ms: 1_000,
            max_delay_ms: 32_000,
            max_retries: 5,
        }
    }
}

impl From<RateLimitSettings> for RateLimiterConfig {
    fn from(s: RateLimitSettings) -> Self {
        Self::new()
            .min_interval(Duration::from_millis(s.min_interval_ms))
            .initial_delay(Duration::from_millis(s.initial_delay_ms))
            .max_delay(Duration::from_millis(s.max_delay_ms))
            .max_retries(s.max_retries)
    }
}

/// Serializable form of [`CircuitBreakerConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerSettings {
    /// Consecutive failures that open the circuit.
    pub failure_threshold: u32,
    /// Seconds before an open circuit admits probes.
    pub cooldown_secs: u64,
    /// Consecutive probe successes that close the circuit.
    pub success_threshold: u32,
    /// Probes admitted while half-open.
    pub half_open_max_requests: u32,
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown_secs: 60,
            success_threshold: 2,
            half_open_max_requests: 3,
        }
    }
}

impl From<CircuitBreakerSettings> for CircuitBreakerConfig {
    fn from(s: CircuitBreakerSettings) -> Self {
        Self {
            failure_threshold: s.failure_threshold,
            cooldown: Duration::from_secs(s.cooldown_secs),
            success_threshold: s.success_threshold,
            half_open_max_requests: s.half_open_max_requests,
        }
    }
}

/// Serializable form of [`BatchSizerConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchSettings {
    /// Narrowest batch.
    pub min_size: usize,
    /// Widest batch.
    pub max_size: usize,
    /// Starting width.
    pub initial_size: usize,
    /// Width removed on a rate limit.
    pub decrease_step: usize,
    /// Width added after a success streak.
    pub increase_step: usize,
    /// Successes before widening.
    pub success_streak: u32,
}

impl Default for BatchSettings {
    fn default() -> Self {
        let d = BatchSizerConfig::default();
        Self {
            min_size: d.min_size,
            max_size: d.max_size,
            initial_size: d.initial_size,
            decrease_step: d.decrease_step,
            increase_step: d.increase_step,
            success_streak: d.success_streak,
        }
    }
}

impl From<BatchSettings> for BatchSizerConfig {
    fn from(s: BatchSettings) -> Self {
        Self {
            min_size: s.min_size,
            max_size: s.max_size,
            initial_size: s.initial_size,
            decrease_step: s.decrease_step,
            increase_step: s.increase_step,
            success_streak: s.success_streak,
        }
    }
}

/// Fetch behaviour outside the resilience primitives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchSettings {
    /// Pause between consecutive detail batches, in milliseconds.
    pub batch_pacing_ms: u64,
    /// Detail format requested per message.
    pub message_format: MessageFormat,
    /// Optional label restricting incremental history queries.
    pub history_label: Option<String>,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            batch_pacing_ms: 250,
            message_format: MessageFormat::Metadata,
            history_label: None,
        }
    }
}

impl FetchSettings {
    /// Pause between batches.
    #[must_use]
    pub const fn batch_pacing(&self) -> Duration {
        Duration::from_millis(self.batch_pacing_ms)
    }
}

/// Detection thresholds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionSettings {
    /// Minimum score for a candidate to be reported.
    pub min_score: u32,
    /// Domains blocked in addition to the built-in list.
    pub extra_blocked_domains: Vec<String>,
}

impl Default for DetectionSettings {
    fn default() -> Self {
        Self {
            min_score: 50,
            extra_blocked_domains: Vec::new(),
        }
    }
}
