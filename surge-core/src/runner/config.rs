use std::time::Duration;

use super::error::{Error, Result};

pub const DEFAULT_INGEST_URL: &str = "http://localhost:8081/events";
pub const DEFAULT_METRICS_URL: &str = "http://localhost:8082/metrics/stream";
pub const DEFAULT_EVENT_TYPE: &str = "page_view";

/// When the harness stops waiting for the system under test to catch up.
#[derive(Debug, Clone, PartialEq)]
pub struct ConvergenceConfig {
    /// Fraction of sent events that must show up as processed, in `(0, 1]`.
    pub threshold: f64,
    pub max_wait: Duration,
    pub poll_interval: Duration,
    /// Fixed wait used when no metrics baseline was captured.
    pub fallback_wait: Duration,
}

impl Default for ConvergenceConfig {
    fn default() -> Self {
        Self {
            threshold: 0.95,
            max_wait: Duration::from_secs(30),
            poll_interval: Duration::from_millis(500),
            fallback_wait: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HarnessConfig {
    /// Target events per second.
    pub target_rate: u64,
    pub duration: Duration,
    /// Overrides `target_rate * duration` when set.
    pub total_events: Option<u64>,
    pub batch_size: u64,

    pub ingest_url: String,
    /// `None` skips the metrics stream entirely (degraded mode).
    pub metrics_url: Option<String>,

    pub event_type: String,
    /// Number of distinct session ids events are spread across.
    pub session_pool: u64,

    pub convergence: ConvergenceConfig,

    /// Bound on the metrics stream producing its first valid sample.
    pub connect_timeout: Duration,
    /// Per-submission timeout; unbounded when `None`.
    pub request_timeout: Option<Duration>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            target_rate: 2000,
            duration: Duration::from_secs(10),
            total_events: None,
            batch_size: 100,
            ingest_url: DEFAULT_INGEST_URL.to_string(),
            metrics_url: Some(DEFAULT_METRICS_URL.to_string()),
            event_type: DEFAULT_EVENT_TYPE.to_string(),
            session_pool: 1000,
            convergence: ConvergenceConfig::default(),
            connect_timeout: Duration::from_secs(5),
            request_timeout: None,
        }
    }
}

impl HarnessConfig {
    /// Events to dispatch over the whole run.
    #[must_use]
    pub fn total_events(&self) -> u64 {
        match self.total_events {
            Some(n) => n,
            None => {
                let nanos = u128::from(self.target_rate) * self.duration.as_nanos();
                u64::try_from(nanos.div_ceil(1_000_000_000)).unwrap_or(u64::MAX)
            }
        }
    }

    /// Rejects configurations that must not reach the dispatch phase.
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(Error::InvalidBatchSize);
        }
        if self.total_events() == 0 {
            return Err(Error::InvalidTotalEvents);
        }

        let threshold = self.convergence.threshold;
        if !threshold.is_finite() || threshold <= 0.0 || threshold > 1.0 {
            return Err(Error::InvalidThreshold(threshold));
        }
        if self.convergence.poll_interval.is_zero() {
            return Err(Error::InvalidPollInterval);
        }

        Ok(())
    }
}
