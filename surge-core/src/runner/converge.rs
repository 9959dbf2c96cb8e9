use std::time::Duration;

use serde::Serialize;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

use super::config::ConvergenceConfig;
use crate::metrics_stream::{MetricsSnapshot, MetricsWatch};

use super::progress::{ProgressFn, ProgressUpdate};

/// How the post-dispatch wait ended. None of these is an error.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ConvergenceOutcome {
    Reached {
        processed: u64,
        #[serde(rename = "waited_ms", serialize_with = "millis")]
        waited: Duration,
    },
    /// `processed` is the last value seen, if any sample carried it.
    TimedOut {
        processed: Option<u64>,
        #[serde(rename = "waited_ms", serialize_with = "millis")]
        waited: Duration,
    },
    /// No baseline was available; a fixed wait was used instead.
    Skipped {
        #[serde(rename = "waited_ms", serialize_with = "millis")]
        waited: Duration,
    },
}

fn millis<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}

impl ConvergenceOutcome {
    pub fn waited(&self) -> Duration {
        match self {
            Self::Reached { waited, .. }
            | Self::TimedOut { waited, .. }
            | Self::Skipped { waited } => *waited,
        }
    }

    pub fn is_reached(&self) -> bool {
        matches!(self, Self::Reached { .. })
    }
}

/// Smallest processed delta that satisfies `threshold` for `sent` events.
pub fn required_processed(threshold: f64, sent: u64) -> u64 {
    // Tolerates float noise so that 0.95 * 1000 requires exactly 950.
    let required = (threshold * sent as f64 - 1e-9).ceil();
    if required <= 0.0 { 0 } else { required as u64 }
}

/// Waits for the processed delta to reach the configured share of `sent`.
///
/// Without a baseline it sleeps `fallback_wait` once. Otherwise the latest sample is checked
/// immediately and then every `poll_interval` until the threshold is met or `max_wait` passes.
pub async fn await_convergence(
    baseline: Option<&MetricsSnapshot>,
    latest: &MetricsWatch,
    sent: u64,
    cfg: &ConvergenceConfig,
    progress: Option<&ProgressFn>,
) -> ConvergenceOutcome {
    let started = Instant::now();

    let Some(baseline) = baseline else {
        info!(wait = ?cfg.fallback_wait, "no metrics baseline, using fixed wait");
        tokio::time::sleep(cfg.fallback_wait).await;
        return ConvergenceOutcome::Skipped {
            waited: started.elapsed(),
        };
    };

    let required = required_processed(cfg.threshold, sent);
    let deadline = started + cfg.max_wait;
    info!(required, sent, max_wait = ?cfg.max_wait, "waiting for convergence");

    let mut ticker = tokio::time::interval(cfg.poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut last_processed = None;
    let mut poll = 0u64;
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = tokio::time::sleep_until(deadline) => {
                let waited = started.elapsed();
                info!(processed = ?last_processed, required, ?waited, "convergence timed out");
                return ConvergenceOutcome::TimedOut { processed: last_processed, waited };
            }
        }

        poll += 1;
        let processed = latest.latest().and_then(|s| s.received_since(baseline));
        if processed.is_some() {
            last_processed = processed;
        }

        let waited = started.elapsed();
        debug!(poll, processed = ?processed, required, "convergence check");
        if let Some(progress) = progress {
            progress(ProgressUpdate::Convergence {
                poll,
                processed,
                required,
                events_sent: sent,
                waited,
            });
        }

        if let Some(processed) = processed
            && processed >= required
        {
            info!(processed, required, ?waited, "convergence reached");
            return ConvergenceOutcome::Reached { processed, waited };
        }
    }
}
