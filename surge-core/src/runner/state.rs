use std::time::{Duration, SystemTime};

use crate::metrics_stream::MetricsSnapshot;

use super::dispatch::BatchResult;

/// Everything one run accumulates; the report is computed from it.
#[derive(Debug, Clone, Default)]
pub struct RunState {
    /// Submissions the ingest endpoint accepted with a 2xx.
    pub events_sent: u64,
    pub events_failed: u64,
    pub batches_dispatched: u64,
    pub started_at: Option<SystemTime>,
    /// Set once dispatch completes, before the convergence wait.
    pub ended_at: Option<SystemTime>,
    pub initial_metrics: Option<MetricsSnapshot>,
    pub latest_metrics: Option<MetricsSnapshot>,
}

impl RunState {
    pub fn record(&mut self, batch: &BatchResult) {
        self.events_sent = self.events_sent.saturating_add(batch.succeeded);
        self.events_failed = self.events_failed.saturating_add(batch.failed);
        self.batches_dispatched = self.batches_dispatched.saturating_add(1);
    }

    /// Wall time of the dispatch phase; zero when unknown or when the clock went backwards.
    pub fn elapsed(&self) -> Duration {
        match (self.started_at, self.ended_at) {
            (Some(start), Some(end)) => end.duration_since(start).unwrap_or(Duration::ZERO),
            _ => Duration::ZERO,
        }
    }
}
