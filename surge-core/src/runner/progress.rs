use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub enum ProgressUpdate {
    /// Emitted after every dispatched batch.
    Batch {
        /// 1-based batch index.
        batch: u64,
        batches: u64,
        batch_succeeded: u64,
        batch_failed: u64,
        /// Running totals over the whole run so far.
        events_sent: u64,
        events_failed: u64,
        elapsed: Duration,
    },
    /// Emitted on every convergence check.
    Convergence {
        /// 1-based poll counter.
        poll: u64,
        /// `None` while the latest sample does not carry a received counter.
        processed: Option<u64>,
        required: u64,
        events_sent: u64,
        waited: Duration,
    },
}

pub type ProgressFn = std::sync::Arc<dyn Fn(ProgressUpdate) + Send + Sync + 'static>;
