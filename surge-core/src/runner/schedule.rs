use std::time::Duration;

use super::error::{Error, Result};

/// How a run's events are split into batches and spaced over the target duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchPlan {
    total_events: u64,
    batch_size: u64,
    batch_count: u64,
    nominal_delay: Duration,
}

impl BatchPlan {
    pub fn new(total_events: u64, batch_size: u64, duration: Duration) -> Result<Self> {
        if batch_size == 0 {
            return Err(Error::InvalidBatchSize);
        }
        if total_events == 0 {
            return Err(Error::InvalidTotalEvents);
        }

        let batch_count = total_events.div_ceil(batch_size);
        let nanos = duration.as_nanos() / u128::from(batch_count);
        let nominal_delay = Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX));

        Ok(Self {
            total_events,
            batch_size,
            batch_count,
            nominal_delay,
        })
    }

    pub fn total_events(&self) -> u64 {
        self.total_events
    }

    pub fn batch_size(&self) -> u64 {
        self.batch_size
    }

    pub fn batch_count(&self) -> u64 {
        self.batch_count
    }

    /// Spacing between batch starts that spreads the run over the target duration.
    pub fn nominal_delay(&self) -> Duration {
        self.nominal_delay
    }

    pub fn nominal_delay_ms(&self) -> f64 {
        self.nominal_delay.as_secs_f64() * 1000.0
    }

    /// Number of events in batch `index` (0-based). Only the last batch may be short.
    pub fn batch_len(&self, index: u64) -> u64 {
        let start = index.saturating_mul(self.batch_size);
        self.total_events.saturating_sub(start).min(self.batch_size)
    }

    pub fn is_last(&self, index: u64) -> bool {
        index.saturating_add(1) >= self.batch_count
    }

    /// Sizes of every batch, in dispatch order.
    pub fn batch_lens(&self) -> impl Iterator<Item = u64> + '_ {
        (0..self.batch_count).map(|i| self.batch_len(i))
    }

    /// Wait before the batch following `index`, given how long `index` itself took.
    ///
    /// Slow batches shorten the next wait down to zero; the deficit is not carried further.
    /// `None` after the final batch.
    pub fn delay_after(&self, index: u64, batch_elapsed: Duration) -> Option<Duration> {
        if self.is_last(index) {
            return None;
        }
        Some(self.nominal_delay.saturating_sub(batch_elapsed))
    }
}

/// Sleeps between batches according to a [`BatchPlan`].
#[derive(Debug, Clone, Copy)]
pub struct RatePacer {
    plan: BatchPlan,
}

impl RatePacer {
    pub fn new(plan: BatchPlan) -> Self {
        Self { plan }
    }

    pub fn plan(&self) -> &BatchPlan {
        &self.plan
    }

    /// Returns the time actually waited.
    pub async fn pace(&self, index: u64, batch_elapsed: Duration) -> Duration {
        match self.plan.delay_after(index, batch_elapsed) {
            Some(delay) if !delay.is_zero() => {
                tokio::time::sleep(delay).await;
                delay
            }
            _ => Duration::ZERO,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan(total: u64, batch: u64, secs: u64) -> BatchPlan {
        match BatchPlan::new(total, batch, Duration::from_secs(secs)) {
            Ok(p) => p,
            Err(err) => panic!("plan({total}, {batch}, {secs}) failed: {err}"),
        }
    }

    #[test]
    fn thousand_events_in_batches_of_hundred() {
        let p = plan(1000, 100, 10);
        assert_eq!(p.batch_count(), 10);
        assert_eq!(p.nominal_delay(), Duration::from_millis(1000));
    }

    #[test]
    fn reference_run_is_two_hundred_batches_fifty_ms_apart() {
        let p = plan(20_000, 100, 10);
        assert_eq!(p.batch_count(), 200);
        assert_eq!(p.nominal_delay(), Duration::from_millis(50));
        assert!((p.nominal_delay_ms() - 50.0).abs() < 1e-9);
    }

    #[test]
    fn batch_count_rounds_up_and_sizes_sum_to_total() {
        for total in [1u64, 7, 99, 100, 101, 250, 1001, 20_000] {
            for batch in [1u64, 3, 10, 100, 1000] {
                let p = plan(total, batch, 10);
                assert_eq!(p.batch_count(), total.div_ceil(batch), "total={total} batch={batch}");
                assert_eq!(p.batch_lens().sum::<u64>(), total, "total={total} batch={batch}");
                assert!(p.batch_lens().all(|n| n >= 1 && n <= batch));
            }
        }
    }

    #[test]
    fn only_last_batch_is_short() {
        let p = plan(250, 100, 1);
        let lens: Vec<u64> = p.batch_lens().collect();
        assert_eq!(lens, vec![100, 100, 50]);
    }

    #[test]
    fn rejects_non_positive_inputs() {
        assert!(matches!(
            BatchPlan::new(100, 0, Duration::from_secs(1)),
            Err(Error::InvalidBatchSize)
        ));
        assert!(matches!(
            BatchPlan::new(0, 10, Duration::from_secs(1)),
            Err(Error::InvalidTotalEvents)
        ));
    }

    #[test]
    fn drift_correction_shortens_next_wait() {
        let p = plan(1000, 100, 10);
        assert_eq!(
            p.delay_after(0, Duration::from_millis(300)),
            Some(Duration::from_millis(700))
        );
        assert_eq!(p.delay_after(0, Duration::ZERO), Some(Duration::from_secs(1)));
        // Over-budget batches never produce a negative wait.
        assert_eq!(p.delay_after(3, Duration::from_secs(5)), Some(Duration::ZERO));
    }

    #[test]
    fn no_wait_after_last_batch() {
        let p = plan(1000, 100, 10);
        assert!(p.is_last(9));
        assert_eq!(p.delay_after(9, Duration::ZERO), None);

        let total_wait: Duration = (0..p.batch_count())
            .filter_map(|i| p.delay_after(i, Duration::ZERO))
            .sum();
        assert_eq!(total_wait, p.nominal_delay() * 9);
    }

    #[tokio::test(start_paused = true)]
    async fn pacer_sleeps_remaining_budget() {
        let pacer = RatePacer::new(plan(300, 100, 3));

        let started = tokio::time::Instant::now();
        let waited = pacer.pace(0, Duration::from_millis(400)).await;
        assert_eq!(waited, Duration::from_millis(600));
        assert_eq!(started.elapsed(), Duration::from_millis(600));

        let waited = pacer.pace(2, Duration::ZERO).await;
        assert_eq!(waited, Duration::ZERO);
        assert_eq!(started.elapsed(), Duration::from_millis(600));
    }
}
