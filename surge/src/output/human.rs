use std::sync::Arc;

mod format;
mod progress;
mod summary;

use format::{format_count, format_duration, format_rate};
use progress::HumanProgress;
use summary::render;

use surge_core::ProgressUpdate;
use surge_core::runner::{BatchPlan, HarnessConfig, ProgressFn, RunOutcome};

use super::OutputFormatter;

pub(crate) struct HumanReadableOutput {
    progress: Arc<HumanProgress>,
}

impl HumanReadableOutput {
    pub(crate) fn new() -> Self {
        Self {
            progress: Arc::new(HumanProgress::new()),
        }
    }
}

impl OutputFormatter for HumanReadableOutput {
    fn print_header(&self, cfg: &HarnessConfig, plan: &BatchPlan) {
        println!("ingest: {}", cfg.ingest_url);
        match &cfg.metrics_url {
            Some(url) => println!("metrics: {url}"),
            None => println!("metrics: disabled"),
        }
        println!(
            "target: {} events/s for {}",
            cfg.target_rate,
            format_duration(cfg.duration)
        );
        println!(
            "events: {} in {} batches of {} ({:.2}ms apart)",
            plan.total_events(),
            plan.batch_count(),
            plan.batch_size(),
            plan.nominal_delay_ms()
        );
        println!();
    }

    fn progress(&self) -> Option<ProgressFn> {
        let progress = self.progress.clone();

        Some(Arc::new(move |u| match u {
            ProgressUpdate::Batch {
                batch,
                batches,
                events_sent,
                events_failed,
                elapsed,
                ..
            } => {
                let secs = elapsed.as_secs_f64();
                let rate = (secs > 0.0).then(|| events_sent as f64 / secs);
                progress.dispatch(
                    batch,
                    batches,
                    format!(
                        "sent={events_sent} failed={events_failed} rate={}/s elapsed={}",
                        format_rate(rate),
                        format_duration(elapsed)
                    ),
                );
            }
            ProgressUpdate::Convergence {
                processed,
                required,
                events_sent,
                waited,
                ..
            } => {
                progress.converge(format!(
                    "processed={}/{required} sent={events_sent} waited={}",
                    format_count(processed),
                    format_duration(waited)
                ));
            }
        }))
    }

    fn print_summary(&self, outcome: &RunOutcome) -> anyhow::Result<()> {
        self.progress.finish();
        print!("{}", render(outcome));
        Ok(())
    }
}
