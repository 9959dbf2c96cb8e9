use serde::Serialize;
use std::io::Write as _;
use std::sync::Arc;

use surge_core::runner::{BatchPlan, HarnessConfig, ProgressFn, RunOutcome};
use surge_core::{ConvergenceOutcome, ProgressUpdate, Report};

use super::OutputFormatter;

pub(crate) struct JsonOutput;

impl OutputFormatter for JsonOutput {
    fn print_header(&self, cfg: &HarnessConfig, plan: &BatchPlan) {
        emit_json_line(&build_header_line(cfg, plan));
    }

    fn progress(&self) -> Option<ProgressFn> {
        Some(Arc::new(move |u| {
            let line = build_progress_line(&u);
            emit_json_line(&line);
        }))
    }

    fn print_summary(&self, outcome: &RunOutcome) -> anyhow::Result<()> {
        emit_json_line(&build_summary_line(outcome));
        Ok(())
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonHeaderLine<'a> {
    pub kind: &'static str,
    pub ingest_url: &'a str,
    pub metrics_url: Option<&'a str>,
    pub target_rate: u64,
    pub duration_secs: f64,
    pub total_events: u64,
    pub batch_size: u64,
    pub batch_count: u64,
    pub nominal_delay_ms: f64,
}

fn build_header_line<'a>(cfg: &'a HarnessConfig, plan: &BatchPlan) -> JsonHeaderLine<'a> {
    JsonHeaderLine {
        kind: "header",
        ingest_url: &cfg.ingest_url,
        metrics_url: cfg.metrics_url.as_deref(),
        target_rate: cfg.target_rate,
        duration_secs: cfg.duration.as_secs_f64(),
        total_events: plan.total_events(),
        batch_size: plan.batch_size(),
        batch_count: plan.batch_count(),
        nominal_delay_ms: plan.nominal_delay_ms(),
    }
}

#[derive(Debug, Serialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub(crate) enum JsonProgress {
    Dispatch {
        batch: u64,
        batches: u64,
        batch_succeeded: u64,
        batch_failed: u64,
        events_sent: u64,
        events_failed: u64,
        elapsed_ms: u64,
    },
    Convergence {
        poll: u64,
        processed: Option<u64>,
        required: u64,
        events_sent: u64,
        waited_ms: u64,
    },
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonProgressLine {
    pub kind: &'static str,
    #[serde(flatten)]
    pub progress: JsonProgress,
}

fn build_progress_line(u: &ProgressUpdate) -> JsonProgressLine {
    let progress = match *u {
        ProgressUpdate::Batch {
            batch,
            batches,
            batch_succeeded,
            batch_failed,
            events_sent,
            events_failed,
            elapsed,
        } => JsonProgress::Dispatch {
            batch,
            batches,
            batch_succeeded,
            batch_failed,
            events_sent,
            events_failed,
            elapsed_ms: elapsed.as_millis() as u64,
        },
        ProgressUpdate::Convergence {
            poll,
            processed,
            required,
            events_sent,
            waited,
        } => JsonProgress::Convergence {
            poll,
            processed,
            required,
            events_sent,
            waited_ms: waited.as_millis() as u64,
        },
    };

    JsonProgressLine {
        kind: "progress",
        progress,
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonSummaryLine<'a> {
    pub kind: &'static str,
    pub report: &'a Report,
    pub convergence: &'a ConvergenceOutcome,
    pub metrics_stream_error: Option<String>,
}

fn build_summary_line(outcome: &RunOutcome) -> JsonSummaryLine<'_> {
    JsonSummaryLine {
        kind: "summary",
        report: &outcome.report,
        convergence: &outcome.convergence,
        metrics_stream_error: outcome.stream_failure.as_ref().map(ToString::to_string),
    }
}

fn emit_json_line<T: Serialize>(line: &T) {
    let mut out = std::io::stdout().lock();
    if serde_json::to_writer(&mut out, line).is_ok() {
        let _ = writeln!(out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn progress_line_is_flat() -> anyhow::Result<()> {
        let line = build_progress_line(&ProgressUpdate::Batch {
            batch: 3,
            batches: 10,
            batch_succeeded: 99,
            batch_failed: 1,
            events_sent: 299,
            events_failed: 1,
            elapsed: Duration::from_millis(2_004),
        });

        let json = serde_json::to_value(&line)?;
        assert_eq!(json["kind"], "progress");
        assert_eq!(json["phase"], "dispatch");
        assert_eq!(json["batch"], 3);
        assert_eq!(json["elapsed_ms"], 2004);
        Ok(())
    }

    #[test]
    fn convergence_line_keeps_unknown_processed_as_null() -> anyhow::Result<()> {
        let line = build_progress_line(&ProgressUpdate::Convergence {
            poll: 1,
            processed: None,
            required: 950,
            events_sent: 1000,
            waited: Duration::ZERO,
        });

        let json = serde_json::to_value(&line)?;
        assert_eq!(json["phase"], "convergence");
        assert!(json["processed"].is_null());
        assert_eq!(json["required"], 950);
        Ok(())
    }
}
