use std::time::Duration;

use serde::Serialize;

use crate::runner::RunState;

/// Results of one run, computed once dispatch and convergence are done.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Report {
    /// No metrics baseline: only the send side is measured.
    Degraded(DegradedReport),
    Full(FullReport),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DegradedReport {
    pub duration_secs: f64,
    pub events_sent: u64,
    pub events_failed: u64,
    /// Events/s; `None` when the dispatch phase took no measurable time.
    pub send_throughput: Option<f64>,
    pub target_rate: u64,
    /// Send throughput as a percentage of the target.
    pub percent_of_target: Option<f64>,
    pub target_met: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FullReport {
    pub duration_secs: f64,
    pub events_sent: u64,
    pub events_failed: u64,
    /// `None` when a sample lacks the counter.
    pub processed_delta: Option<u64>,
    pub written_delta: Option<u64>,
    pub send_throughput: Option<f64>,
    pub process_throughput: Option<f64>,
    pub write_throughput: Option<f64>,
    /// Processed delta over events sent, in percent.
    pub success_rate: Option<f64>,
    pub target_rate: u64,
    pub target_met: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_processing_ms: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lag: Option<i64>,
}

impl Report {
    pub fn target_met(&self) -> bool {
        match self {
            Self::Degraded(r) => r.target_met,
            Self::Full(r) => r.target_met,
        }
    }

    pub fn events_sent(&self) -> u64 {
        match self {
            Self::Degraded(r) => r.events_sent,
            Self::Full(r) => r.events_sent,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::Degraded(_))
    }
}

fn per_sec(count: u64, elapsed: Duration) -> Option<f64> {
    let secs = elapsed.as_secs_f64();
    (secs > 0.0).then(|| count as f64 / secs)
}

fn meets(throughput: Option<f64>, target_rate: u64) -> bool {
    throughput.is_some_and(|t| t >= target_rate as f64)
}

/// Builds the report for a finished run. Never fails; undefined ratios are `None`.
pub fn summarize(state: &RunState, target_rate: u64) -> Report {
    let elapsed = state.elapsed();
    let send_throughput = per_sec(state.events_sent, elapsed);

    let Some(baseline) = state.initial_metrics.as_ref() else {
        let percent_of_target =
            send_throughput.and_then(|t| (target_rate > 0).then(|| t / target_rate as f64 * 100.0));
        return Report::Degraded(DegradedReport {
            duration_secs: elapsed.as_secs_f64(),
            events_sent: state.events_sent,
            events_failed: state.events_failed,
            send_throughput,
            target_rate,
            percent_of_target,
            target_met: meets(send_throughput, target_rate),
        });
    };

    let latest = state.latest_metrics.as_ref().unwrap_or(baseline);
    let processed_delta = latest.received_since(baseline);
    let written_delta = latest.written_since(baseline);
    let process_throughput = processed_delta.and_then(|d| per_sec(d, elapsed));

    let success_rate = match (processed_delta, state.events_sent) {
        (Some(processed), sent) if sent > 0 => Some(processed as f64 / sent as f64 * 100.0),
        _ => None,
    };

    Report::Full(FullReport {
        duration_secs: elapsed.as_secs_f64(),
        events_sent: state.events_sent,
        events_failed: state.events_failed,
        processed_delta,
        written_delta,
        send_throughput,
        process_throughput,
        write_throughput: written_delta.and_then(|d| per_sec(d, elapsed)),
        success_rate,
        target_rate,
        target_met: meets(process_throughput, target_rate),
        avg_processing_ms: latest.avg_processing_ms,
        lag: latest.lag,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics_stream::MetricsSnapshot;
    use std::time::SystemTime;

    fn snapshot(received: u64, written: u64) -> MetricsSnapshot {
        MetricsSnapshot {
            received_total: Some(received),
            written_total: Some(written),
            ..MetricsSnapshot::default()
        }
    }

    fn state(sent: u64, failed: u64, elapsed: Duration) -> RunState {
        let start = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000);
        RunState {
            events_sent: sent,
            events_failed: failed,
            started_at: Some(start),
            ended_at: Some(start + elapsed),
            ..RunState::default()
        }
    }

    fn close(actual: Option<f64>, expected: f64) -> bool {
        actual.is_some_and(|a| (a - expected).abs() < 1e-6)
    }

    #[test]
    fn degraded_report_compares_send_rate() {
        let report = summarize(&state(19_800, 200, Duration::from_secs(10)), 2000);

        let Report::Degraded(r) = report else {
            panic!("expected degraded report, got {report:?}");
        };
        assert!(close(r.send_throughput, 1980.0));
        assert!(close(r.percent_of_target, 99.0));
        assert!(!r.target_met);
        assert_eq!(r.events_failed, 200);
    }

    #[test]
    fn full_report_from_deltas() {
        let mut s = state(20_000, 0, Duration::from_secs(10));
        s.initial_metrics = Some(snapshot(500, 480));
        s.latest_metrics = Some(MetricsSnapshot {
            avg_processing_ms: Some(0.8),
            lag: Some(3),
            ..snapshot(20_500, 20_380)
        });

        let report = summarize(&s, 2000);

        let Report::Full(r) = report else {
            panic!("expected full report, got {report:?}");
        };
        assert_eq!(r.processed_delta, Some(20_000));
        assert_eq!(r.written_delta, Some(19_900));
        assert!(close(r.send_throughput, 2000.0));
        assert!(close(r.process_throughput, 2000.0));
        assert!(close(r.write_throughput, 1990.0));
        assert!(close(r.success_rate, 100.0));
        assert!(r.target_met);
        assert_eq!(r.avg_processing_ms, Some(0.8));
        assert_eq!(r.lag, Some(3));
    }

    #[test]
    fn boundary_run_reports_ninety_five_percent() {
        let mut s = state(1000, 0, Duration::from_secs(1));
        s.initial_metrics = Some(snapshot(500, 500));
        s.latest_metrics = Some(snapshot(1450, 1400));

        let Report::Full(r) = summarize(&s, 2000) else {
            panic!("expected full report");
        };
        assert!(close(r.success_rate, 95.0));
        assert!(close(r.process_throughput, 950.0));
        assert!(!r.target_met);
    }

    #[test]
    fn zero_elapsed_is_undefined_not_infinite() {
        let report = summarize(&state(10, 0, Duration::ZERO), 2000);
        let Report::Degraded(r) = report else {
            panic!("expected degraded report");
        };
        assert_eq!(r.send_throughput, None);
        assert_eq!(r.percent_of_target, None);
        assert!(!r.target_met);
    }

    #[test]
    fn nothing_sent_leaves_success_rate_undefined() {
        let mut s = state(0, 100, Duration::from_secs(1));
        s.initial_metrics = Some(snapshot(0, 0));
        s.latest_metrics = Some(snapshot(0, 0));

        let Report::Full(r) = summarize(&s, 10) else {
            panic!("expected full report");
        };
        assert_eq!(r.success_rate, None);
        assert_eq!(r.processed_delta, Some(0));
    }

    #[test]
    fn serializes_with_mode_tag() -> anyhow::Result<()> {
        let report = summarize(&state(100, 0, Duration::from_secs(1)), 100);
        let json = serde_json::to_value(&report)?;
        assert_eq!(json["mode"], "degraded");
        assert_eq!(json["target_met"], true);
        assert!(json.get("processed_delta").is_none());
        Ok(())
    }
}
