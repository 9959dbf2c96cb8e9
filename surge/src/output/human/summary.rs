use std::fmt::Write as _;

use surge_core::runner::RunOutcome;
use surge_core::{ConvergenceOutcome, DegradedReport, FullReport, Report};

use super::format::*;

pub(crate) fn render(outcome: &RunOutcome) -> String {
    let mut out = String::new();

    match &outcome.report {
        Report::Degraded(r) => render_degraded(r, &mut out),
        Report::Full(r) => render_full(r, &mut out),
    }

    out.push('\n');
    render_convergence(&outcome.convergence, &mut out);
    if let Some(failure) = &outcome.stream_failure {
        writeln!(out, "metrics stream: {failure}").ok();
    }

    out
}

fn render_degraded(r: &DegradedReport, out: &mut String) {
    out.push_str("load test results (send side only, no metrics)\n");
    writeln!(out, "  duration: {}", format_secs(r.duration_secs)).ok();
    writeln!(
        out,
        "  events: sent {} (failed {})",
        r.events_sent, r.events_failed
    )
    .ok();
    writeln!(
        out,
        "  send rate: {} events/s",
        format_rate(r.send_throughput)
    )
    .ok();

    out.push('\n');
    out.push_str("target\n");
    writeln!(out, "  target: {} events/s", r.target_rate).ok();
    writeln!(
        out,
        "  {}: {} events/s ({} of target)",
        if r.target_met { "met" } else { "missed" },
        format_rate(r.send_throughput),
        format_pct(r.percent_of_target)
    )
    .ok();
}

fn render_full(r: &FullReport, out: &mut String) {
    out.push_str("load test results\n");
    writeln!(out, "  duration: {}", format_secs(r.duration_secs)).ok();
    writeln!(
        out,
        "  events: sent {} (failed {}) processed {} written {}",
        r.events_sent,
        r.events_failed,
        format_count(r.processed_delta),
        format_count(r.written_delta)
    )
    .ok();

    out.push('\n');
    out.push_str("throughput\n");
    writeln!(out, "  send: {} events/s", format_rate(r.send_throughput)).ok();
    writeln!(
        out,
        "  process: {} events/s",
        format_rate(r.process_throughput)
    )
    .ok();
    writeln!(out, "  write: {} events/s", format_rate(r.write_throughput)).ok();
    if let Some(avg) = r.avg_processing_ms {
        writeln!(out, "  avg processing: {avg:.2}ms").ok();
    }
    if let Some(lag) = r.lag {
        writeln!(out, "  lag: {lag}").ok();
    }

    out.push('\n');
    out.push_str("target\n");
    writeln!(out, "  target: {} events/s", r.target_rate).ok();
    writeln!(
        out,
        "  achieved: {} events/s",
        format_rate(r.process_throughput)
    )
    .ok();
    writeln!(out, "  success rate: {}", format_pct(r.success_rate)).ok();
    writeln!(
        out,
        "  target met: {}",
        if r.target_met { "yes" } else { "no" }
    )
    .ok();
}

fn render_convergence(c: &ConvergenceOutcome, out: &mut String) {
    match c {
        ConvergenceOutcome::Reached { processed, waited } => writeln!(
            out,
            "convergence: reached ({processed} processed after {})",
            format_duration(*waited)
        ),
        ConvergenceOutcome::TimedOut { processed, waited } => writeln!(
            out,
            "convergence: timed out after {} ({} processed)",
            format_duration(*waited),
            format_count(*processed)
        ),
        ConvergenceOutcome::Skipped { waited } => writeln!(
            out,
            "convergence: skipped, waited {} without metrics",
            format_duration(*waited)
        ),
    }
    .ok();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use surge_core::runner::{BatchPlan, RunState};

    fn outcome(report: Report, convergence: ConvergenceOutcome) -> RunOutcome {
        let plan = match BatchPlan::new(1000, 100, Duration::from_secs(1)) {
            Ok(p) => p,
            Err(err) => panic!("invalid plan: {err}"),
        };
        RunOutcome {
            plan,
            report,
            convergence,
            stream_failure: None,
            state: RunState::default(),
        }
    }

    #[test]
    fn degraded_report_shows_percent_of_target() {
        let out = render(&outcome(
            Report::Degraded(DegradedReport {
                duration_secs: 10.0,
                events_sent: 19_800,
                events_failed: 200,
                send_throughput: Some(1980.0),
                target_rate: 2000,
                percent_of_target: Some(99.0),
                target_met: false,
            }),
            ConvergenceOutcome::Skipped {
                waited: Duration::from_secs(5),
            },
        ));

        assert!(out.contains("send rate: 1980 events/s"), "{out}");
        assert!(out.contains("missed: 1980 events/s (99.0% of target)"), "{out}");
        assert!(out.contains("convergence: skipped, waited 5.0s"), "{out}");
    }

    #[test]
    fn full_report_renders_undefined_values() {
        let out = render(&outcome(
            Report::Full(FullReport {
                duration_secs: 0.0,
                events_sent: 0,
                events_failed: 10,
                processed_delta: None,
                written_delta: Some(0),
                send_throughput: None,
                process_throughput: None,
                write_throughput: None,
                success_rate: None,
                target_rate: 2000,
                target_met: false,
                avg_processing_ms: None,
                lag: None,
            }),
            ConvergenceOutcome::TimedOut {
                processed: None,
                waited: Duration::from_secs(30),
            },
        ));

        assert!(out.contains("processed n/a written 0"), "{out}");
        assert!(out.contains("success rate: n/a"), "{out}");
        assert!(out.contains("target met: no"), "{out}");
        assert!(!out.contains("lag:"), "{out}");
    }
}
