use anyhow::Context as _;

use crate::cli::RunArgs;
use crate::exit_codes::ExitCode;
use crate::output;
use crate::run_error::RunError;

use surge_core::runner::{self, ConvergenceConfig, HarnessConfig};

pub async fn run(args: RunArgs) -> Result<ExitCode, RunError> {
    let out = output::formatter(args.output);
    let cfg = harness_config(&args);

    let plan = runner::plan_for(&cfg)
        .context("invalid run configuration")
        .map_err(RunError::InvalidInput)?;

    out.print_header(&cfg, &plan);

    let outcome = runner::run(&cfg, out.progress())
        .await
        .context("load test failed")
        .map_err(RunError::RuntimeError)?;

    out.print_summary(&outcome)
        .map_err(RunError::RuntimeError)?;

    Ok(ExitCode::from_target(
        outcome.report.target_met(),
        args.require_target,
    ))
}

pub(crate) fn harness_config(args: &RunArgs) -> HarnessConfig {
    HarnessConfig {
        target_rate: args.rate,
        duration: args.duration,
        total_events: args.events,
        batch_size: args.batch_size,
        ingest_url: args.ingest_url.clone(),
        metrics_url: (!args.no_metrics).then(|| args.metrics_url.clone()),
        event_type: args.event_type.clone(),
        session_pool: args.sessions,
        convergence: ConvergenceConfig {
            threshold: args.threshold,
            max_wait: args.max_wait,
            poll_interval: args.poll_interval,
            fallback_wait: args.fallback_wait,
        },
        connect_timeout: args.connect_timeout,
        request_timeout: args.request_timeout,
    }
}
