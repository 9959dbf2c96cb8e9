use std::time::SystemTime;

use surge_http::HttpClient;
use tracing::{info, warn};

use crate::event::EventFactory;
use crate::metrics_stream::{MetricsStream, MetricsStreamClient, MetricsWatch, StreamFailure};
use crate::report::{Report, summarize};

use super::config::HarnessConfig;
use super::converge::{ConvergenceOutcome, await_convergence};
use super::dispatch::{Dispatcher, EventSink, HttpEventSink};
use super::error::Result;
use super::progress::{ProgressFn, ProgressUpdate};
use super::schedule::{BatchPlan, RatePacer};
use super::state::RunState;

#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub plan: BatchPlan,
    pub report: Report,
    pub convergence: ConvergenceOutcome,
    /// Why the metrics stream was unavailable, when it was requested but never connected.
    pub stream_failure: Option<StreamFailure>,
    pub state: RunState,
}

/// Computes the batch plan for `config`, validating it first.
pub fn plan_for(config: &HarnessConfig) -> Result<BatchPlan> {
    config.validate()?;
    BatchPlan::new(config.total_events(), config.batch_size, config.duration)
}

/// Runs the whole harness against the configured endpoints.
///
/// Only configuration errors fail the run; submission failures, an unavailable metrics stream
/// and a convergence timeout all end up in the returned outcome.
pub async fn run(config: &HarnessConfig, progress: Option<ProgressFn>) -> Result<RunOutcome> {
    let plan = plan_for(config)?;

    // `connect_timeout` bounds the wait for the first metrics sample, not ingest connects.
    let client = HttpClient::default();
    let sink = HttpEventSink::new(
        client.clone(),
        config.ingest_url.as_str(),
        config.request_timeout,
    );
    let stream = config
        .metrics_url
        .as_deref()
        .map(|url| MetricsStreamClient::connect(client, url, config.connect_timeout));

    run_with(config, plan, sink, stream, progress).await
}

/// Runs the harness with an explicit sink and an optional, already started, metrics stream.
pub async fn run_with<S: EventSink>(
    config: &HarnessConfig,
    plan: BatchPlan,
    sink: S,
    mut stream: Option<MetricsStream>,
    progress: Option<ProgressFn>,
) -> Result<RunOutcome> {
    let mut state = RunState::default();
    let mut stream_failure = None;

    if let Some(stream) = stream.as_mut() {
        state.initial_metrics = stream.wait_first_sample().await;
        if state.initial_metrics.is_none() {
            stream_failure = stream.failure();
            warn!(
                error = ?stream_failure,
                "metrics stream unavailable, continuing without processing metrics"
            );
        }
    }

    info!(
        total_events = plan.total_events(),
        batches = plan.batch_count(),
        batch_size = plan.batch_size(),
        delay_ms = plan.nominal_delay_ms(),
        "starting dispatch"
    );

    let dispatcher = Dispatcher::new(
        sink,
        EventFactory::new(config.event_type.clone(), config.session_pool),
    );
    let pacer = RatePacer::new(plan);

    state.started_at = Some(SystemTime::now());
    let dispatch_started = tokio::time::Instant::now();
    for index in 0..plan.batch_count() {
        let result = dispatcher.dispatch_generated(plan.batch_len(index)).await;
        state.record(&result);

        if let Some(progress) = progress.as_ref() {
            progress(ProgressUpdate::Batch {
                batch: index + 1,
                batches: plan.batch_count(),
                batch_succeeded: result.succeeded,
                batch_failed: result.failed,
                events_sent: state.events_sent,
                events_failed: state.events_failed,
                elapsed: dispatch_started.elapsed(),
            });
        }

        pacer.pace(index, result.elapsed).await;
    }
    state.ended_at = Some(SystemTime::now());

    info!(
        sent = state.events_sent,
        failed = state.events_failed,
        elapsed = ?state.elapsed(),
        "dispatch completed"
    );

    let watch = match stream.as_ref() {
        Some(stream) => stream.watch(),
        None => MetricsWatch::channel(None).1,
    };
    let convergence = await_convergence(
        state.initial_metrics.as_ref(),
        &watch,
        state.events_sent,
        &config.convergence,
        progress.as_ref(),
    )
    .await;

    state.latest_metrics = watch.latest();
    if let Some(stream) = stream {
        stream.close();
    }

    let report = summarize(&state, config.target_rate);
    Ok(RunOutcome {
        plan,
        report,
        convergence,
        stream_failure,
        state,
    })
}
