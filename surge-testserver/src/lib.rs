use std::convert::Infallible;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::time::Duration;
use tokio_stream::StreamExt as _;
use tokio_stream::wrappers::IntervalStream;

pub const PATH_EVENTS: &str = "/events";
pub const PATH_METRICS_STREAM: &str = "/metrics/stream";

/// How accepted events show up in the published counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Processing {
    /// Every accepted event is immediately counted as received and written.
    #[default]
    Immediate,
    /// Events are accepted but the counters never move.
    Stalled,
}

#[derive(Debug, Clone)]
pub struct TestServerOptions {
    pub metrics_interval: Duration,
    /// When false, `/metrics/stream` answers 404.
    pub metrics_enabled: bool,
    /// Emit this many non-JSON `metrics` samples before the first valid one.
    pub malformed_samples: u64,
    /// End each metrics response after this many samples.
    pub close_after_samples: Option<u64>,
    /// Reject every n-th ingest request with 503.
    pub reject_every: Option<u64>,
    pub processing: Processing,
    /// Counter values already present before the run (non-zero baselines).
    pub initial_received: u64,
    pub initial_written: u64,
}

impl Default for TestServerOptions {
    fn default() -> Self {
        Self {
            metrics_interval: Duration::from_millis(100),
            metrics_enabled: true,
            malformed_samples: 0,
            close_after_samples: None,
            reject_every: None,
            processing: Processing::Immediate,
            initial_received: 0,
            initial_written: 0,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TestServerStats {
    requests_total: Arc<AtomicU64>,
    accepted_total: Arc<AtomicU64>,
    rejected_total: Arc<AtomicU64>,
    received_total: Arc<AtomicU64>,
    written_total: Arc<AtomicU64>,
    saw_json_content_type: Arc<AtomicU64>,
    samples_total: Arc<AtomicU64>,
}

impl TestServerStats {
    fn with_initial(received: u64, written: u64) -> Self {
        let stats = Self::default();
        stats.received_total.store(received, Ordering::Relaxed);
        stats.written_total.store(written, Ordering::Relaxed);
        stats
    }

    /// Returns the 1-based index of this request.
    fn inc_requests_total(&self) -> u64 {
        self.requests_total.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn inc_saw_json_content_type(&self) {
        self.saw_json_content_type.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns the 0-based index of this sample.
    fn inc_samples_total(&self) -> u64 {
        self.samples_total.fetch_add(1, Ordering::Relaxed)
    }

    pub fn requests_total(&self) -> u64 {
        self.requests_total.load(Ordering::Relaxed)
    }

    pub fn accepted_total(&self) -> u64 {
        self.accepted_total.load(Ordering::Relaxed)
    }

    pub fn rejected_total(&self) -> u64 {
        self.rejected_total.load(Ordering::Relaxed)
    }

    pub fn received_total(&self) -> u64 {
        self.received_total.load(Ordering::Relaxed)
    }

    pub fn written_total(&self) -> u64 {
        self.written_total.load(Ordering::Relaxed)
    }

    pub fn saw_json_content_type(&self) -> u64 {
        self.saw_json_content_type.load(Ordering::Relaxed)
    }

    pub fn samples_total(&self) -> u64 {
        self.samples_total.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone)]
pub struct TestServerUrls {
    pub base_url: String,
    pub events: String,
    pub metrics_stream: String,
}

impl TestServerUrls {
    pub fn new(base_url: String) -> Self {
        Self {
            events: format!("{base_url}{PATH_EVENTS}"),
            metrics_stream: format!("{base_url}{PATH_METRICS_STREAM}"),
            base_url,
        }
    }
}

#[derive(Debug, Clone)]
struct AppState {
    stats: TestServerStats,
    options: Arc<TestServerOptions>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IngestEvent {
    session_id: String,
    event_type: String,
    payload: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct MetricsSample {
    // The processor publishes its counters as doubles.
    received_total: f64,
    written_total: f64,
    avg_processing_ms: f64,
    lag: i64,
    ts: String,
}

async fn handle_events(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    let n = state.stats.inc_requests_total();

    if headers
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.to_ascii_lowercase().starts_with("application/json"))
    {
        state.stats.inc_saw_json_content_type();
    }

    let event: IngestEvent = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(_) => return StatusCode::BAD_REQUEST,
    };
    if event.session_id.is_empty() || event.event_type.is_empty() || event.payload.is_empty() {
        return StatusCode::BAD_REQUEST;
    }

    if state.options.reject_every.is_some_and(|k| k > 0 && n % k == 0) {
        state.stats.rejected_total.fetch_add(1, Ordering::Relaxed);
        return StatusCode::SERVICE_UNAVAILABLE;
    }

    state.stats.accepted_total.fetch_add(1, Ordering::Relaxed);
    if state.options.processing == Processing::Immediate {
        state.stats.received_total.fetch_add(1, Ordering::Relaxed);
        state.stats.written_total.fetch_add(1, Ordering::Relaxed);
    }

    StatusCode::ACCEPTED
}

fn metrics_event(state: &AppState) -> Event {
    let idx = state.stats.inc_samples_total();
    if idx < state.options.malformed_samples {
        return Event::default().event("metrics").data("not-json");
    }

    let sample = MetricsSample {
        received_total: state.stats.received_total() as f64,
        written_total: state.stats.written_total() as f64,
        avg_processing_ms: 0.5,
        lag: 0,
        ts: humantime::format_rfc3339_millis(SystemTime::now()).to_string(),
    };

    match serde_json::to_string(&sample) {
        Ok(data) => Event::default().event("metrics").data(data),
        Err(_) => Event::default().event("metrics").data("encode error"),
    }
}

async fn handle_metrics_stream(State(state): State<AppState>) -> Response {
    if !state.options.metrics_enabled {
        return StatusCode::NOT_FOUND.into_response();
    }

    let limit = state
        .options
        .close_after_samples
        .map_or(usize::MAX, |n| usize::try_from(n).unwrap_or(usize::MAX));
    let interval = tokio::time::interval(state.options.metrics_interval);
    let stream = IntervalStream::new(interval)
        .take(limit)
        .map(move |_| Ok::<_, Infallible>(metrics_event(&state)));

    Sse::new(stream)
        .keep_alive(KeepAlive::default())
        .into_response()
}

pub fn router(stats: TestServerStats, options: TestServerOptions) -> Router {
    let state = AppState {
        stats,
        options: Arc::new(options),
    };

    Router::new()
        .route(PATH_EVENTS, post(handle_events))
        .route(PATH_METRICS_STREAM, get(handle_metrics_stream))
        .with_state(state)
}

pub struct TestServer {
    urls: TestServerUrls,
    stats: TestServerStats,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl TestServer {
    pub async fn start() -> std::io::Result<Self> {
        Self::start_with(TestServerOptions::default()).await
    }

    pub async fn start_with(options: TestServerOptions) -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let stats = TestServerStats::with_initial(options.initial_received, options.initial_written);

        let app = router(stats.clone(), options);

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let serve = axum::serve(listener, app).with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            });
            let _ = serve.await;
        });

        let urls = TestServerUrls::new(format!("http://{addr}"));

        Ok(Self {
            urls,
            stats,
            shutdown_tx: Some(shutdown_tx),
            task: Some(task),
        })
    }

    pub fn urls(&self) -> &TestServerUrls {
        &self.urls
    }

    pub fn stats(&self) -> &TestServerStats {
        &self.stats
    }

    /// Stops accepting connections. Open metrics streams are aborted rather than drained.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        if let Some(mut task) = self.task.take() {
            // SSE responses never finish on their own, so graceful shutdown can wait forever.
            if tokio::time::timeout(Duration::from_millis(200), &mut task)
                .await
                .is_err()
            {
                task.abort();
            }
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
