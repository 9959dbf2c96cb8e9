//! Background subscription to the system under test's metrics feed.
//!
//! A single task owns the connection and is the only writer of the connection state and of
//! the latest snapshot. Readers get cheap, non-blocking access through [`MetricsWatch`].

mod snapshot;
mod sse;

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use surge_http::{HttpClient, HttpRequest};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, timeout_at};
use tracing::{debug, info, warn};

pub use snapshot::{MalformedSnapshot, MetricsSnapshot};
pub use sse::{SseDecoder, SseEvent};

/// Name of the server-sent event carrying a [`MetricsSnapshot`].
pub const METRICS_EVENT: &str = "metrics";

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum StreamState {
    Idle,
    Connecting,
    /// At least one valid snapshot was received. Never left, even if the feed later drops.
    Connected,
    Failed,
}

impl StreamState {
    pub fn is_settled(self) -> bool {
        matches!(self, Self::Connected | Self::Failed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StreamFailure {
    #[error("metrics stream answered {0}")]
    Status(u16),

    #[error("metrics stream transport error: {0}")]
    Transport(String),

    #[error("metrics stream closed before the first sample")]
    Closed,

    #[error("no metrics sample within {0:?}")]
    ConnectTimeout(Duration),
}

/// Read side of the latest-snapshot slot.
#[derive(Debug, Clone)]
pub struct MetricsWatch {
    rx: watch::Receiver<Option<MetricsSnapshot>>,
}

impl MetricsWatch {
    /// A publisher/reader pair; the publisher replaces the value on every new sample.
    pub fn channel(
        initial: Option<MetricsSnapshot>,
    ) -> (watch::Sender<Option<MetricsSnapshot>>, MetricsWatch) {
        let (tx, rx) = watch::channel(initial);
        (tx, MetricsWatch { rx })
    }

    pub fn latest(&self) -> Option<MetricsSnapshot> {
        self.rx.borrow().clone()
    }
}

pub struct MetricsStreamClient;

impl MetricsStreamClient {
    /// Starts the subscription in the background and returns immediately.
    ///
    /// The stream fails if it errors or produces no valid sample within `connect_timeout`.
    pub fn connect(client: HttpClient, url: &str, connect_timeout: Duration) -> MetricsStream {
        let (state_tx, state_rx) = watch::channel(StreamState::Idle);
        let (latest_tx, latest) = MetricsWatch::channel(None);
        let baseline = Arc::new(OnceLock::new());
        let failure = Arc::new(OnceLock::new());

        let feed = Feed {
            state_tx,
            latest_tx,
            baseline: baseline.clone(),
            failure: failure.clone(),
        };
        let task = tokio::spawn(feed.run(client, url.to_string(), connect_timeout));

        MetricsStream {
            state_rx,
            latest,
            baseline,
            failure,
            task: Some(task),
        }
    }
}

/// Handle to a running metrics subscription. Dropping it stops the subscription.
#[derive(Debug)]
pub struct MetricsStream {
    state_rx: watch::Receiver<StreamState>,
    latest: MetricsWatch,
    baseline: Arc<OnceLock<MetricsSnapshot>>,
    failure: Arc<OnceLock<StreamFailure>>,
    task: Option<JoinHandle<()>>,
}

impl MetricsStream {
    pub fn state(&self) -> StreamState {
        *self.state_rx.borrow()
    }

    pub fn latest(&self) -> Option<MetricsSnapshot> {
        self.latest.latest()
    }

    pub fn watch(&self) -> MetricsWatch {
        self.latest.clone()
    }

    /// The first valid snapshot, once connected.
    pub fn baseline(&self) -> Option<MetricsSnapshot> {
        self.baseline.get().cloned()
    }

    pub fn failure(&self) -> Option<StreamFailure> {
        self.failure.get().cloned()
    }

    /// Waits until the stream is connected or has failed; returns the baseline when connected.
    pub async fn wait_first_sample(&mut self) -> Option<MetricsSnapshot> {
        let _ = self.state_rx.wait_for(|s| s.is_settled()).await;
        self.baseline()
    }

    pub fn close(mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for MetricsStream {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

struct Feed {
    state_tx: watch::Sender<StreamState>,
    latest_tx: watch::Sender<Option<MetricsSnapshot>>,
    baseline: Arc<OnceLock<MetricsSnapshot>>,
    failure: Arc<OnceLock<StreamFailure>>,
}

impl Feed {
    async fn run(self, client: HttpClient, url: String, connect_timeout: Duration) {
        let deadline = Instant::now() + connect_timeout;
        self.state_tx.send_replace(StreamState::Connecting);
        debug!(url = %url, "connecting to metrics stream");

        let req = HttpRequest::get(&url)
            .header("accept", "text/event-stream")
            .header("cache-control", "no-cache");

        let mut stream = match timeout_at(deadline, client.open_stream(req)).await {
            Ok(Ok(stream)) if stream.is_success() => stream,
            Ok(Ok(stream)) => return self.fail(StreamFailure::Status(stream.status)),
            Ok(Err(err)) => return self.fail(StreamFailure::Transport(err.to_string())),
            Err(_) => return self.fail(StreamFailure::ConnectTimeout(connect_timeout)),
        };

        let mut decoder = SseDecoder::new();
        loop {
            let chunk = if self.is_connected() {
                stream.next_chunk().await
            } else {
                match timeout_at(deadline, stream.next_chunk()).await {
                    Ok(chunk) => chunk,
                    Err(_) => return self.fail(StreamFailure::ConnectTimeout(connect_timeout)),
                }
            };

            match chunk {
                Some(Ok(bytes)) => {
                    for event in decoder.push(&bytes) {
                        self.on_event(event);
                    }
                }
                Some(Err(err)) => return self.end(StreamFailure::Transport(err.to_string())),
                None => return self.end(StreamFailure::Closed),
            }
        }
    }

    fn is_connected(&self) -> bool {
        *self.state_tx.borrow() == StreamState::Connected
    }

    fn on_event(&self, event: SseEvent) {
        if event.event != METRICS_EVENT {
            debug!(event = %event.event, "ignoring non-metrics event");
            return;
        }

        let snapshot = match MetricsSnapshot::parse(&event.data) {
            Ok(s) => s,
            Err(err) => {
                warn!(error = %err, "ignoring malformed metrics sample");
                return;
            }
        };

        if !self.is_connected() {
            let _ = self.baseline.set(snapshot.clone());
            self.latest_tx.send_replace(Some(snapshot));
            self.state_tx.send_replace(StreamState::Connected);
            info!("metrics stream connected, baseline captured");
            return;
        }

        self.latest_tx.send_replace(Some(snapshot));
    }

    /// The feed stopped; before the first sample this is a failure, after it the last
    /// snapshot stays available.
    fn end(&self, reason: StreamFailure) {
        if self.is_connected() {
            warn!(reason = %reason, "metrics stream ended, keeping last sample");
            return;
        }
        self.fail(reason);
    }

    fn fail(&self, failure: StreamFailure) {
        warn!(error = %failure, "metrics stream unavailable");
        let _ = self.failure.set(failure);
        self.state_tx.send_replace(StreamState::Failed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use surge_testserver::{TestServer, TestServerOptions};

    async fn settle(stream: &mut MetricsStream) -> Option<MetricsSnapshot> {
        match tokio::time::timeout(Duration::from_secs(5), stream.wait_first_sample()).await {
            Ok(v) => v,
            Err(_) => panic!("stream did not settle, state={}", stream.state()),
        }
    }

    #[tokio::test]
    async fn captures_baseline_from_first_sample() -> anyhow::Result<()> {
        let server = TestServer::start_with(TestServerOptions {
            initial_received: 500,
            initial_written: 480,
            ..TestServerOptions::default()
        })
        .await?;

        let mut stream = MetricsStreamClient::connect(
            HttpClient::default(),
            &server.urls().metrics_stream,
            Duration::from_secs(2),
        );
        let baseline = settle(&mut stream).await;

        assert_eq!(stream.state(), StreamState::Connected);
        let baseline = baseline.ok_or_else(|| anyhow::anyhow!("missing baseline"))?;
        assert_eq!(baseline.received_total, Some(500));
        assert_eq!(baseline.written_total, Some(480));
        assert!(stream.latest().is_some());
        assert!(stream.failure().is_none());

        stream.close();
        server.shutdown().await;
        Ok(())
    }

    #[tokio::test]
    async fn malformed_samples_are_skipped() -> anyhow::Result<()> {
        let server = TestServer::start_with(TestServerOptions {
            malformed_samples: 3,
            metrics_interval: Duration::from_millis(20),
            ..TestServerOptions::default()
        })
        .await?;

        let mut stream = MetricsStreamClient::connect(
            HttpClient::default(),
            &server.urls().metrics_stream,
            Duration::from_secs(2),
        );
        let baseline = settle(&mut stream).await;

        assert_eq!(stream.state(), StreamState::Connected);
        assert!(baseline.is_some());
        assert!(server.stats().samples_total() >= 4);

        stream.close();
        server.shutdown().await;
        Ok(())
    }

    #[tokio::test]
    async fn never_valid_stream_times_out() -> anyhow::Result<()> {
        let server = TestServer::start_with(TestServerOptions {
            malformed_samples: u64::MAX,
            metrics_interval: Duration::from_millis(20),
            ..TestServerOptions::default()
        })
        .await?;

        let mut stream = MetricsStreamClient::connect(
            HttpClient::default(),
            &server.urls().metrics_stream,
            Duration::from_millis(300),
        );
        let baseline = settle(&mut stream).await;

        assert!(baseline.is_none());
        assert_eq!(stream.state(), StreamState::Failed);
        assert_eq!(
            stream.failure(),
            Some(StreamFailure::ConnectTimeout(Duration::from_millis(300)))
        );
        assert!(stream.latest().is_none());

        server.shutdown().await;
        Ok(())
    }

    #[tokio::test]
    async fn missing_endpoint_fails() -> anyhow::Result<()> {
        let server = TestServer::start_with(TestServerOptions {
            metrics_enabled: false,
            ..TestServerOptions::default()
        })
        .await?;

        let mut stream = MetricsStreamClient::connect(
            HttpClient::default(),
            &server.urls().metrics_stream,
            Duration::from_secs(2),
        );
        assert!(settle(&mut stream).await.is_none());
        assert_eq!(stream.state(), StreamState::Failed);
        assert_eq!(stream.failure(), Some(StreamFailure::Status(404)));

        server.shutdown().await;
        Ok(())
    }

    #[tokio::test]
    async fn unreachable_endpoint_fails() {
        let mut stream = MetricsStreamClient::connect(
            HttpClient::new(Some(Duration::from_millis(200))),
            "http://127.0.0.1:1/metrics/stream",
            Duration::from_secs(2),
        );
        assert!(settle(&mut stream).await.is_none());
        assert_eq!(stream.state(), StreamState::Failed);
        assert!(matches!(stream.failure(), Some(StreamFailure::Transport(_))));
    }

    #[tokio::test]
    async fn keeps_last_sample_after_stream_ends() -> anyhow::Result<()> {
        let server = TestServer::start_with(TestServerOptions {
            metrics_interval: Duration::from_millis(20),
            close_after_samples: Some(3),
            ..TestServerOptions::default()
        })
        .await?;

        let mut stream = MetricsStreamClient::connect(
            HttpClient::default(),
            &server.urls().metrics_stream,
            Duration::from_secs(2),
        );
        assert!(settle(&mut stream).await.is_some());

        // Three samples at 20ms intervals; the response body ends right after the last one.
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(server.stats().samples_total(), 3);

        let last = stream.latest();
        assert!(last.is_some());
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(stream.state(), StreamState::Connected);
        assert!(stream.failure().is_none());
        assert_eq!(stream.latest(), last);
        assert_eq!(server.stats().samples_total(), 3);

        stream.close();
        server.shutdown().await;
        Ok(())
    }

    #[test]
    fn watch_reflects_latest_replacement() {
        let (tx, watch) = MetricsWatch::channel(None);
        assert!(watch.latest().is_none());

        tx.send_replace(Some(MetricsSnapshot {
            received_total: Some(1),
            ..MetricsSnapshot::default()
        }));
        tx.send_replace(Some(MetricsSnapshot {
            received_total: Some(2),
            ..MetricsSnapshot::default()
        }));

        assert_eq!(watch.latest().and_then(|s| s.received_total), Some(2));
    }
}
