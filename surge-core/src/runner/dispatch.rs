use std::future::Future;
use std::time::Duration;

use bytes::Bytes;
use futures_util::future::join_all;
use surge_http::{HttpClient, HttpRequest};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::event::{EventFactory, SyntheticEvent};

#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error("failed to encode event: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("ingest endpoint answered {0}")]
    Status(u16),

    #[error(transparent)]
    Transport(#[from] surge_http::Error),
}

impl SubmitError {
    /// Short label for logs and error breakdowns.
    pub fn kind(&self) -> String {
        match self {
            Self::Encode(_) => "encode".to_string(),
            Self::Status(status) => format!("status_{status}"),
            Self::Transport(err) => err.transport_error_kind().to_string(),
        }
    }
}

/// Where events are submitted. Each call is one attempt; implementations must not retry.
pub trait EventSink: Send + Sync {
    fn submit(
        &self,
        event: SyntheticEvent,
    ) -> impl Future<Output = Result<(), SubmitError>> + Send;
}

/// Posts events as JSON to the ingest endpoint; any 2xx counts as accepted.
#[derive(Debug, Clone)]
pub struct HttpEventSink {
    client: HttpClient,
    url: String,
    timeout: Option<Duration>,
}

impl HttpEventSink {
    pub fn new(client: HttpClient, url: impl Into<String>, timeout: Option<Duration>) -> Self {
        Self {
            client,
            url: url.into(),
            timeout,
        }
    }
}

impl EventSink for HttpEventSink {
    async fn submit(&self, event: SyntheticEvent) -> Result<(), SubmitError> {
        let body = Bytes::from(serde_json::to_vec(&event)?);
        let req = HttpRequest::post_json(&self.url, body).timeout(self.timeout);

        let res = self.client.request(req).await?;
        if res.is_success() {
            Ok(())
        } else {
            Err(SubmitError::Status(res.status))
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BatchResult {
    pub succeeded: u64,
    pub failed: u64,
    pub elapsed: Duration,
}

impl BatchResult {
    pub fn total(&self) -> u64 {
        self.succeeded.saturating_add(self.failed)
    }
}

/// Fires a batch of submissions at once and waits for all of them.
#[derive(Debug, Clone)]
pub struct Dispatcher<S> {
    sink: S,
    factory: EventFactory,
}

impl<S: EventSink> Dispatcher<S> {
    pub fn new(sink: S, factory: EventFactory) -> Self {
        Self { sink, factory }
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn factory(&self) -> &EventFactory {
        &self.factory
    }

    /// Submits every event concurrently and returns once all of them resolved.
    ///
    /// Individual failures are counted, never propagated.
    pub async fn dispatch_batch(&self, events: Vec<SyntheticEvent>) -> BatchResult {
        let started = Instant::now();
        let outcomes = join_all(events.into_iter().map(|event| self.sink.submit(event))).await;

        let mut result = BatchResult::default();
        let mut first_error: Option<String> = None;
        for outcome in outcomes {
            match outcome {
                Ok(()) => result.succeeded += 1,
                Err(err) => {
                    debug!(error = %err, kind = %err.kind(), "event submission failed");
                    if first_error.is_none() {
                        first_error = Some(err.to_string());
                    }
                    result.failed += 1;
                }
            }
        }
        result.elapsed = started.elapsed();

        if let Some(first_error) = first_error {
            warn!(
                failed = result.failed,
                total = result.total(),
                first_error = %first_error,
                "batch had failed submissions"
            );
        }

        result
    }

    /// Generates `count` fresh events and dispatches them as one batch.
    pub async fn dispatch_generated(&self, count: u64) -> BatchResult {
        let events = (0..count).map(|_| self.factory.next_event()).collect();
        self.dispatch_batch(events).await
    }
}
