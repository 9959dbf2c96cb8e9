#![forbid(unsafe_code)]

mod event;
mod report;

pub mod metrics_stream;
pub mod runner;

pub use event::{EventFactory, SyntheticEvent};
pub use metrics_stream::{
    MetricsSnapshot, MetricsStream, MetricsStreamClient, MetricsWatch, StreamFailure, StreamState,
};
pub use report::{DegradedReport, FullReport, Report, summarize};
pub use runner::{
    ConvergenceConfig, ConvergenceOutcome, Error, HarnessConfig, ProgressFn, ProgressUpdate,
    Result, RunOutcome,
};
