mod config;
mod converge;
mod dispatch;
mod error;
mod progress;
mod run;
mod schedule;
mod state;

pub use config::{
    ConvergenceConfig, DEFAULT_EVENT_TYPE, DEFAULT_INGEST_URL, DEFAULT_METRICS_URL, HarnessConfig,
};
pub use converge::{ConvergenceOutcome, await_convergence, required_processed};
pub use dispatch::{BatchResult, Dispatcher, EventSink, HttpEventSink, SubmitError};
pub use error::{Error, Result};
pub use progress::{ProgressFn, ProgressUpdate};
pub use run::{RunOutcome, plan_for, run, run_with};
pub use schedule::{BatchPlan, RatePacer};
pub use state::RunState;
