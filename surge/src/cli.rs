use clap::{Args, Parser, Subcommand};
use std::time::Duration;

use surge_core::runner::{DEFAULT_EVENT_TYPE, DEFAULT_INGEST_URL, DEFAULT_METRICS_URL};

fn parse_duration(input: &str) -> Result<Duration, String> {
    let s = input.trim();
    if s.is_empty() {
        return Err("duration cannot be empty (expected e.g. 10s, 250ms, 1m)".to_string());
    }

    let number_end = s
        .char_indices()
        .find(|(_, ch)| !ch.is_ascii_digit())
        .map_or(s.len(), |(idx, _)| idx);

    if number_end == 0 {
        return Err(format!(
            "invalid duration '{s}' (expected e.g. 10s, 250ms, 1m)"
        ));
    }

    let (number_str, unit_str) = s.split_at(number_end);
    let value: u64 = number_str
        .parse()
        .map_err(|_| format!("invalid duration '{s}' (expected e.g. 10s, 250ms, 1m)"))?;

    match unit_str.trim() {
        "" | "s" | "sec" | "secs" | "second" | "seconds" => Ok(Duration::from_secs(value)),
        "ms" | "msec" | "msecs" | "millisecond" | "milliseconds" => {
            Ok(Duration::from_millis(value))
        }
        "m" | "min" | "mins" | "minute" | "minutes" => {
            let secs = value
                .checked_mul(60)
                .ok_or_else(|| format!("duration '{s}' is too large"))?;
            Ok(Duration::from_secs(secs))
        }
        _ => Err(format!(
            "invalid duration '{s}' (expected e.g. 10s, 250ms, 1m)"
        )),
    }
}

fn parse_threshold(input: &str) -> Result<f64, String> {
    let v: f64 = input
        .trim()
        .parse()
        .map_err(|_| format!("invalid threshold '{input}' (expected a fraction, e.g. 0.95)"))?;
    if !v.is_finite() || v <= 0.0 || v > 1.0 {
        return Err(format!("threshold must be within (0, 1], got {v}"));
    }
    Ok(v)
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable header, progress bar and report.
    HumanReadable,
    /// Emit JSON progress lines (NDJSON) and a final summary line to stdout.
    Json,
}

#[derive(Debug, Parser)]
#[command(
    name = "surge",
    author,
    version,
    about = "Event ingestion load harness",
    long_about = "surge pushes synthetic events at an ingestion endpoint at a fixed target rate, follows the pipeline's live metrics stream and reports how far processing caught up with the injected load.",
    after_help = "Examples:\n  surge run\n  surge run --rate 5000 --duration 30s --batch-size 250\n  surge run --no-metrics --output json\n  SURGE_INGEST_URL=http://ingest:8081/events surge run --require-target"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run a load test against the ingestion pipeline
    Run(RunArgs),
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Target events per second
    #[arg(long, env = "SURGE_RATE", default_value_t = 2000)]
    pub rate: u64,

    /// Test duration (e.g. 10s, 250ms, 1m)
    #[arg(long, env = "SURGE_DURATION", value_parser = parse_duration, default_value = "10s")]
    pub duration: Duration,

    /// Total events to send (defaults to rate * duration)
    #[arg(long, env = "SURGE_EVENTS")]
    pub events: Option<u64>,

    /// Events submitted concurrently per batch
    #[arg(long, env = "SURGE_BATCH_SIZE", default_value_t = 100)]
    pub batch_size: u64,

    /// Ingest endpoint events are POSTed to
    #[arg(long, env = "SURGE_INGEST_URL", default_value = DEFAULT_INGEST_URL)]
    pub ingest_url: String,

    /// Server-sent events endpoint publishing the pipeline's counters
    #[arg(long, env = "SURGE_METRICS_URL", default_value = DEFAULT_METRICS_URL)]
    pub metrics_url: String,

    /// Do not subscribe to the metrics stream (send-side report only)
    #[arg(long)]
    pub no_metrics: bool,

    /// `eventType` of every generated event
    #[arg(long, default_value = DEFAULT_EVENT_TYPE)]
    pub event_type: String,

    /// Number of distinct session ids
    #[arg(long = "sessions", default_value_t = 1000)]
    pub sessions: u64,

    /// Fraction of sent events that must be processed to stop waiting
    #[arg(long, value_parser = parse_threshold, default_value_t = 0.95)]
    pub threshold: f64,

    /// Upper bound on the post-dispatch convergence wait
    #[arg(long, value_parser = parse_duration, default_value = "30s")]
    pub max_wait: Duration,

    /// Interval between convergence checks
    #[arg(long, value_parser = parse_duration, default_value = "500ms")]
    pub poll_interval: Duration,

    /// Fixed wait used when no metrics baseline is available
    #[arg(long, value_parser = parse_duration, default_value = "5s")]
    pub fallback_wait: Duration,

    /// Time allowed for the metrics stream to deliver its first sample
    #[arg(long, value_parser = parse_duration, default_value = "5s")]
    pub connect_timeout: Duration,

    /// Per-event request timeout (unbounded when omitted)
    #[arg(long, value_parser = parse_duration)]
    pub request_timeout: Option<Duration>,

    /// Exit with code 10 when the target rate is not met
    #[arg(long)]
    pub require_target: bool,

    /// Log at debug level (overridden by RUST_LOG)
    #[arg(long, short)]
    pub verbose: bool,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::HumanReadable)]
    pub output: OutputFormat,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_args(args: &[&str]) -> RunArgs {
        let parsed = Cli::try_parse_from(["surge", "run"].iter().chain(args));
        match parsed {
            Ok(cli) => match cli.command {
                Command::Run(args) => args,
            },
            Err(err) => panic!("failed to parse args: {err}"),
        }
    }

    #[test]
    fn parse_duration_accepts_common_units() {
        assert_eq!(parse_duration("250ms"), Ok(Duration::from_millis(250)));
        assert_eq!(parse_duration("10s"), Ok(Duration::from_secs(10)));
        assert_eq!(parse_duration("10"), Ok(Duration::from_secs(10)));
        assert_eq!(parse_duration("1m"), Ok(Duration::from_secs(60)));
    }

    #[test]
    fn parse_duration_rejects_invalid_values() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("abc").is_err());
        assert!(parse_duration("10x").is_err());
    }

    #[test]
    fn parse_threshold_bounds() {
        assert_eq!(parse_threshold("0.95"), Ok(0.95));
        assert_eq!(parse_threshold("1"), Ok(1.0));
        assert!(parse_threshold("0").is_err());
        assert!(parse_threshold("1.01").is_err());
        assert!(parse_threshold("NaN").is_err());
    }

    #[test]
    fn cli_defaults_match_reference_run() {
        let args = run_args(&[]);
        assert_eq!(args.rate, 2000);
        assert_eq!(args.duration, Duration::from_secs(10));
        assert_eq!(args.events, None);
        assert_eq!(args.batch_size, 100);
        assert_eq!(args.max_wait, Duration::from_secs(30));
        assert_eq!(args.poll_interval, Duration::from_millis(500));
        assert!(!args.no_metrics);
        assert!(matches!(args.output, OutputFormat::HumanReadable));
    }

    #[test]
    fn cli_parses_overrides() {
        let args = run_args(&[
            "--rate",
            "500",
            "--duration",
            "250ms",
            "--batch-size",
            "25",
            "--ingest-url",
            "http://127.0.0.1:9000/events",
            "--no-metrics",
            "--threshold",
            "0.9",
            "--request-timeout",
            "2s",
            "--require-target",
            "--output",
            "json",
        ]);

        assert_eq!(args.rate, 500);
        assert_eq!(args.duration, Duration::from_millis(250));
        assert_eq!(args.batch_size, 25);
        assert_eq!(args.ingest_url, "http://127.0.0.1:9000/events");
        assert!(args.no_metrics);
        assert_eq!(args.threshold, 0.9);
        assert_eq!(args.request_timeout, Some(Duration::from_secs(2)));
        assert!(args.require_target);
        assert!(matches!(args.output, OutputFormat::Json));
    }
}
