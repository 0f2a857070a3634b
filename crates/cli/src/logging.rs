//! Structured logging for the CLI.
//!
//! Set `SPECEDIT_LOG_FORMAT=json` for JSON logs, anything else gives
//! pretty human-readable output. `RUST_LOG` controls log levels and takes
//! precedence over the configured level (default: info).
//!
//! Logs go to stderr so they never mix with command output on stdout.

use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

pub const LOG_FORMAT_ENV: &str = "SPECEDIT_LOG_FORMAT";

/// Log format mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Pretty-printed human-readable logs (default).
    Pretty,
    /// JSON-formatted logs for log aggregation.
    Json,
}

impl LogFormat {
    /// Detect log format from environment.
    pub fn from_env() -> Self {
        Self::parse(&std::env::var(LOG_FORMAT_ENV).unwrap_or_default())
    }

    pub fn parse(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "json" => Self::Json,
            _ => Self::Pretty,
        }
    }
}

/// Initialize logging with the format from the environment.
pub fn init(level: Option<&str>) -> anyhow::Result<()> {
    init_with_level_and_format(level, LogFormat::from_env())
}

/// Initialize logging with an explicit level and format.
///
/// A second initialization fails; callers that may initialize twice (tests)
/// should ignore the error.
pub fn init_with_level_and_format(level: Option<&str>, format: LogFormat) -> anyhow::Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.unwrap_or("info")));

    let fmt_layer: Box<dyn tracing_subscriber::Layer<_> + Send + Sync> = match format {
        LogFormat::Pretty => Box::new(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false),
        ),
        LogFormat::Json => Box::new(
            fmt::layer()
                .json()
                .with_writer(std::io::stderr)
                .with_span_events(FmtSpan::CLOSE)
                .with_current_span(true)
                .with_target(true)
                .with_file(true)
                .with_line_number(true),
        ),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("logging subscriber init failed: {e}"))
}
