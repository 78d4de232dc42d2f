//! Logging and tracing setup for the sqlexec binary
//!
//! Console output always goes to stderr since stdout carries responses.
//! Optionally, JSON logs are written to a daily-rotated file.

use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Default filter directives; `RUST_LOG` takes precedence
    pub default_filter: String,

    /// Directory for JSON logs; no file output when `None`
    pub json_log_dir: Option<PathBuf>,

    /// Whether to include file/line information in console logs
    pub include_location: bool,

    /// Whether to log span open/close events
    pub enable_spans: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default_filter: "info".to_string(),
            json_log_dir: None,
            include_location: cfg!(debug_assertions),
            enable_spans: false,
        }
    }
}

impl LoggingConfig {
    pub fn from_service(config: &sqlexec_services::LoggingConfig) -> Self {
        Self {
            default_filter: config.filter.clone(),
            json_log_dir: config.json_log_dir.clone(),
            ..Self::default()
        }
    }

    /// Log everything at `debug`, including span open/close events
    pub fn verbose(mut self) -> Self {
        self.default_filter = "debug".to_string();
        self.enable_spans = true;
        self
    }
}

/// Initialize the logging system
///
/// The returned guard flushes the JSON writer when dropped and must be held
/// until the process exits.
pub fn init(config: LoggingConfig) -> anyhow::Result<Option<WorkerGuard>> {
    let span_events = if config.enable_spans {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let mut layers = Vec::new();

    let console_layer = fmt::layer()
        .with_target(true)
        .with_file(config.include_location)
        .with_line_number(config.include_location)
        .with_span_events(span_events.clone())
        .with_writer(std::io::stderr)
        .with_filter(env_filter(&config.default_filter)?)
        .boxed();
    layers.push(console_layer);

    let mut guard = None;
    if let Some(log_dir) = &config.json_log_dir {
        std::fs::create_dir_all(log_dir)?;

        let file_appender = tracing_appender::rolling::daily(log_dir, "sqlexec.log");
        let (non_blocking, worker_guard) = tracing_appender::non_blocking(file_appender);
        guard = Some(worker_guard);

        let json_layer = fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .with_span_events(span_events)
            .with_ansi(false)
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_writer(non_blocking)
            .with_filter(env_filter(&config.default_filter)?)
            .boxed();
        layers.push(json_layer);
    }

    tracing_subscriber::registry().with(layers).try_init()?;

    tracing::debug!(
        filter = %config.default_filter,
        json_log_dir = ?config.json_log_dir,
        "logging initialized"
    );

    Ok(guard)
}

/// `RUST_LOG` when set, otherwise the configured directives
fn env_filter(default_filter: &str) -> anyhow::Result<EnvFilter> {
    Ok(EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(default_filter))?)
}
