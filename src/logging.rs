//! Structured logging configuration using tracing
//!
//! Logs always go to stderr; stdout carries nothing but task results.
//! Every event emitted while a run is in flight carries the enclosing
//! `dispatch` span (its `run_id`) and, inside a session, the `task` span
//! naming the task id and host.

use std::io::IsTerminal;
use tracing::{Level, Subscriber};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::FmtSubscriber;

/// Log level configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => Level::ERROR,
            LogLevel::Warn => Level::WARN,
            LogLevel::Info => Level::INFO,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Trace => Level::TRACE,
        }
    }
}

impl From<&str> for LogLevel {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "error" => LogLevel::Error,
            "warn" | "warning" => LogLevel::Warn,
            "debug" => LogLevel::Debug,
            "trace" => LogLevel::Trace,
            _ => LogLevel::Info,
        }
    }
}

/// Log line layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// One JSON object per event, with the current span flattened in
    Json,
    /// Human-readable lines prefixed with the span chain
    Pretty,
}

impl From<&str> for LogFormat {
    fn from(s: &str) -> Self {
        if s.eq_ignore_ascii_case("json") {
            LogFormat::Json
        } else {
            LogFormat::Pretty
        }
    }
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    pub level: LogLevel,
    pub format: LogFormat,
    /// Colour escapes in pretty output
    pub ansi: bool,
}

impl LogConfig {
    /// Colour is enabled only when stderr is a terminal.
    pub fn new(level: LogLevel, format: LogFormat) -> Self {
        Self {
            level,
            format,
            ansi: std::io::stderr().is_terminal(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self::new(LogLevel::Info, LogFormat::Pretty)
    }
}

/// Build the subscriber for `config`, writing through `writer`.
pub fn build_subscriber<W>(config: &LogConfig, writer: W) -> Box<dyn Subscriber + Send + Sync>
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let builder = FmtSubscriber::builder()
        .with_max_level(Level::from(config.level))
        .with_writer(writer);

    match config.format {
        LogFormat::Json => Box::new(
            builder
                .json()
                .with_current_span(true)
                .with_span_list(false)
                .finish(),
        ),
        LogFormat::Pretty => Box::new(
            builder
                .with_ansi(config.ansi)
                .with_target(false)
                .finish(),
        ),
    }
}

/// Install the process-wide subscriber, logging to stderr.
pub fn init_logging(config: &LogConfig) -> anyhow::Result<()> {
    tracing::subscriber::set_global_default(build_subscriber(config, std::io::stderr))?;
    Ok(())
}
