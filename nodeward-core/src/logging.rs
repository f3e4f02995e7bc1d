//! Process-wide tracing subscriber
//!
//! One formatting layer (JSON or pretty, to stdout or appended to a file)
//! under an [`EnvFilter`]. `RUST_LOG` wins over the configured level.

use anyhow::Context;
use std::fs::File;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer, Registry,
};

use crate::config::LoggingConfig;

type OutputLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Output format of the log lines
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

impl FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "json" => Ok(Self::Json),
            "pretty" => Ok(Self::Pretty),
            other => Err(anyhow::anyhow!("Invalid log format: {other}")),
        }
    }
}

/// Install the global subscriber described by `config`.
pub fn init_logging(config: &LoggingConfig) -> anyhow::Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => level_filter(&config.level)?,
    };
    let format: LogFormat = config.format.parse()?;
    let file = config.file_path.as_deref().map(open_log_file).transpose()?;

    tracing_subscriber::registry()
        .with(output_layer(format, file))
        .with(filter)
        .try_init()?;
    Ok(())
}

/// Filter for a configured level: a plain level (`debug`, `warning`) or a
/// full directive (`info,nodeward_cluster=debug`).
fn level_filter(level: &str) -> anyhow::Result<EnvFilter> {
    if let Ok(level) = parse_log_level(level) {
        return Ok(EnvFilter::new(level.to_string()));
    }
    EnvFilter::try_new(level).with_context(|| format!("Invalid log level: {level}"))
}

fn open_log_file(path: &str) -> anyhow::Result<File> {
    std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(Path::new(path))
        .with_context(|| format!("Cannot open log file {path}"))
}

fn output_layer(format: LogFormat, file: Option<File>) -> OutputLayer {
    match format {
        LogFormat::Json => {
            let layer = fmt::layer()
                .json()
                .with_span_events(FmtSpan::CLOSE)
                .with_current_span(true)
                .with_target(true)
                .with_line_number(true)
                .with_file(true);
            match file {
                Some(file) => layer.with_writer(Arc::new(file)).boxed(),
                None => layer.boxed(),
            }
        }
        LogFormat::Pretty => {
            let layer = fmt::layer().pretty().with_target(true).with_line_number(true).with_file(false);
            match file {
                // No colour codes in files
                Some(file) => layer.with_ansi(false).with_writer(Arc::new(file)).boxed(),
                None => layer.boxed(),
            }
        }
    }
}

fn parse_log_level(level: &str) -> anyhow::Result<Level> {
    match level.to_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" | "warning" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        _ => Err(anyhow::anyhow!("Invalid log level: {level}")),
    }
}
