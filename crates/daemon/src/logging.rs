//! Tracing subscriber setup
//!
//! - `RUST_LOG` overrides the default filter (`perfagent=info`)
//! - `PERFAGENT_LOG_FORMAT=json` switches stdout to JSON lines
//! - `PERFAGENT_LOG_DIR` adds a daily-rolling JSON log file

use crate::telemetry;
use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const DEFAULT_FILTER: &str = "perfagent=info";
const LOG_FORMAT_VAR: &str = "PERFAGENT_LOG_FORMAT";
const LOG_DIR_VAR: &str = "PERFAGENT_LOG_DIR";
const LOG_FILE_PREFIX: &str = "perf-agent.log";

/// Keeps the file writer flushing; drop on exit
pub struct LogGuard {
    _file: Option<WorkerGuard>,
}

pub fn init() -> Result<LogGuard> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(DEFAULT_FILTER))
        .context("Failed to create env filter")?;

    let log_format = std::env::var(LOG_FORMAT_VAR).unwrap_or_else(|_| "pretty".to_string());
    let stdout_layer = match log_format.as_str() {
        // Production: JSON structured logging
        "json" => fmt::layer().json().boxed(),
        // Development: Pretty formatting with colors
        _ => fmt::layer().pretty().boxed(),
    };

    let (file_layer, file_guard) = match std::env::var(LOG_DIR_VAR) {
        Ok(dir) if !dir.is_empty() => {
            let dir = shellexpand::tilde(&dir).into_owned();
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().json().with_ansi(false).with_writer(writer);
            (Some(layer), Some(guard))
        }
        _ => (None, None),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(file_layer)
        .with(telemetry::layer()?)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(LogGuard { _file: file_guard })
}
