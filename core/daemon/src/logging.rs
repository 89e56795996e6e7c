//! Log sinks for the daemon.
//!
//! Two append-only files live under the log directory:
//! - `status.log`: everything at the configured level (default info)
//! - `error.log`: warnings and errors only
//!
//! With `--foreground`, or when the files cannot be opened, logs also go to stderr.

use std::env;
use std::path::Path;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

const DEBUG_ENV: &str = "SLEEPALERT_DEBUG_LOG";

/// Keeps the background writers alive; dropping it flushes pending lines.
pub struct LoggingGuard {
    _guards: Vec<WorkerGuard>,
}

pub fn init(log_dir: Option<&Path>, foreground: bool) -> LoggingGuard {
    let mut guards = Vec::new();
    let mut sink_error = None;
    let mut status_writer = None;
    let mut error_writer = None;

    if let Some(dir) = log_dir {
        match open_sink(dir, "status").and_then(|status| Ok((status, open_sink(dir, "error")?))) {
            Ok(((status, status_guard), (error, error_guard))) => {
                guards.push(status_guard);
                guards.push(error_guard);
                status_writer = Some(status);
                error_writer = Some(error);
            }
            Err(err) => sink_error = Some(err),
        }
    }
    let use_stderr = foreground || status_writer.is_none();

    let status_layer = status_writer.map(|writer| {
        fmt::layer()
            .with_ansi(false)
            .with_writer(writer)
            .with_filter(env_filter())
    });
    let error_layer = error_writer.map(|writer| {
        fmt::layer()
            .with_ansi(false)
            .with_writer(writer)
            .with_filter(LevelFilter::WARN)
    });
    let stderr_layer = use_stderr.then(|| {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_filter(env_filter())
    });

    tracing_subscriber::registry()
        .with(status_layer)
        .with(error_layer)
        .with(stderr_layer)
        .init();

    if let Some(err) = sink_error {
        tracing::warn!(error = %err, "Log files unavailable, logging to stderr");
    }

    LoggingGuard { _guards: guards }
}

fn env_filter() -> EnvFilter {
    let debug_enabled = env::var(DEBUG_ENV)
        .map(|value| matches!(value.as_str(), "1" | "true" | "TRUE" | "yes" | "YES"))
        .unwrap_or(false);
    if debug_enabled {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

fn open_sink(dir: &Path, name: &str) -> Result<(NonBlocking, WorkerGuard), String> {
    fs_err::create_dir_all(dir).map_err(|err| format!("Failed to create log directory: {}", err))?;
    let appender = RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(name)
        .filename_suffix("log")
        .build(dir)
        .map_err(|err| format!("Failed to open {}.log: {}", name, err))?;
    Ok(tracing_appender::non_blocking(appender))
}
