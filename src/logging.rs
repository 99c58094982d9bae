//! Tracing setup: stderr diagnostics plus an optional audit log file.

use std::path::Path;

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

/// Keeps the audit log writer flushing until dropped.
pub struct LogGuard {
    _audit: Option<WorkerGuard>,
}

/// Level used when `RUST_LOG` is not set.
pub fn default_level(verbosity: u8, quiet: bool) -> LevelFilter {
    if quiet {
        return LevelFilter::ERROR;
    }
    match verbosity {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        2 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    }
}

/// Install the global subscriber.
///
/// stderr honours `RUST_LOG`, falling back to [`default_level`]. The audit
/// log, when configured, always records `info` and above without ANSI codes.
pub fn init(verbosity: u8, quiet: bool, audit_log: Option<&Path>) -> Result<LogGuard> {
    let stderr_filter = EnvFilter::builder()
        .with_default_directive(default_level(verbosity, quiet).into())
        .from_env_lossy();
    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(stderr_filter);

    let (audit_layer, guard) = match audit_log {
        Some(path) => {
            let (writer, guard) = audit_writer(path)?;
            let layer = fmt::layer()
                .with_ansi(false)
                .with_writer(writer)
                .with_filter(LevelFilter::INFO);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(audit_layer)
        .try_init()
        .context("installing tracing subscriber")?;

    Ok(LogGuard { _audit: guard })
}

fn audit_writer(
    path: &Path,
) -> Result<(tracing_appender::non_blocking::NonBlocking, WorkerGuard)> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let file_name = path
        .file_name()
        .with_context(|| format!("audit log path {} has no file name", path.display()))?;
    std::fs::create_dir_all(dir)
        .with_context(|| format!("creating audit log directory {}", dir.display()))?;
    let appender = RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(file_name.to_string_lossy())
        .build(dir)
        .with_context(|| format!("opening audit log {}", path.display()))?;
    Ok(tracing_appender::non_blocking(appender))
}
