// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Logging initialisation
//!
//! Console output always; with `file-logging`, per-crate log files in a
//! timestamped run folder as well.

use anyhow::{anyhow, Context, Result};
use std::path::{Path, PathBuf};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

use crate::cli::CrateDebugFlags;

/// Keeps file writers alive; logs are flushed when it drops
pub struct LoggingGuard {
    #[cfg(feature = "file-logging")]
    _file_guards: Vec<tracing_appender::non_blocking::WorkerGuard>,
    log_dir: Option<PathBuf>,
}

impl LoggingGuard {
    /// Run folder holding the log files, if file logging is active
    pub fn log_dir(&self) -> Option<&Path> {
        self.log_dir.as_deref()
    }
}

fn build_filter(debug_flags: &CrateDebugFlags, level: &str) -> Result<EnvFilter> {
    let directives = debug_flags.to_filter_string(level);
    EnvFilter::try_new(&directives)
        .with_context(|| format!("Invalid log filter '{}'", directives))
}

fn console_layer(filter: EnvFilter) -> Box<dyn Layer<Registry> + Send + Sync> {
    tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .with_filter(filter)
        .boxed()
}

/// Initialise console logging at `level`, raised to debug for flagged crates.
///
/// # Errors
///
/// Fails on an unparsable level or when a global subscriber is already set.
pub fn init_console_logging(debug_flags: &CrateDebugFlags, level: &str) -> Result<LoggingGuard> {
    let filter = build_filter(debug_flags, level)?;
    Registry::default()
        .with(vec![console_layer(filter)])
        .try_init()
        .map_err(|e| anyhow!("Failed to install log subscriber: {}", e))?;
    Ok(LoggingGuard {
        #[cfg(feature = "file-logging")]
        _file_guards: Vec::new(),
        log_dir: None,
    })
}

/// Initialise console and file logging
///
/// Creates a timestamped folder structure:
/// ```text
/// <log_dir>/
///   └── run_20250101_120000/
///       ├── spinmaps-stats.log
///       ├── spinmaps-pipeline.log
///       └── spinmaps.log (combined)
/// ```
///
/// Only the `retention_runs` most recent run folders are kept (default 10).
#[cfg(feature = "file-logging")]
pub fn init_logging(
    debug_flags: &CrateDebugFlags,
    level: &str,
    log_dir: &Path,
    retention_runs: Option<usize>,
) -> Result<LoggingGuard> {
    use tracing_appender::rolling;

    let timestamp = chrono::Utc::now().format(RUN_FOLDER_FORMAT);
    let run_folder = log_dir.join(format!("run_{}", timestamp));
    std::fs::create_dir_all(&run_folder)
        .with_context(|| format!("Failed to create log directory: {}", run_folder.display()))?;
    cleanup_old_logs(log_dir, retention_runs.unwrap_or(10))?;

    let mut layers = vec![console_layer(build_filter(debug_flags, level)?)];
    let mut file_guards = Vec::new();

    // One file per library crate
    for crate_name in crate::KNOWN_CRATES.iter().filter(|c| **c != "spinmaps") {
        let appender = rolling::never(&run_folder, format!("{}.log", crate_name));
        let (writer, guard) = tracing_appender::non_blocking(appender);
        file_guards.push(guard);

        let target = crate::crate_target(crate_name);
        layers.push(
            tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true)
                .with_file(true)
                .with_line_number(true)
                .with_filter(EnvFilter::try_new(format!("off,{}=debug", target))?)
                .boxed(),
        );
    }

    // Combined log file (all crates)
    let combined = rolling::never(&run_folder, "spinmaps.log");
    let (writer, guard) = tracing_appender::non_blocking(combined);
    file_guards.push(guard);
    layers.push(
        tracing_subscriber::fmt::layer()
            .with_writer(writer)
            .with_ansi(false)
            .with_target(true)
            .with_filter(build_filter(debug_flags, level)?)
            .boxed(),
    );

    Registry::default()
        .with(layers)
        .try_init()
        .map_err(|e| anyhow!("Failed to install log subscriber: {}", e))?;

    Ok(LoggingGuard {
        _file_guards: file_guards,
        log_dir: Some(run_folder),
    })
}

#[cfg(feature = "file-logging")]
const RUN_FOLDER_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Remove all but the `keep` most recent `run_*` folders under `base_log_dir`
#[cfg(feature = "file-logging")]
pub fn cleanup_old_logs(base_log_dir: &Path, keep: usize) -> Result<()> {
    if !base_log_dir.exists() {
        return Ok(());
    }

    let mut runs: Vec<(PathBuf, chrono::NaiveDateTime)> = Vec::new();
    for entry in std::fs::read_dir(base_log_dir)? {
        let path = entry?.path();
        if !path.is_dir() {
            continue;
        }
        let stamp = path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(|n| n.strip_prefix("run_"))
            .and_then(|s| chrono::NaiveDateTime::parse_from_str(s, RUN_FOLDER_FORMAT).ok());
        if let Some(stamp) = stamp {
            runs.push((path, stamp));
        }
    }

    // Newest first
    runs.sort_by(|a, b| b.1.cmp(&a.1));
    for (path, _) in runs.iter().skip(keep) {
        if let Err(e) = std::fs::remove_dir_all(path) {
            eprintln!(
                "Warning: Failed to remove old log directory {}: {}",
                path.display(),
                e
            );
        }
    }
    Ok(())
}
