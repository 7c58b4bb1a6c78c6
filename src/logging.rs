//! Structured JSONL logging and human-readable stderr output.
//!
//! This module provides dual-output logging:
//! - **JSONL to file** (~/.quickbox/logs/quickbox.jsonl) - structured, one event per line
//! - **Compact to stderr** - human-readable, quiet by default so CLI output stays clean
//!
//! # Usage
//!
//! ```rust,ignore
//! use quickbox::logging;
//!
//! // Initialize logging - MUST keep guard alive for duration of program
//! let _guard = logging::init(false);
//!
//! tracing::info!(event_type = "app_start", "Application started");
//! ```

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

/// Guard that must be kept alive for the duration of the program.
/// Dropping this guard will flush and close the log file.
pub struct LoggingGuard {
    _file_guard: Option<WorkerGuard>,
}

/// Initialize the dual-output logging system.
///
/// `verbose` raises the stderr layer from `warn` to `debug`. `RUST_LOG`
/// overrides both layers when set.
pub fn init(verbose: bool) -> LoggingGuard {
    let log_dir = get_log_dir();
    if let Err(e) = fs::create_dir_all(&log_dir) {
        eprintln!("[LOGGING] Failed to create log directory: {}", e);
    }
    let log_path = log_dir.join("quickbox.jsonl");

    let (json_layer, file_guard) = match OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
    {
        Ok(file) => {
            // Non-blocking writer so launches never wait on disk
            let (non_blocking_file, guard) = tracing_appender::non_blocking(file);
            let layer = fmt::layer()
                .json()
                .with_writer(non_blocking_file)
                .with_timer(fmt::time::UtcTime::rfc_3339())
                .with_target(true)
                .with_level(true)
                .with_thread_names(true)
                .with_file(false)
                .with_line_number(false)
                .with_span_events(FmtSpan::NONE)
                .with_filter(env_filter_or("info"));
            (Some(layer), Some(guard))
        }
        Err(e) => {
            eprintln!("[LOGGING] Failed to open log file {}: {}", log_path.display(), e);
            (None, None)
        }
    };

    let stderr_default = if verbose { "debug" } else { "warn" };
    let pretty_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(true)
        .with_target(false)
        .with_level(true)
        .compact()
        .with_filter(env_filter_or(stderr_default));

    // try_init so tests or embedders that already installed a subscriber don't panic
    let _ = tracing_subscriber::registry()
        .with(json_layer)
        .with(pretty_layer)
        .try_init();

    tracing::info!(
        event_type = "app_lifecycle",
        action = "started",
        log_path = %log_path.display(),
        "Logging initialized"
    );

    LoggingGuard {
        _file_guard: file_guard,
    }
}

fn env_filter_or(default: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default))
}

/// Get the log directory path (~/.quickbox/logs/)
fn get_log_dir() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".quickbox").join("logs"))
        .unwrap_or_else(|| std::env::temp_dir().join("quickbox-logs"))
}

/// Get the path to the JSONL log file
pub fn log_path() -> PathBuf {
    get_log_dir().join("quickbox.jsonl")
}

// =============================================================================
// STRUCTURED LOGGING HELPERS
// =============================================================================

/// Log a script launch lifecycle event with structured fields
pub fn log_launch_event(script: &Path, action: &str, duration_ms: Option<u64>, success: bool) {
    match duration_ms {
        Some(duration) => {
            tracing::info!(
                event_type = "launch_event",
                script = %script.display(),
                action = action,
                duration_ms = duration,
                success = success,
                "Script {} {}", action, script.display()
            );
        }
        None => {
            tracing::info!(
                event_type = "launch_event",
                script = %script.display(),
                action = action,
                success = success,
                "Script {} {}", action, script.display()
            );
        }
    }
}

/// Log a registry rescan with structured fields
pub fn log_scan_event(trigger: &str, folder_count: usize, script_count: usize, duration_ms: u64) {
    tracing::info!(
        event_type = "scan_event",
        trigger = trigger,
        folder_count = folder_count,
        script_count = script_count,
        duration_ms = duration_ms,
        "Rescanned {} folders, {} scripts", folder_count, script_count
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_path_is_jsonl() {
        let path = log_path();
        assert_eq!(path.extension().and_then(|e| e.to_str()), Some("jsonl"));
        assert!(path.starts_with(get_log_dir()));
    }

    #[test]
    fn test_helpers_do_not_panic_without_subscriber() {
        log_launch_event(Path::new("/tmp/a.py"), "exited", Some(12), true);
        log_launch_event(Path::new("/tmp/a.py"), "spawned", None, true);
        log_scan_event("manual", 2, 5, 3);
    }
}
