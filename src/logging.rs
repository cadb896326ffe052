// src/logging.rs

//! Logging setup for `dagflow` using `tracing` + `tracing-subscriber`.
//!
//! The library itself never installs a global subscriber. Hosts either call
//! [`init_logging`] once at startup, or build a [`tracing::Dispatch`] with
//! [`subscriber`] and hand it to [`Dag::with_logger`](crate::dag::Dag::with_logger)
//! so a single graph logs somewhere specific.
//!
//! Priority for determining the log level in [`init_logging`]:
//! 1. `--log-level` CLI flag (if provided)
//! 2. `DAGFLOW_LOG` environment variable (e.g. "info", "debug")
//! 3. default to `info`
//!
//! Logs are sent to STDERR so that command stdout stays free for task output.

use anyhow::{Result, anyhow};
use tracing::Dispatch;
use tracing_subscriber::fmt;

use crate::cli::LogLevel;

/// Initialise global logging subscriber.
///
/// Safe to call once at startup.
pub fn init_logging(cli_level: Option<LogLevel>) -> Result<()> {
    let level = match cli_level {
        Some(lvl) => level_from_log_level(lvl),
        None => std::env::var("DAGFLOW_LOG")
            .ok()
            .and_then(|s| parse_level_str(&s))
            .unwrap_or(tracing::Level::INFO),
    };

    tracing::dispatcher::set_global_default(subscriber(level))
        .map_err(|e| anyhow!("installing global tracing subscriber: {e}"))?;

    Ok(())
}

/// Build a stderr subscriber at the given level without installing it.
pub fn subscriber(level: tracing::Level) -> Dispatch {
    let sub = fmt()
        .with_max_level(level)
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_writer(std::io::stderr)
        .finish();

    Dispatch::new(sub)
}

/// A dispatch that drops every event.
pub fn silent() -> Dispatch {
    Dispatch::none()
}

pub fn level_from_log_level(lvl: LogLevel) -> tracing::Level {
    match lvl {
        LogLevel::Error => tracing::Level::ERROR,
        LogLevel::Warn => tracing::Level::WARN,
        LogLevel::Info => tracing::Level::INFO,
        LogLevel::Debug => tracing::Level::DEBUG,
        LogLevel::Trace => tracing::Level::TRACE,
    }
}

pub fn parse_level_str(s: &str) -> Option<tracing::Level> {
    match s.trim().to_lowercase().as_str() {
        "error" => Some(tracing::Level::ERROR),
        "warn" | "warning" => Some(tracing::Level::WARN),
        "info" => Some(tracing::Level::INFO),
        "debug" => Some(tracing::Level::DEBUG),
        "trace" => Some(tracing::Level::TRACE),
        _ => None,
    }
}
