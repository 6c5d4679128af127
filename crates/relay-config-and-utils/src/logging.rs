//! Logging initialization for the relay.
//!
//! Thin wrapper over the observability crate. Structured JSONL goes to the
//! configured log file; stderr always receives a compact mirror so the relay
//! can run in the foreground.

use crate::CoreResult;
use std::path::PathBuf;

/// Service name stamped on every JSON log line.
const SERVICE_NAME: &str = "querylog-relay";

/// Initialize the logging system for the relay.
///
/// `level` is the default filter; `RUST_LOG` overrides it when set. With no
/// `log_path` only stderr is written.
///
/// # Example
///
/// ```ignore
/// init_logging("info", Some(paths.log_file()))?;
/// tracing::info!("relay started");
/// ```
pub fn init_logging(level: &str, log_path: Option<PathBuf>) -> CoreResult<()> {
    observability::init_with_config(observability::LogConfig {
        service_name: SERVICE_NAME.into(),
        default_level: level.to_lowercase(),
        also_stderr: true,
        log_path,
    })?;
    Ok(())
}

/// Parse a log level string into a tracing Level.
pub fn parse_level(level: &str) -> Option<tracing::Level> {
    match level.to_lowercase().as_str() {
        "trace" => Some(tracing::Level::TRACE),
        "debug" => Some(tracing::Level::DEBUG),
        "info" => Some(tracing::Level::INFO),
        "warn" | "warning" => Some(tracing::Level::WARN),
        "error" => Some(tracing::Level::ERROR),
        _ => None,
    }
}
