//! # Observability
//!
//! Subscriber setup for the query log relay.
//!
//! Crates never talk to a subscriber directly. They use the standard
//! `tracing` macros and the binary calls [`init_with_config`] once at startup.
//!
//! ## Output
//!
//! - Without a `log_path`, a compact human-readable formatter writes to stderr.
//! - With a `log_path`, every event is appended to that file as one JSON line
//!   (see [`LogEntry`]) and, if `also_stderr` is set, mirrored to stderr in the
//!   compact format.
//!
//! `RUST_LOG` always takes precedence over `default_level`.
//!
//! ## Usage
//!
//! ```rust,ignore
//! observability::init_with_config(observability::LogConfig {
//!     service_name: "querylog-relay".into(),
//!     default_level: "debug".into(),
//!     log_path: Some("/var/log/querylog-relay.jsonl".into()),
//!     also_stderr: true,
//! })?;
//! ```

mod json_layer;
mod writer;

use std::io;
use std::path::PathBuf;

use thiserror::Error;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

pub use json_layer::{JsonLayer, LogEntry};
pub use writer::{AppendLogWriter, WriterFactory};

/// Configuration for the logging system.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Name of the service, included in every JSON log line.
    pub service_name: String,

    /// Default log level filter (e.g. "debug", "info", "warn").
    /// Overridden by `RUST_LOG` when set.
    pub default_level: String,

    /// Optional JSONL log file. When unset, logs only go to stderr.
    pub log_path: Option<PathBuf>,

    /// Mirror events to stderr when a log file is configured.
    pub also_stderr: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            service_name: "unknown".into(),
            default_level: "info".into(),
            log_path: None,
            also_stderr: false,
        }
    }
}

/// Errors raised while installing the global subscriber.
#[derive(Debug, Error)]
pub enum InitError {
    /// The log file (or its parent directory) could not be opened.
    #[error("failed to open log file {}: {source}", .path.display())]
    LogFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// A global subscriber was already installed.
    #[error("subscriber already installed: {0}")]
    AlreadyInitialized(String),
}

/// Initialize logging with defaults: compact stderr output at `info`.
pub fn init(service_name: &str) -> Result<(), InitError> {
    init_with_config(LogConfig {
        service_name: service_name.into(),
        ..Default::default()
    })
}

/// Initialize logging with custom configuration.
///
/// May only succeed once per process; later calls return
/// [`InitError::AlreadyInitialized`].
pub fn init_with_config(config: LogConfig) -> Result<(), InitError> {
    match config.log_path.clone() {
        Some(path) => init_file_subscriber(&config, path),
        None => tracing_subscriber::fmt()
            .with_env_filter(env_filter(&config.default_level))
            .with_target(true)
            .with_writer(io::stderr)
            .compact()
            .try_init()
            .map_err(|e| InitError::AlreadyInitialized(e.to_string())),
    }
}

fn init_file_subscriber(config: &LogConfig, path: PathBuf) -> Result<(), InitError> {
    let writer = AppendLogWriter::new(&path).map_err(|source| InitError::LogFile {
        path: path.clone(),
        source,
    })?;

    let json_layer = JsonLayer::new(config.service_name.clone(), WriterFactory::new(writer));

    let stderr_layer = config.also_stderr.then(|| {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_file(false)
            .with_line_number(false)
            .compact()
            .with_writer(io::stderr)
            .with_filter(env_filter(&config.default_level))
    });

    tracing_subscriber::registry()
        .with(json_layer.with_filter(env_filter(&config.default_level)))
        .with(stderr_layer)
        .try_init()
        .map_err(|e| InitError::AlreadyInitialized(e.to_string()))?;

    tracing::info!(log_path = %path.display(), "observability initialized");
    Ok(())
}

fn env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

/// Re-export tracing macros for convenience.
pub use tracing::{debug, error, info, instrument, trace, warn};

/// Re-export Level for advanced filtering.
pub use tracing::Level;
