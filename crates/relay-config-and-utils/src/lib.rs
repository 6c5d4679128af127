//! Core types, configuration, and utilities for the query log relay.

mod config;
mod error;
mod logging;
mod paths;

pub use config::{
    Config, DEFAULT_BATCH_MAX_SIZE, DEFAULT_BROKER_API_PORT, DEFAULT_COLD_DELAY_MS,
    DEFAULT_LOG_LEVEL, DEFAULT_REQUEST_TIMEOUT_MS, UNLIMITED,
};
pub use error::{CoreError, CoreResult};
pub use logging::{init_logging, parse_level};
pub use paths::Paths;
