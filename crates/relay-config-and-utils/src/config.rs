//! Configuration management for the relay.
//!
//! The relay reads the same JSON document the DNS host hands to its query
//! logging app, so keys are camelCase and the `-1` sentinels are kept as-is.
//! Conversion into typed limits happens in the queue crate.

use crate::{parse_level, CoreError, CoreResult, Paths};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use url::Url;

/// Sentinel meaning "no limit" for `queueMaxSize` and `queueMaxFailures`.
pub const UNLIMITED: i64 = -1;

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Default port of the broker's HTTP API.
pub const DEFAULT_BROKER_API_PORT: u16 = 15672;

/// Default fixed delay between two drain cycles.
pub const DEFAULT_COLD_DELAY_MS: u64 = 5000;

/// Default number of records pulled per batch.
pub const DEFAULT_BATCH_MAX_SIZE: usize = 100;

/// Default per-request timeout towards the broker.
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;

/// Environment variable overriding `logLevel`.
const LOG_LEVEL_ENV: &str = "QUERYLOG_RELAY_LOG_LEVEL";

/// Main relay configuration.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    /// Gate on admission of new entries and on the drain loop.
    pub enabled: bool,

    /// Broker host name.
    pub amqp_host: String,
    /// Port of the broker's HTTP API.
    pub amqp_port: u16,
    /// Virtual host to publish into.
    pub amqp_virtual_host: String,
    /// Exchange receiving the query logs.
    pub amqp_exchange_name: String,
    /// Routing key attached to every message.
    pub amqp_routing_key: String,
    pub amqp_auth_username: String,
    pub amqp_auth_password: String,
    /// Use TLS towards the broker.
    #[serde(alias = "ampqsEnabled")]
    pub amqps_enabled: bool,
    /// Timeout applied to every broker request.
    pub amqp_request_timeout_ms: u64,

    /// Maximum resident entries on the retry path, `-1` for unbounded.
    pub queue_max_size: i64,
    /// Maximum failed attempts before an entry is dropped, `-1` for unlimited.
    pub queue_max_failures: i64,
    /// Let failed entries ignore `queue_max_size` when requeued.
    pub queue_failures_bypass_size_limits: bool,
    /// Evict the oldest entry instead of rejecting a requeue on overflow.
    pub queue_failures_eject_oldest_on_requeue: bool,

    /// Fixed delay between two drain cycles.
    pub sender_cold_delay_ms: u64,
    /// `0` drains until empty within one cycle, otherwise one batch per cycle.
    pub sender_inter_batch_delay_ms: u64,
    /// Maximum entries pulled per batch.
    pub sender_batch_max_size: usize,
    /// Extra delay before the next cycle after the broker was unreachable.
    pub sender_post_failure_delay_ms: u64,

    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            enabled: true,
            amqp_host: "localhost".to_string(),
            amqp_port: DEFAULT_BROKER_API_PORT,
            amqp_virtual_host: "/".to_string(),
            amqp_exchange_name: "amq.topic".to_string(),
            amqp_routing_key: "dns.querylog".to_string(),
            amqp_auth_username: "guest".to_string(),
            amqp_auth_password: "guest".to_string(),
            amqps_enabled: false,
            amqp_request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            queue_max_size: UNLIMITED,
            queue_max_failures: UNLIMITED,
            queue_failures_bypass_size_limits: false,
            queue_failures_eject_oldest_on_requeue: false,
            sender_cold_delay_ms: DEFAULT_COLD_DELAY_MS,
            sender_inter_batch_delay_ms: 0,
            sender_batch_max_size: DEFAULT_BATCH_MAX_SIZE,
            sender_post_failure_delay_ms: 0,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

// Hand-written so the broker password never reaches a log line.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("enabled", &self.enabled)
            .field("amqp_host", &self.amqp_host)
            .field("amqp_port", &self.amqp_port)
            .field("amqp_virtual_host", &self.amqp_virtual_host)
            .field("amqp_exchange_name", &self.amqp_exchange_name)
            .field("amqp_routing_key", &self.amqp_routing_key)
            .field("amqp_auth_username", &self.amqp_auth_username)
            .field("amqps_enabled", &self.amqps_enabled)
            .field("amqp_request_timeout_ms", &self.amqp_request_timeout_ms)
            .field("queue_max_size", &self.queue_max_size)
            .field("queue_max_failures", &self.queue_max_failures)
            .field(
                "queue_failures_bypass_size_limits",
                &self.queue_failures_bypass_size_limits,
            )
            .field(
                "queue_failures_eject_oldest_on_requeue",
                &self.queue_failures_eject_oldest_on_requeue,
            )
            .field("sender_cold_delay_ms", &self.sender_cold_delay_ms)
            .field("sender_inter_batch_delay_ms", &self.sender_inter_batch_delay_ms)
            .field("sender_batch_max_size", &self.sender_batch_max_size)
            .field("sender_post_failure_delay_ms", &self.sender_post_failure_delay_ms)
            .field("log_level", &self.log_level)
            .finish_non_exhaustive()
    }
}

impl Config {
    /// Load the configuration file under `paths`, falling back to defaults
    /// when it does not exist.
    pub fn load(paths: &Paths) -> CoreResult<Self> {
        let config_path = paths.config_file();

        let mut config = if config_path.exists() {
            Self::load_from_file(&config_path)?
        } else {
            Self::default()
        };

        config.load_from_env();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    /// Parse and validate a JSON configuration document.
    pub fn from_json_str(content: &str) -> CoreResult<Self> {
        let config: Config = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to the file under `paths`.
    pub fn save(&self, paths: &Paths) -> CoreResult<()> {
        paths.ensure_dirs()?;
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(paths.config_file(), content)?;
        Ok(())
    }

    /// Only the log level can be overridden from the environment.
    fn load_from_env(&mut self) {
        if let Ok(log_level) = std::env::var(LOG_LEVEL_ENV) {
            self.log_level = log_level;
        }
    }

    /// Reject values the relay cannot run with.
    pub fn validate(&self) -> CoreResult<()> {
        if self.queue_max_size < UNLIMITED {
            return Err(CoreError::Config(format!(
                "queueMaxSize must be -1 or non-negative, got {}",
                self.queue_max_size
            )));
        }
        if self.queue_max_failures < UNLIMITED {
            return Err(CoreError::Config(format!(
                "queueMaxFailures must be -1 or non-negative, got {}",
                self.queue_max_failures
            )));
        }
        if self.queue_max_failures > i64::from(u32::MAX) {
            return Err(CoreError::Config(format!(
                "queueMaxFailures is too large: {}",
                self.queue_max_failures
            )));
        }
        if self.sender_batch_max_size == 0 {
            return Err(CoreError::Config(
                "senderBatchMaxSize must be at least 1".to_string(),
            ));
        }
        if self.sender_cold_delay_ms == 0 {
            return Err(CoreError::Config(
                "senderColdDelayMs must be greater than 0".to_string(),
            ));
        }
        if self.amqp_host.trim().is_empty() {
            return Err(CoreError::Config("amqpHost must not be empty".to_string()));
        }
        if self.amqp_exchange_name.trim().is_empty() {
            return Err(CoreError::Config(
                "amqpExchangeName must not be empty".to_string(),
            ));
        }
        if parse_level(&self.log_level).is_none() {
            return Err(CoreError::Config(format!(
                "unknown logLevel: {}",
                self.log_level
            )));
        }
        Ok(())
    }

    /// Base URL of the broker's HTTP API.
    pub fn broker_api_url(&self) -> CoreResult<Url> {
        let scheme = if self.amqps_enabled { "https" } else { "http" };
        let raw = format!("{}://{}:{}/", scheme, self.amqp_host, self.amqp_port);
        Url::parse(&raw).map_err(CoreError::from)
    }
}
