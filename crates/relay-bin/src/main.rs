//! Query log relay - ships DNS query logs from stdin to a message broker.

mod app;
mod ingest;

use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use relay_config_and_utils::{init_logging, parse_level, Config, Paths};

/// Query log relay command-line interface.
#[derive(Parser)]
#[command(name = "querylog-relay")]
#[command(about = "Buffer DNS query logs and publish them to a message broker")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Log level (trace, debug, info, warn, error). Defaults to logLevel from the config
    #[arg(short, long, global = true, env = "QUERYLOG_RELAY_LOG_LEVEL")]
    log_level: Option<String>,

    /// Configuration file. Defaults to <base-dir>/config.json
    #[arg(short, long, global = true, env = "QUERYLOG_RELAY_CONFIG")]
    config: Option<PathBuf>,

    /// Base directory for config and logs. Defaults to ~/.querylog-relay
    #[arg(long, global = true)]
    base_dir: Option<PathBuf>,

    /// Log to stderr only, without the JSONL log file
    #[arg(long, global = true)]
    no_log_file: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Read query log entries from stdin and relay them (default)
    Run {
        /// Print messages to stdout instead of publishing them
        #[arg(long)]
        dry_run: bool,

        /// Run one last drain cycle when stdin closes
        #[arg(long)]
        flush_on_eof: bool,
    },
    /// Validate the configuration and print the effective policy
    CheckConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let paths = match cli.base_dir {
        Some(base) => Paths::with_base_dir(base),
        None => Paths::new()?,
    };

    let config = match &cli.config {
        Some(path) => Config::load_from_file(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => Config::load(&paths).context("failed to load config")?,
    };

    let level = cli.log_level.unwrap_or_else(|| config.log_level.clone());
    if parse_level(&level).is_none() {
        bail!("unknown log level: {level}");
    }

    match cli.command {
        Some(Commands::CheckConfig) => {
            init_logging(&level, None)?;
            app::check_config(&config)
        }
        Some(Commands::Run {
            dry_run,
            flush_on_eof,
        }) => {
            let log_path = (!cli.no_log_file).then(|| paths.log_file());
            init_logging(&level, log_path)?;
            app::run_relay(config, dry_run, flush_on_eof).await
        }
        None => {
            let log_path = (!cli.no_log_file).then(|| paths.log_file());
            init_logging(&level, log_path)?;
            app::run_relay(config, false, false).await
        }
    }
}
