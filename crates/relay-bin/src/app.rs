//! Subcommand implementations.

use crate::ingest;
use anyhow::Context;
use batch_drain_worker::QueryLogRelay;
use broker_publisher::{HttpPublisher, HttpPublisherConfig, Publisher, StdoutPublisher};
use query_log_record::QueryLogEntry;
use relay_config_and_utils::Config;
use requeue_queue::Policy;
use std::sync::Arc;
use tokio::io::BufReader;
use tracing::{info, warn};

/// Relay stdin to the broker until EOF or Ctrl-C.
pub async fn run_relay(config: Config, dry_run: bool, flush_on_eof: bool) -> anyhow::Result<()> {
    let policy = Policy::from_config(&config);
    let publisher = build_publisher(&config, dry_run)?;

    info!(
        publisher = publisher.name(),
        enabled = policy.enabled,
        max_queue_size = ?policy.max_queue_size,
        max_failures = ?policy.max_failures,
        batch_max_size = policy.batch_max_size,
        cold_delay_ms = policy.cold_delay.as_millis() as u64,
        "starting query log relay"
    );

    let relay: QueryLogRelay<QueryLogEntry> = QueryLogRelay::new(policy, publisher);
    if !relay.start() {
        warn!("relay is disabled, incoming entries will be discarded");
    }

    let reader = BufReader::new(tokio::io::stdin());
    tokio::select! {
        result = ingest::ingest_lines(reader, &relay) => {
            let summary = result.context("failed to read stdin")?;
            info!(
                accepted = summary.accepted,
                rejected = summary.rejected,
                "stdin closed"
            );
            if flush_on_eof {
                let report = relay.flush_now().await;
                info!(published = report.published, skipped = report.skipped, "final flush done");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("received Ctrl-C, shutting down");
        }
    }

    relay.shutdown().await;
    Ok(())
}

fn build_publisher(config: &Config, dry_run: bool) -> anyhow::Result<Arc<dyn Publisher>> {
    if dry_run {
        return Ok(Arc::new(StdoutPublisher::new()));
    }

    let endpoint = HttpPublisherConfig::from_config(config)?;
    let publisher = HttpPublisher::new(endpoint).context("failed to create broker publisher")?;
    Ok(Arc::new(publisher))
}

/// Print the broker endpoint and the effective policy.
pub fn check_config(config: &Config) -> anyhow::Result<()> {
    let endpoint = HttpPublisherConfig::from_config(config)?;
    let policy = Policy::from_config(config);

    println!("configuration OK");
    println!("broker api:   {}", endpoint.base_url);
    println!("virtual host: {}", endpoint.virtual_host);
    println!("exchange:     {}", endpoint.exchange);
    println!("routing key:  {}", endpoint.routing_key);
    println!("{:#?}", policy);
    Ok(())
}
