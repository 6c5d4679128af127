//! Newline-delimited JSON ingestion.

use batch_drain_worker::QueryLogRelay;
use query_log_record::QueryLogEntry;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::warn;

/// Line counts for one ingestion run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IngestSummary {
    pub accepted: u64,
    pub rejected: u64,
}

/// Submit every entry read from `reader` until EOF.
///
/// Blank lines are ignored, malformed lines are logged and skipped.
pub async fn ingest_lines<R>(
    reader: R,
    relay: &QueryLogRelay<QueryLogEntry>,
) -> std::io::Result<IngestSummary>
where
    R: AsyncBufRead + Unpin,
{
    let mut summary = IngestSummary::default();
    let mut lines = reader.lines();
    let mut line_no = 0u64;

    while let Some(line) = lines.next_line().await? {
        line_no += 1;
        if line.trim().is_empty() {
            continue;
        }

        match QueryLogEntry::from_json_line(&line) {
            Ok(entry) => {
                relay.submit(entry);
                summary.accepted += 1;
            }
            Err(e) => {
                summary.rejected += 1;
                warn!(line = line_no, error = %e, "skipping malformed query log entry");
            }
        }
    }

    Ok(summary)
}
