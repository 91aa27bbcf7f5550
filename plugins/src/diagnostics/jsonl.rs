use buildq_core::diagnostics::Diagnostic;
use serde::Deserialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{debug, warn};

use super::hub::DiagnosticsHub;

/// One line of a diagnostics feed: the full diagnostic set for a resource.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DiagnosticsRecord {
    pub uri: String,
    #[serde(default)]
    pub diagnostics: Vec<Diagnostic>,
}

/// Publishes every record read from `reader` into `hub` until EOF.
///
/// Malformed lines are logged and skipped. Returns the number of records
/// published.
pub async fn ingest_jsonl<R>(reader: R, hub: &DiagnosticsHub) -> anyhow::Result<usize>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut published = 0usize;
    let mut line_no = 0usize;

    while let Some(line) = lines.next_line().await? {
        line_no += 1;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<DiagnosticsRecord>(line) {
            Ok(record) => {
                debug!(
                    target: "buildq.diagnostics",
                    uri = %record.uri,
                    count = record.diagnostics.len(),
                    "feed record"
                );
                hub.publish(record.uri, record.diagnostics);
                published += 1;
            }
            Err(e) => {
                warn!(target: "buildq.diagnostics", line = line_no, error = %e, "skipping malformed feed line");
            }
        }
    }
    Ok(published)
}
