//! Reader for per-node network benchmark result files.
//!
//! Benchmark jobs append one JSON report per run, so a file may hold several
//! concatenated documents. Only the receiver throughput of the last complete
//! run is of interest.

use crate::error::{Result, TelemetryError};
use serde::Deserialize;
use std::path::Path;
use tracing::{debug, warn};

/// Top-level benchmark report; everything except the summary is ignored
#[derive(Debug, Clone, Deserialize)]
pub struct BenchmarkReport {
    pub end: BenchmarkEnd,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BenchmarkEnd {
    #[serde(default)]
    pub streams: Vec<BenchmarkStream>,
    #[serde(default)]
    pub sum_received: Option<BenchmarkSum>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BenchmarkStream {
    pub receiver: BenchmarkSum,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BenchmarkSum {
    pub bits_per_second: f64,
}

impl BenchmarkReport {
    /// Receiver bits per second of the first stream, falling back to the
    /// received summary when the report has no per-stream records
    pub fn receiver_bits_per_second(&self) -> Option<f64> {
        self.end
            .streams
            .first()
            .map(|stream| stream.receiver.bits_per_second)
            .or_else(|| self.end.sum_received.as_ref().map(|sum| sum.bits_per_second))
            .filter(|bps| bps.is_finite() && *bps >= 0.0)
    }
}

/// Parse the most recent run from a benchmark file's contents.
///
/// Only the last report that parses counts: if it carries no usable receiver
/// rate (a failed run) the result is `None`, even when an earlier run had one.
/// Documents after the last parseable one (for example a run that was cut off
/// mid-write) are ignored.
pub fn latest_receiver_bps(data: &[u8]) -> Option<f64> {
    let mut latest = None;

    for report in serde_json::Deserializer::from_slice(data).into_iter::<BenchmarkReport>() {
        match report {
            Ok(report) => latest = report.receiver_bits_per_second(),
            Err(e) => {
                debug!("Stopping benchmark parse at malformed report: {}", e);
                break;
            }
        }
    }

    latest
}

/// Read a node's benchmark file and extract the latest receiver throughput.
///
/// A file that cannot be read is an error; a file that reads but holds no
/// usable run yields `Ok(None)`.
pub async fn read_bandwidth(node_name: &str, path: &Path) -> Result<Option<f64>> {
    let data = tokio::fs::read(path)
        .await
        .map_err(|e| TelemetryError::benchmark_unreadable(node_name, path, e))?;

    let bandwidth = latest_receiver_bps(&data);
    if bandwidth.is_none() {
        warn!(
            node = node_name,
            path = %path.display(),
            "Benchmark file holds no usable run, bandwidth will not be scored"
        );
    }

    Ok(bandwidth)
}
