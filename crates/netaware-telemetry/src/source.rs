use crate::benchmark::read_bandwidth;
use crate::error::{Result, TelemetryError};
use crate::exposition::Exposition;
use crate::snapshot::NodeMetricsSnapshot;
use crate::target::TelemetryTarget;
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

/// Produces a telemetry snapshot for one node
#[async_trait]
pub trait TelemetrySource: Send + Sync {
    async fn snapshot(&self, target: &TelemetryTarget) -> Result<NodeMetricsSnapshot>;
}

/// Fetches the node exporter over HTTP and reads the benchmark file from disk
pub struct HttpTelemetrySource {
    client: Client,
}

impl HttpTelemetrySource {
    /// Create a source whose HTTP requests give up after `timeout`
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .map_err(|e| TelemetryError::ClientInit {
                message: e.to_string(),
            })?;

        Ok(Self { client })
    }

    /// GET the exposition payload for a target
    pub async fn fetch_exposition(&self, target: &TelemetryTarget) -> Result<String> {
        let url = &target.metrics_url;
        debug!("GET {}", url);

        let resp = self.client.get(url).send().await.map_err(|e| {
            let message = if e.is_timeout() {
                "request timed out".to_string()
            } else {
                format!("HTTP request failed: {}", e)
            };
            TelemetryError::unreachable(&target.node_name, url, message)
        })?;

        if !resp.status().is_success() {
            return Err(TelemetryError::http_status(
                &target.node_name,
                url,
                resp.status().as_u16(),
            ));
        }

        resp.text().await.map_err(|e| {
            TelemetryError::unreachable(
                &target.node_name,
                url,
                format!("failed to read response body: {}", e),
            )
        })
    }
}

#[async_trait]
impl TelemetrySource for HttpTelemetrySource {
    async fn snapshot(&self, target: &TelemetryTarget) -> Result<NodeMetricsSnapshot> {
        let body = self.fetch_exposition(target).await?;
        let exposition = Exposition::parse(&body);
        if exposition.skipped_lines() > 0 {
            debug!(
                node = %target.node_name,
                skipped = exposition.skipped_lines(),
                "Skipped malformed exposition lines"
            );
        }

        let bandwidth = read_bandwidth(&target.node_name, &target.benchmark_file).await?;

        NodeMetricsSnapshot::from_exposition(target, &exposition, bandwidth)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::NodeClass;
    use axum::http::StatusCode;
    use axum::routing::get;
    use axum::Router;
    use std::io::Write;
    use std::net::SocketAddr;
    use std::path::PathBuf;
    use tempfile::NamedTempFile;

    const METRICS: &str = "node_cpu_scaling_frequency_hertz{cpu=\"0\"} 1e+09\n\
node_cpu_scaling_frequency_hertz{cpu=\"1\"} 1e+09\n\
node_cpu_scaling_frequency_hertz{cpu=\"2\"} 1e+09\n\
node_cpu_scaling_frequency_hertz{cpu=\"3\"} 1e+09\n\
node_memory_MemTotal_bytes 2e+09\n\
node_memory_MemAvailable_bytes 1e+09\n\
node_network_receive_packets_total{device=\"eth0\"} 10\n\
node_network_transmit_packets_total{device=\"eth0\"} 20\n\
node_disk_io_now{device=\"mmcblk0\"} 1\n";

    async fn spawn_exporter() -> SocketAddr {
        let app = Router::new()
            .route("/metrics", get(|| async { METRICS }))
            .route(
                "/broken",
                get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "exporter crashed") }),
            );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr
    }

    fn target(url: String, benchmark_file: PathBuf) -> TelemetryTarget {
        TelemetryTarget {
            node_name: "raspiworker2".to_string(),
            class: NodeClass::Worker,
            metrics_url: url,
            benchmark_file,
            network_interface: "eth0".to_string(),
            disk_device: "mmcblk0".to_string(),
        }
    }

    fn benchmark_file() -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(br#"{"end": {"streams": [{"receiver": {"bits_per_second": 7.5e8}}]}}"#)
            .unwrap();
        file
    }

    #[tokio::test]
    async fn test_snapshot_over_http() {
        let addr = spawn_exporter().await;
        let bench = benchmark_file();
        let source = HttpTelemetrySource::new(Duration::from_secs(2)).unwrap();

        let snapshot = source
            .snapshot(&target(
                format!("http://{}/metrics", addr),
                bench.path().to_path_buf(),
            ))
            .await
            .unwrap();

        assert_eq!(snapshot.cpu_frequency_hertz, 1e9);
        assert_eq!(snapshot.occupied_memory_percentage, 50.0);
        assert_eq!(snapshot.network_packets_received, Some(10));
        assert_eq!(snapshot.network_packets_sent, Some(20));
        assert_eq!(snapshot.network_bandwidth_bps, Some(7.5e8));
        assert_eq!(snapshot.disk_io_now, Some(1));
    }

    #[tokio::test]
    async fn test_error_status_aborts_snapshot() {
        let addr = spawn_exporter().await;
        let bench = benchmark_file();
        let source = HttpTelemetrySource::new(Duration::from_secs(2)).unwrap();

        let err = source
            .snapshot(&target(
                format!("http://{}/broken", addr),
                bench.path().to_path_buf(),
            ))
            .await
            .unwrap_err();

        assert!(matches!(err, TelemetryError::HttpStatus { status: 500, .. }));
    }

    #[tokio::test]
    async fn test_connection_refused_is_unreachable() {
        // Bind and immediately drop to get a port nobody listens on
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let bench = benchmark_file();
        let source = HttpTelemetrySource::new(Duration::from_secs(2)).unwrap();

        let err = source
            .snapshot(&target(
                format!("http://{}/metrics", addr),
                bench.path().to_path_buf(),
            ))
            .await
            .unwrap_err();

        assert!(matches!(err, TelemetryError::Unreachable { .. }));
    }

    #[tokio::test]
    async fn test_missing_benchmark_file_aborts_snapshot() {
        let addr = spawn_exporter().await;
        let dir = tempfile::tempdir().unwrap();
        let source = HttpTelemetrySource::new(Duration::from_secs(2)).unwrap();

        let err = source
            .snapshot(&target(
                format!("http://{}/metrics", addr),
                dir.path().join("absent.json"),
            ))
            .await
            .unwrap_err();

        assert!(matches!(err, TelemetryError::BenchmarkUnreadable { .. }));
    }
}
