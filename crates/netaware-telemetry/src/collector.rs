use crate::error::TelemetryError;
use crate::snapshot::NodeMetricsSnapshot;
use crate::source::TelemetrySource;
use crate::target::TelemetryTarget;
use futures_util::stream::{self, StreamExt};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Configuration for the telemetry fan-out
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// Deadline for collecting one node's snapshot
    pub fetch_timeout: Duration,
    /// Maximum number of nodes collected at the same time
    pub max_concurrent_fetches: usize,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            fetch_timeout: Duration::from_secs(5),
            max_concurrent_fetches: 8,
        }
    }
}

/// Outcome of one collection round, keyed and ordered by node name
#[derive(Debug, Default)]
pub struct Collection {
    pub snapshots: BTreeMap<String, NodeMetricsSnapshot>,
    pub failures: BTreeMap<String, TelemetryError>,
}

impl Collection {
    /// Record a target that was excluded before any fetch was attempted
    pub fn exclude(&mut self, node_name: impl Into<String>, error: TelemetryError) {
        self.failures.insert(node_name.into(), error);
    }
}

/// Collects snapshots for a set of nodes with bounded concurrency and a
/// per-node deadline, so an unreachable node cannot stall the decision
pub struct TelemetryCollector {
    source: Arc<dyn TelemetrySource>,
    config: CollectorConfig,
}

impl TelemetryCollector {
    pub fn new(source: Arc<dyn TelemetrySource>, config: CollectorConfig) -> Self {
        Self { source, config }
    }

    pub fn config(&self) -> &CollectorConfig {
        &self.config
    }

    /// Collect a fresh snapshot for every target. Failed nodes end up in
    /// `failures` and never in `snapshots`.
    pub async fn collect(&self, targets: Vec<TelemetryTarget>) -> Collection {
        let started = Instant::now();
        let requested = targets.len();
        let timeout = self.config.fetch_timeout;

        let results: Vec<(String, crate::Result<NodeMetricsSnapshot>)> = stream::iter(targets)
            .map(|target| async move {
                let result = match tokio::time::timeout(timeout, self.source.snapshot(&target)).await
                {
                    Ok(result) => result,
                    Err(_) => Err(TelemetryError::timeout(&target.node_name, timeout)),
                };
                (target.node_name, result)
            })
            .buffer_unordered(self.config.max_concurrent_fetches.max(1))
            .collect()
            .await;

        let mut collection = Collection::default();
        for (node_name, result) in results {
            match result {
                Ok(snapshot) => {
                    debug!("Collected telemetry for node {}", node_name);
                    collection.snapshots.insert(node_name, snapshot);
                }
                Err(e) => {
                    warn!(node = %node_name, error = %e, "Excluding node from scoring");
                    collection.failures.insert(node_name, e);
                }
            }
        }

        info!(
            requested,
            collected = collection.snapshots.len(),
            failed = collection.failures.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Telemetry collection finished"
        );

        collection
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockReading, MockTelemetrySource};
    use crate::target::NodeClass;
    use std::path::PathBuf;

    fn target(name: &str) -> TelemetryTarget {
        TelemetryTarget {
            node_name: name.to_string(),
            class: NodeClass::Worker,
            metrics_url: format!("http://{}:9100/metrics", name),
            benchmark_file: PathBuf::from(format!("/home/{}.json", name)),
            network_interface: "eth0".to_string(),
            disk_device: "mmcblk0".to_string(),
        }
    }

    #[tokio::test]
    async fn test_failed_nodes_are_excluded() {
        let source = Arc::new(MockTelemetrySource::new());
        source
            .set_snapshot(NodeMetricsSnapshot::new("node-a", 1.0e9, 40.0))
            .await;
        source.set("node-x", MockReading::Status(503)).await;
        source
            .set_snapshot(NodeMetricsSnapshot::new("node-c", 2.0e9, 55.0))
            .await;

        let collector = TelemetryCollector::new(source.clone(), CollectorConfig::default());
        let collection = collector
            .collect(vec![target("node-a"), target("node-x"), target("node-c")])
            .await;

        assert_eq!(
            collection.snapshots.keys().collect::<Vec<_>>(),
            vec!["node-a", "node-c"]
        );
        assert!(matches!(
            collection.failures.get("node-x"),
            Some(TelemetryError::HttpStatus { status: 503, .. })
        ));
        assert_eq!(source.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_node_times_out() {
        let source = Arc::new(MockTelemetrySource::new());
        source
            .set_snapshot(NodeMetricsSnapshot::new("fast", 1.0e9, 10.0))
            .await;
        source.set("stuck", MockReading::Hang).await;

        let config = CollectorConfig {
            fetch_timeout: Duration::from_millis(200),
            max_concurrent_fetches: 4,
        };
        let collector = TelemetryCollector::new(source, config);
        let collection = collector.collect(vec![target("stuck"), target("fast")]).await;

        assert!(collection.snapshots.contains_key("fast"));
        assert!(matches!(
            collection.failures.get("stuck"),
            Some(TelemetryError::Timeout { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrency_is_bounded() {
        let source = Arc::new(MockTelemetrySource::with_delay(Duration::from_millis(100)));
        let mut targets = Vec::new();
        for i in 0..10 {
            let name = format!("node-{}", i);
            source
                .set_snapshot(NodeMetricsSnapshot::new(&name, 1.0e9, 20.0))
                .await;
            targets.push(target(&name));
        }

        let config = CollectorConfig {
            fetch_timeout: Duration::from_secs(5),
            max_concurrent_fetches: 3,
        };
        let collector = TelemetryCollector::new(source.clone(), config);
        let collection = collector.collect(targets).await;

        assert_eq!(collection.snapshots.len(), 10);
        assert_eq!(source.max_in_flight(), 3);
    }

    #[tokio::test]
    async fn test_empty_target_set() {
        let collector = TelemetryCollector::new(
            Arc::new(MockTelemetrySource::new()),
            CollectorConfig::default(),
        );
        let collection = collector.collect(Vec::new()).await;

        assert!(collection.snapshots.is_empty());
        assert!(collection.failures.is_empty());
    }
}
