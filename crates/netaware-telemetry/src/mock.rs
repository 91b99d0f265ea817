use crate::error::{Result, TelemetryError};
use crate::snapshot::NodeMetricsSnapshot;
use crate::source::TelemetrySource;
use crate::target::TelemetryTarget;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::debug;

/// What the mock answers for a node
#[derive(Debug, Clone)]
pub enum MockReading {
    /// Return this snapshot
    Ready(NodeMetricsSnapshot),
    /// Behave like an exporter answering with this HTTP status
    Status(u16),
    /// Never answer
    Hang,
}

/// In-memory telemetry source for testing the collector and scheduling loop
/// without node exporters.
///
/// Nodes without a configured reading are reported as unreachable. Tracks the
/// number of concurrent calls so tests can check the fan-out bound.
pub struct MockTelemetrySource {
    readings: RwLock<HashMap<String, MockReading>>,
    delay: Duration,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockTelemetrySource {
    pub fn new() -> Self {
        Self::with_delay(Duration::ZERO)
    }

    /// Every call sleeps for `delay` before answering
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            readings: RwLock::new(HashMap::new()),
            delay,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub async fn set(&self, node_name: impl Into<String>, reading: MockReading) {
        self.readings.write().await.insert(node_name.into(), reading);
    }

    /// Configure a ready snapshot, keyed by the snapshot's node name
    pub async fn set_snapshot(&self, snapshot: NodeMetricsSnapshot) {
        let node_name = snapshot.node_name.clone();
        self.set(node_name, MockReading::Ready(snapshot)).await;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Highest number of calls that were in progress at the same time
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

impl Default for MockTelemetrySource {
    fn default() -> Self {
        Self::new()
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl TelemetrySource for MockTelemetrySource {
    async fn snapshot(&self, target: &TelemetryTarget) -> Result<NodeMetricsSnapshot> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        let _guard = InFlight(&self.in_flight);
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let reading = self.readings.read().await.get(&target.node_name).cloned();
        debug!("Mock: telemetry requested for {}", target.node_name);

        match reading {
            Some(MockReading::Ready(snapshot)) => Ok(snapshot),
            Some(MockReading::Status(status)) => Err(TelemetryError::http_status(
                &target.node_name,
                &target.metrics_url,
                status,
            )),
            Some(MockReading::Hang) => std::future::pending().await,
            None => Err(TelemetryError::unreachable(
                &target.node_name,
                &target.metrics_url,
                "no mock reading configured",
            )),
        }
    }
}
