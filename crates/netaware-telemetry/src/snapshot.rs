use crate::error::{Result, TelemetryError};
use crate::exposition::Exposition;
use crate::target::TelemetryTarget;
use tracing::{debug, warn};

pub const CPU_FREQUENCY_METRIC: &str = "node_cpu_scaling_frequency_hertz";
pub const MEMORY_TOTAL_METRIC: &str = "node_memory_MemTotal_bytes";
pub const MEMORY_AVAILABLE_METRIC: &str = "node_memory_MemAvailable_bytes";
pub const TRANSMIT_PACKETS_METRIC: &str = "node_network_transmit_packets_total";
pub const RECEIVE_PACKETS_METRIC: &str = "node_network_receive_packets_total";
pub const DISK_IO_NOW_METRIC: &str = "node_disk_io_now";

/// Number of CPU cores whose scaling frequency is sampled
pub const CPU_CORE_SAMPLES: usize = 4;

/// Point-in-time telemetry reading for one node.
///
/// CPU frequency and memory occupancy are mandatory. The remaining fields are
/// `None` when the exporter or benchmark file did not provide a usable value.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeMetricsSnapshot {
    pub node_name: String,
    /// Mean scaling frequency of the sampled cores, in hertz
    pub cpu_frequency_hertz: f64,
    pub occupied_memory_percentage: f64,
    pub network_packets_received: Option<u64>,
    pub network_packets_sent: Option<u64>,
    /// Receiver throughput of the last benchmark run, in bits per second
    pub network_bandwidth_bps: Option<f64>,
    pub disk_io_now: Option<u64>,
}

impl NodeMetricsSnapshot {
    /// Create a snapshot with only the mandatory readings set
    pub fn new(
        node_name: impl Into<String>,
        cpu_frequency_hertz: f64,
        occupied_memory_percentage: f64,
    ) -> Self {
        Self {
            node_name: node_name.into(),
            cpu_frequency_hertz,
            occupied_memory_percentage,
            network_packets_received: None,
            network_packets_sent: None,
            network_bandwidth_bps: None,
            disk_io_now: None,
        }
    }

    pub fn with_packets(mut self, received: u64, sent: u64) -> Self {
        self.network_packets_received = Some(received);
        self.network_packets_sent = Some(sent);
        self
    }

    pub fn with_bandwidth(mut self, bits_per_second: f64) -> Self {
        self.network_bandwidth_bps = Some(bits_per_second);
        self
    }

    pub fn with_disk_io(mut self, in_flight: u64) -> Self {
        self.disk_io_now = Some(in_flight);
        self
    }

    /// Build a snapshot from a tokenized exposition payload and the node's
    /// benchmark reading
    pub fn from_exposition(
        target: &TelemetryTarget,
        exposition: &Exposition,
        network_bandwidth_bps: Option<f64>,
    ) -> Result<Self> {
        let node = target.node_name.as_str();
        let interface = [("device", target.network_interface.as_str())];
        let disk = [("device", target.disk_device.as_str())];

        let snapshot = Self {
            node_name: target.node_name.clone(),
            cpu_frequency_hertz: cpu_frequency(node, exposition)?,
            occupied_memory_percentage: occupied_memory_percentage(node, exposition)?,
            network_packets_received: optional_count(
                node,
                exposition,
                RECEIVE_PACKETS_METRIC,
                &interface,
            ),
            network_packets_sent: optional_count(
                node,
                exposition,
                TRANSMIT_PACKETS_METRIC,
                &interface,
            ),
            network_bandwidth_bps,
            disk_io_now: optional_count(node, exposition, DISK_IO_NOW_METRIC, &disk),
        };

        debug!(
            node,
            class = %target.class,
            cpu_hz = snapshot.cpu_frequency_hertz,
            memory_pct = snapshot.occupied_memory_percentage,
            rx_packets = ?snapshot.network_packets_received,
            tx_packets = ?snapshot.network_packets_sent,
            bandwidth_bps = ?snapshot.network_bandwidth_bps,
            disk_io = ?snapshot.disk_io_now,
            "Built telemetry snapshot"
        );

        Ok(snapshot)
    }
}

/// Average the sampled cores' frequencies, skipping cores that are missing
fn cpu_frequency(node: &str, exposition: &Exposition) -> Result<f64> {
    let mut samples = Vec::with_capacity(CPU_CORE_SAMPLES);

    for core in 0..CPU_CORE_SAMPLES {
        let cpu = core.to_string();
        match exposition
            .get(CPU_FREQUENCY_METRIC, &[("cpu", cpu.as_str())])
            .filter(|hz| hz.is_finite() && *hz >= 0.0)
        {
            Some(hz) => samples.push(hz),
            None => warn!(node, cpu = core, "CPU frequency sample missing, averaging the rest"),
        }
    }

    if samples.is_empty() {
        return Err(TelemetryError::parse(
            node,
            CPU_FREQUENCY_METRIC,
            format!("none of the first {} cores reported a frequency", CPU_CORE_SAMPLES),
        ));
    }

    Ok(samples.iter().sum::<f64>() / samples.len() as f64)
}

fn occupied_memory_percentage(node: &str, exposition: &Exposition) -> Result<f64> {
    let total = exposition
        .get(MEMORY_TOTAL_METRIC, &[])
        .filter(|v| v.is_finite())
        .ok_or_else(|| TelemetryError::parse(node, MEMORY_TOTAL_METRIC, "series missing"))?;
    let available = exposition
        .get(MEMORY_AVAILABLE_METRIC, &[])
        .filter(|v| v.is_finite())
        .ok_or_else(|| TelemetryError::parse(node, MEMORY_AVAILABLE_METRIC, "series missing"))?;

    if total <= 0.0 {
        return Err(TelemetryError::parse(
            node,
            MEMORY_TOTAL_METRIC,
            format!("total memory must be positive, got {}", total),
        ));
    }

    Ok(100.0 - (available * 100.0) / total)
}

fn optional_count(
    node: &str,
    exposition: &Exposition,
    metric: &str,
    selector: &[(&str, &str)],
) -> Option<u64> {
    let value = exposition.get_count(metric, selector);
    if value.is_none() {
        warn!(
            node,
            metric,
            device = selector.first().map(|(_, v)| *v).unwrap_or_default(),
            "Metric missing or invalid, it will not be scored for this node"
        );
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::NodeClass;
    use std::path::PathBuf;

    fn worker_target() -> TelemetryTarget {
        TelemetryTarget {
            node_name: "raspiworker1".to_string(),
            class: NodeClass::Worker,
            metrics_url: "http://192.168.1.135:9100/metrics".to_string(),
            benchmark_file: PathBuf::from("/home/192.168.1.135.json"),
            network_interface: "eth0".to_string(),
            disk_device: "mmcblk0".to_string(),
        }
    }

    const WORKER_METRICS: &str = r#"# HELP node_disk_io_now The number of I/Os currently in progress.
# TYPE node_disk_io_now gauge
node_disk_io_now{device="mmcblk0"} 2
node_disk_io_now{device="mmcblk0p1"} 0
# TYPE node_cpu_scaling_frequency_hertz gauge
node_cpu_scaling_frequency_hertz{cpu="0"} 6e+08
node_cpu_scaling_frequency_hertz{cpu="1"} 1.2e+09
node_cpu_scaling_frequency_hertz{cpu="2"} 6e+08
node_cpu_scaling_frequency_hertz{cpu="3"} 1.4e+09
# TYPE node_memory_MemAvailable_bytes gauge
node_memory_MemAvailable_bytes 3.0e+08
# TYPE node_memory_MemTotal_bytes gauge
node_memory_MemTotal_bytes 1.0e+09
# TYPE node_network_receive_packets_total counter
node_network_receive_packets_total{device="eth0"} 500123
node_network_receive_packets_total{device="flannel.1"} 77
# TYPE node_network_transmit_packets_total counter
node_network_transmit_packets_total{device="eth0"} 400456
node_network_transmit_packets_total{device="flannel.1"} 88
"#;

    #[test]
    fn test_full_snapshot() {
        let exposition = Exposition::parse(WORKER_METRICS);
        let snapshot =
            NodeMetricsSnapshot::from_exposition(&worker_target(), &exposition, Some(9.0e8))
                .unwrap();

        assert_eq!(snapshot.node_name, "raspiworker1");
        assert_eq!(snapshot.cpu_frequency_hertz, 9.5e8);
        assert!((snapshot.occupied_memory_percentage - 70.0).abs() < 1e-9);
        assert_eq!(snapshot.network_packets_received, Some(500_123));
        assert_eq!(snapshot.network_packets_sent, Some(400_456));
        assert_eq!(snapshot.network_bandwidth_bps, Some(9.0e8));
        assert_eq!(snapshot.disk_io_now, Some(2));
    }

    #[test]
    fn test_missing_cpu_core_degrades_average() {
        let text = WORKER_METRICS.replace("node_cpu_scaling_frequency_hertz{cpu=\"3\"} 1.4e+09\n", "");
        let exposition = Exposition::parse(&text);

        let snapshot =
            NodeMetricsSnapshot::from_exposition(&worker_target(), &exposition, None).unwrap();

        assert_eq!(snapshot.cpu_frequency_hertz, 8.0e8);
    }

    #[test]
    fn test_garbled_cpu_core_degrades_average() {
        let text = WORKER_METRICS.replace(
            "node_cpu_scaling_frequency_hertz{cpu=\"0\"} 6e+08",
            "node_cpu_scaling_frequency_hertz{cpu=\"0\"} six-hundred",
        );
        let exposition = Exposition::parse(&text);

        let snapshot =
            NodeMetricsSnapshot::from_exposition(&worker_target(), &exposition, None).unwrap();

        assert!((snapshot.cpu_frequency_hertz - (1.2e9 + 6e8 + 1.4e9) / 3.0).abs() < 1e-3);
    }

    #[test]
    fn test_no_cpu_samples_is_parse_error() {
        let text: String = WORKER_METRICS
            .lines()
            .filter(|line| !line.starts_with(CPU_FREQUENCY_METRIC))
            .map(|line| format!("{}\n", line))
            .collect();
        let exposition = Exposition::parse(&text);

        let err =
            NodeMetricsSnapshot::from_exposition(&worker_target(), &exposition, None).unwrap_err();
        assert!(matches!(err, TelemetryError::Parse { .. }));
        assert!(!err.is_unreachable());
    }

    #[test]
    fn test_missing_memory_is_parse_error() {
        let text = WORKER_METRICS.replace("node_memory_MemTotal_bytes 1.0e+09\n", "");
        let exposition = Exposition::parse(&text);

        let err =
            NodeMetricsSnapshot::from_exposition(&worker_target(), &exposition, None).unwrap_err();
        assert!(matches!(err, TelemetryError::Parse { ref metric, .. } if metric == MEMORY_TOTAL_METRIC));
    }

    #[test]
    fn test_zero_total_memory_is_parse_error() {
        let text = WORKER_METRICS.replace("node_memory_MemTotal_bytes 1.0e+09", "node_memory_MemTotal_bytes 0");
        let exposition = Exposition::parse(&text);

        assert!(NodeMetricsSnapshot::from_exposition(&worker_target(), &exposition, None).is_err());
    }

    #[test]
    fn test_wrong_interface_leaves_counters_unset() {
        let mut target = worker_target();
        target.network_interface = "enp3s0f1".to_string();
        target.disk_device = "sda".to_string();
        let exposition = Exposition::parse(WORKER_METRICS);

        let snapshot = NodeMetricsSnapshot::from_exposition(&target, &exposition, None).unwrap();

        assert_eq!(snapshot.network_packets_received, None);
        assert_eq!(snapshot.network_packets_sent, None);
        assert_eq!(snapshot.disk_io_now, None);
        assert_eq!(snapshot.cpu_frequency_hertz, 9.5e8);
    }
}
