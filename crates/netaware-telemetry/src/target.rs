use crate::error::{Result, TelemetryError};
use k8s_openapi::api::core::v1::Node;
use std::fmt;
use std::path::PathBuf;

/// Annotation overriding the metrics endpoint URL
pub const METRICS_URL_ANNOTATION: &str = "netaware.io/metrics-url";
/// Annotation overriding the benchmark result file path
pub const BENCHMARK_FILE_ANNOTATION: &str = "netaware.io/benchmark-file";
/// Annotation overriding the network interface to read packet counters from
pub const NETWORK_INTERFACE_ANNOTATION: &str = "netaware.io/network-interface";
/// Annotation overriding the disk device to read in-flight I/O from
pub const DISK_DEVICE_ANNOTATION: &str = "netaware.io/disk-device";

const CONTROL_PLANE_LABELS: &[&str] = &[
    "node-role.kubernetes.io/control-plane",
    "node-role.kubernetes.io/master",
];

/// Node class, which decides the default interface and disk names
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeClass {
    ControlPlane,
    Worker,
}

impl NodeClass {
    /// Classify a node by its role labels
    pub fn of(node: &Node) -> Self {
        let is_control_plane = node
            .metadata
            .labels
            .as_ref()
            .map(|labels| CONTROL_PLANE_LABELS.iter().any(|l| labels.contains_key(*l)))
            .unwrap_or(false);

        if is_control_plane {
            NodeClass::ControlPlane
        } else {
            NodeClass::Worker
        }
    }

    pub fn default_network_interface(&self) -> &'static str {
        match self {
            NodeClass::ControlPlane => "enp3s0f1",
            NodeClass::Worker => "eth0",
        }
    }

    pub fn default_disk_device(&self) -> &'static str {
        match self {
            NodeClass::ControlPlane => "sda",
            NodeClass::Worker => "mmcblk0",
        }
    }
}

impl fmt::Display for NodeClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeClass::ControlPlane => write!(f, "control-plane"),
            NodeClass::Worker => write!(f, "worker"),
        }
    }
}

/// Defaults used when a node carries no overriding annotations
#[derive(Debug, Clone)]
pub struct TargetConfig {
    /// Port the node exporter listens on
    pub metrics_port: u16,
    /// HTTP path of the exposition endpoint
    pub metrics_path: String,
    /// Directory holding `<InternalIP>.json` benchmark results
    pub benchmark_dir: PathBuf,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            metrics_port: 9100,
            metrics_path: "/metrics".to_string(),
            benchmark_dir: PathBuf::from("/home"),
        }
    }
}

/// Everything needed to collect one node's snapshot
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryTarget {
    pub node_name: String,
    pub class: NodeClass,
    pub metrics_url: String,
    pub benchmark_file: PathBuf,
    pub network_interface: String,
    pub disk_device: String,
}

impl TelemetryTarget {
    /// Derive a target from a node's labels, annotations and addresses
    pub fn from_node(node: &Node, config: &TargetConfig) -> Result<Self> {
        let node_name = node
            .metadata
            .name
            .clone()
            .ok_or_else(|| TelemetryError::unresolvable("<unnamed>", "node has no name"))?;

        let class = NodeClass::of(node);
        let annotation = |key: &str| {
            node.metadata
                .annotations
                .as_ref()
                .and_then(|a| a.get(key))
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let internal_ip = internal_ip(node);

        let metrics_url = match annotation(METRICS_URL_ANNOTATION) {
            Some(url) => url,
            None => {
                let ip = internal_ip.as_deref().ok_or_else(|| {
                    TelemetryError::unresolvable(
                        &node_name,
                        "no metrics URL annotation and no InternalIP address",
                    )
                })?;
                format!(
                    "http://{}:{}{}",
                    host_for_url(ip),
                    config.metrics_port,
                    config.metrics_path
                )
            }
        };

        let benchmark_file = match annotation(BENCHMARK_FILE_ANNOTATION) {
            Some(path) => PathBuf::from(path),
            None => {
                let key = internal_ip.as_deref().unwrap_or(&node_name);
                config.benchmark_dir.join(format!("{}.json", key))
            }
        };

        Ok(Self {
            network_interface: annotation(NETWORK_INTERFACE_ANNOTATION)
                .unwrap_or_else(|| class.default_network_interface().to_string()),
            disk_device: annotation(DISK_DEVICE_ANNOTATION)
                .unwrap_or_else(|| class.default_disk_device().to_string()),
            node_name,
            class,
            metrics_url,
            benchmark_file,
        })
    }
}

fn internal_ip(node: &Node) -> Option<String> {
    node.status
        .as_ref()
        .and_then(|s| s.addresses.as_ref())
        .and_then(|addresses| addresses.iter().find(|a| a.type_ == "InternalIP"))
        .map(|a| a.address.clone())
}

fn host_for_url(ip: &str) -> String {
    if ip.contains(':') {
        format!("[{}]", ip)
    } else {
        ip.to_string()
    }
}
