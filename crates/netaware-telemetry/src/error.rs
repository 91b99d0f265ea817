use miette::Diagnostic;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors raised while collecting a node's telemetry snapshot
#[derive(Error, Debug, Diagnostic)]
pub enum TelemetryError {
    /// The metrics endpoint could not be reached
    #[error("Telemetry endpoint {url} for node {node_name} is unreachable: {message}")]
    #[diagnostic(
        code(netaware::telemetry::unreachable),
        help("Verify the node exporter is running and reachable from the scheduler")
    )]
    Unreachable {
        #[allow(unused)]
        node_name: String,
        #[allow(unused)]
        url: String,
        #[allow(unused)]
        message: String,
    },

    /// The metrics endpoint answered with a non-success status
    #[error("Telemetry endpoint {url} for node {node_name} returned status {status}")]
    #[diagnostic(
        code(netaware::telemetry::http_status),
        help("Check the exporter logs on the node; the scheduler only accepts 2xx responses")
    )]
    HttpStatus {
        #[allow(unused)]
        node_name: String,
        #[allow(unused)]
        url: String,
        #[allow(unused)]
        status: u16,
    },

    /// Collection did not finish within the per-node deadline
    #[error("Telemetry collection for node {node_name} timed out after {timeout:?}")]
    #[diagnostic(
        code(netaware::telemetry::timeout),
        help("Raise --fetch-timeout-ms or check the network path to the node")
    )]
    Timeout {
        #[allow(unused)]
        node_name: String,
        #[allow(unused)]
        timeout: Duration,
    },

    /// The benchmark result file could not be read
    #[error("Benchmark file {} for node {node_name} could not be read: {source}", path.display())]
    #[diagnostic(
        code(netaware::telemetry::benchmark_unreadable),
        help("Make sure the benchmark job has written a result for this node, or set the netaware.io/benchmark-file annotation")
    )]
    BenchmarkUnreadable {
        #[allow(unused)]
        node_name: String,
        #[allow(unused)]
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A mandatory metric could not be extracted
    #[error("Failed to parse {metric} for node {node_name}: {message}")]
    #[diagnostic(
        code(netaware::telemetry::parse_error),
        help("The exporter output may be missing the {metric} series")
    )]
    Parse {
        #[allow(unused)]
        node_name: String,
        #[allow(unused)]
        metric: String,
        #[allow(unused)]
        message: String,
    },

    /// No telemetry address could be derived for the node
    #[error("Cannot resolve a telemetry target for node {node_name}: {reason}")]
    #[diagnostic(
        code(netaware::telemetry::unresolvable),
        help("Annotate the node with netaware.io/metrics-url or make sure it reports an InternalIP address")
    )]
    Unresolvable {
        #[allow(unused)]
        node_name: String,
        #[allow(unused)]
        reason: String,
    },

    /// The HTTP client could not be initialized
    #[error("Failed to initialize the telemetry HTTP client: {message}")]
    #[diagnostic(
        code(netaware::telemetry::client_init),
        help("This usually means the TLS backend could not be loaded")
    )]
    ClientInit {
        #[allow(unused)]
        message: String,
    },
}

/// Result type for telemetry operations
pub type Result<T> = std::result::Result<T, TelemetryError>;

impl TelemetryError {
    pub fn unreachable(
        node_name: impl Into<String>,
        url: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Unreachable {
            node_name: node_name.into(),
            url: url.into(),
            message: message.into(),
        }
    }

    pub fn http_status(node_name: impl Into<String>, url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            node_name: node_name.into(),
            url: url.into(),
            status,
        }
    }

    pub fn timeout(node_name: impl Into<String>, timeout: Duration) -> Self {
        Self::Timeout {
            node_name: node_name.into(),
            timeout,
        }
    }

    pub fn benchmark_unreadable(
        node_name: impl Into<String>,
        path: impl Into<PathBuf>,
        source: std::io::Error,
    ) -> Self {
        Self::BenchmarkUnreadable {
            node_name: node_name.into(),
            path: path.into(),
            source,
        }
    }

    pub fn parse(
        node_name: impl Into<String>,
        metric: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Parse {
            node_name: node_name.into(),
            metric: metric.into(),
            message: message.into(),
        }
    }

    pub fn unresolvable(node_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Unresolvable {
            node_name: node_name.into(),
            reason: reason.into(),
        }
    }

    /// Whether the error means the node could not be reached at all, as
    /// opposed to answering with data that did not parse
    pub fn is_unreachable(&self) -> bool {
        !matches!(self, Self::Parse { .. })
    }
}
